//! `tether plugins`: inspect what the registry loaded and what it rejected.

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use tether_plugins::{LoadedPlugin, PluginError, PluginFailure, PluginManifest, PluginRegistry};

use crate::printer::OutputFormat;

/// Plugin CLI command.
#[derive(Debug, Parser)]
pub struct PluginsCli {
    #[command(subcommand)]
    pub subcommand: PluginsSubcommand,
}

/// Plugin subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum PluginsSubcommand {
    /// List loaded and failed plugins
    #[command(visible_alias = "ls")]
    List(PluginsListArgs),

    /// Show one plugin and its commands
    #[command(visible_alias = "info")]
    Show(PluginsShowArgs),

    /// Print the JSON schema of plugin.toml
    ManifestSchema,
}

/// Arguments for plugins list command.
#[derive(Debug, Parser)]
pub struct PluginsListArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments for plugins show command.
#[derive(Debug, Parser)]
pub struct PluginsShowArgs {
    /// Plugin name to show
    pub name: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl PluginsCli {
    /// Render the command's output.
    pub fn render(self, registry: &PluginRegistry) -> Result<String> {
        match self.subcommand {
            PluginsSubcommand::List(args) => {
                args.format.printer().render(&list_value(registry))
            }
            PluginsSubcommand::Show(args) => {
                let value = show_value(registry, &args.name)?;
                args.format.printer().render(&value)
            }
            PluginsSubcommand::ManifestSchema => {
                Ok(serde_json::to_string_pretty(&PluginManifest::json_schema())?)
            }
        }
    }

    /// Run the plugins command.
    pub fn run(self, registry: &PluginRegistry) -> Result<()> {
        let output = self.render(registry)?;
        if output.is_empty() {
            eprintln!("No plugins found in {}", registry.root().display());
        } else {
            println!("{output}");
        }
        Ok(())
    }
}

fn loaded_row(plugin: &LoadedPlugin) -> Value {
    json!({
        "name": plugin.name(),
        "status": "loaded",
        "mode": plugin.manifest.mode.to_string(),
        "source": plugin.source.to_string(),
        "commands": plugin.commands.len(),
        "description": plugin.manifest.short,
    })
}

fn failed_row(failure: &PluginFailure) -> Value {
    json!({
        "name": failure.plugin,
        "status": "failed",
        "mode": Value::Null,
        "source": Value::Null,
        "commands": 0,
        "description": format!("{}: {}", failure.error.kind(), failure.error),
    })
}

/// One row per plugin, loaded or not, sorted by name.
pub fn list_value(registry: &PluginRegistry) -> Value {
    let mut rows: Vec<(String, Value)> = registry
        .plugins()
        .map(|p| (p.name().to_string(), loaded_row(p)))
        .chain(
            registry
                .failures()
                .iter()
                .map(|f| (f.plugin.clone(), failed_row(f))),
        )
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    Value::Array(rows.into_iter().map(|(_, row)| row).collect())
}

/// Details of one plugin.
pub fn show_value(registry: &PluginRegistry, name: &str) -> Result<Value> {
    if let Some(plugin) = registry.get(name) {
        let manifest = &plugin.manifest;
        return Ok(json!({
            "name": plugin.name(),
            "status": "loaded",
            "description": manifest.short,
            "long": manifest.long,
            "mode": manifest.mode.to_string(),
            "source": plugin.source.to_string(),
            "manifest": manifest.path.display().to_string(),
            "command": manifest.launch_command,
            "args": manifest.launch_args,
            "commands": serde_json::to_value(&plugin.commands)?,
        }));
    }
    if let Some(failure) = registry.failure(name) {
        return Ok(json!({
            "name": failure.plugin,
            "status": "failed",
            "kind": failure.error.kind(),
            "error": failure.error.to_string(),
        }));
    }
    Err(PluginError::NotFound(name.to_string()).into())
}
