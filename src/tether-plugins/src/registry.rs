//! Registry of plugins whose schemas were resolved for this run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tether_protocol::CommandDefinition;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigStore, PluginHostConfig};
use crate::error::{PluginError, Result};
use crate::manifest::{PluginManifest, PluginMode};
use crate::scanner::{ManifestScanner, PluginFailure};
use crate::supervisor::{ProcessSupervisor, SupervisorOptions};
use crate::synth::CommandSynthesizer;

/// Where a plugin's command schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    /// Static `[[commands]]` in the manifest
    Manifest,
    /// Discover call on a launched process
    Discovered,
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::Discovered => write!(f, "discovered"),
        }
    }
}

/// A plugin ready to be mounted on the command line.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub commands: Vec<CommandDefinition>,
    pub source: SchemaSource,
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        &self.manifest.root_name
    }

    pub fn command(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.iter().find(|c| c.name() == name)
    }

    pub fn is_legacy(&self) -> bool {
        self.manifest.mode == PluginMode::Legacy
    }
}

/// Plugins and failures of one host run.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    root: PathBuf,
    config: PluginHostConfig,
    plugins: BTreeMap<String, LoadedPlugin>,
    failures: Vec<PluginFailure>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new(root: impl Into<PathBuf>, config: PluginHostConfig) -> Self {
        Self {
            root: root.into(),
            config,
            plugins: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Scan the plugins root and resolve every plugin's schema concurrently.
    ///
    /// A plugin that fails at any step is recorded in [`failures`](Self::failures)
    /// and never blocks the others.
    pub async fn load(store: &dyn ConfigStore, synthesizer: &CommandSynthesizer) -> Result<Self> {
        Self::load_with_cancel(store, synthesizer, &CancellationToken::new()).await
    }

    /// [`load`](Self::load), aborted by `cancel`.
    ///
    /// Processes launched for Discover are killed when `cancel` fires, and
    /// the load fails with `Interrupted`.
    pub async fn load_with_cancel(
        store: &dyn ConfigStore,
        synthesizer: &CommandSynthesizer,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let root = store.plugins_root_path();
        let config = store.host_config();
        let report = ManifestScanner::new(&root).scan().await?;
        let supervisor = ProcessSupervisor::new(SupervisorOptions::from(&config));

        let mut registry = Self::new(root, config);
        registry.failures = report.failures;

        let (enabled, disabled): (Vec<_>, Vec<_>) = report
            .manifests
            .into_iter()
            .partition(|m| registry.config.is_plugin_enabled(&m.root_name));
        for manifest in disabled {
            tracing::debug!(plugin = %manifest.root_name, "Plugin disabled by configuration");
        }

        let resolved = join_all(
            enabled
                .into_iter()
                .map(|manifest| resolve_schema(&supervisor, synthesizer, manifest, cancel)),
        )
        .await;

        let interrupted: Vec<&str> = resolved
            .iter()
            .filter(|(_, result)| matches!(result, Err(PluginError::Interrupted { .. })))
            .map(|(name, _)| name.as_str())
            .collect();
        if !interrupted.is_empty() {
            return Err(PluginError::Interrupted {
                plugin: interrupted.join(", "),
            });
        }

        for (name, result) in resolved {
            match result.and_then(|plugin| registry.insert(plugin)) {
                Ok(()) => {}
                Err(error) => registry.record_failure(name, error),
            }
        }

        tracing::info!(
            loaded = registry.plugins.len(),
            failed = registry.failures.len(),
            "Plugin registry loaded"
        );
        Ok(registry)
    }

    /// Register a resolved plugin.
    pub fn insert(&mut self, plugin: LoadedPlugin) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyExists(name));
        }
        tracing::debug!(
            plugin = %name,
            commands = plugin.commands.len(),
            source = %plugin.source,
            "Registered plugin"
        );
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Drop a plugin (if registered) and keep the reason.
    pub fn record_failure(&mut self, plugin: impl Into<String>, error: PluginError) {
        let plugin = plugin.into();
        tracing::warn!(plugin = %plugin, kind = error.kind(), "{}", error);
        self.plugins.remove(&plugin);
        self.failures.push(PluginFailure::new(plugin, error));
        self.failures.sort_by(|a, b| a.plugin.cmp(&b.plugin));
    }

    pub fn get(&self, name: &str) -> Option<&LoadedPlugin> {
        self.plugins.get(name)
    }

    /// Loaded plugins, sorted by name.
    pub fn plugins(&self) -> impl Iterator<Item = &LoadedPlugin> {
        self.plugins.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn failures(&self) -> &[PluginFailure] {
        &self.failures
    }

    pub fn failure(&self, name: &str) -> Option<&PluginFailure> {
        self.failures.iter().find(|f| f.plugin == name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

async fn resolve_schema(
    supervisor: &ProcessSupervisor,
    synthesizer: &CommandSynthesizer,
    manifest: PluginManifest,
    cancel: &CancellationToken,
) -> (String, Result<LoadedPlugin>) {
    let name = manifest.root_name.clone();
    (name, resolve(supervisor, synthesizer, manifest, cancel).await)
}

/// Static commands, or a launch/discover/kill cycle.
async fn resolve(
    supervisor: &ProcessSupervisor,
    synthesizer: &CommandSynthesizer,
    manifest: PluginManifest,
    cancel: &CancellationToken,
) -> Result<LoadedPlugin> {
    let interrupted = || PluginError::Interrupted {
        plugin: manifest.root_name.clone(),
    };
    let (commands, source) = match manifest.static_commands.clone() {
        Some(commands) => (commands, SchemaSource::Manifest),
        None => {
            // Dropping an unfinished launch drops the child, which kills it.
            let mut process = tokio::select! {
                launched = supervisor.launch(&manifest) => launched?,
                _ = cancel.cancelled() => return Err(interrupted()),
            };
            let discovered = tokio::select! {
                discovered = process.discover() => discovered,
                _ = cancel.cancelled() => Err(interrupted()),
            };
            process.kill().await?;
            (discovered?, SchemaSource::Discovered)
        }
    };
    synthesizer.validate(&manifest.root_name, &commands)?;
    Ok(LoadedPlugin {
        manifest,
        commands,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigStore;
    use std::fs;
    use tempfile::TempDir;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("plugin.toml"), manifest).unwrap();
    }

    const STATIC: &str = r#"
[plugin]
name = "ops"
short = "Ops tools"
command = "ops-plugin"

[[commands]]
use = "deploy <env>"
short = "Deploy"

[[commands.flags]]
name = "force"
type = "bool"
"#;

    #[tokio::test]
    async fn test_static_commands_skip_launch() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "ops", STATIC);

        let store = StaticConfigStore::new(temp.path());
        let registry = PluginRegistry::load(&store, &CommandSynthesizer::default())
            .await
            .unwrap();

        let ops = registry.get("ops").unwrap();
        assert_eq!(ops.source, SchemaSource::Manifest);
        assert_eq!(ops.manifest.short, "Ops tools");
        assert!(ops.command("deploy").is_some());
        assert!(registry.failures().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "ops", STATIC);
        write_plugin(
            temp.path(),
            "missing",
            "[plugin]\nname = \"missing\"\ncommand = \"/nonexistent/tether-missing-plugin\"\n",
        );
        write_plugin(temp.path(), "broken", "[plugin\n");

        let store = StaticConfigStore::new(temp.path());
        let registry = PluginRegistry::load(&store, &CommandSynthesizer::default())
            .await
            .unwrap();

        assert_eq!(registry.names(), vec!["ops"]);
        assert_eq!(registry.failures().len(), 2);
        assert_eq!(
            registry.failure("missing").map(|f| f.error.kind()),
            Some("SpawnError")
        );
    }

    #[tokio::test]
    async fn test_disabled_plugin_not_loaded() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "ops", STATIC);
        let config = PluginHostConfig {
            disabled: vec!["ops".into()],
            ..Default::default()
        };
        let store = StaticConfigStore::new(temp.path()).with_config(config);
        let registry = PluginRegistry::load(&store, &CommandSynthesizer::default())
            .await
            .unwrap();
        assert!(registry.is_empty());
        assert!(registry.failures().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_unregisters() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "ops", STATIC);
        let store = StaticConfigStore::new(temp.path());
        let mut registry = PluginRegistry::load(&store, &CommandSynthesizer::default())
            .await
            .unwrap();

        registry.record_failure("ops", PluginError::AlreadyExists("ops".into()));
        assert!(registry.get("ops").is_none());
        assert_eq!(registry.failures()[0].error.kind(), "AlreadyExists");
    }

    #[tokio::test]
    async fn test_invalid_static_schema_is_failure() {
        let temp = TempDir::new().unwrap();
        write_plugin(
            temp.path(),
            "dup",
            r#"
[plugin]
name = "dup"
command = "dup-plugin"

[[commands]]
use = "a"

[[commands]]
use = "a"
"#,
        );
        let store = StaticConfigStore::new(temp.path());
        let registry = PluginRegistry::load(&store, &CommandSynthesizer::default())
            .await
            .unwrap();
        assert!(registry.is_empty());
        assert_eq!(
            registry.failure("dup").map(|f| f.error.kind()),
            Some("InvalidSchemaError")
        );
    }
}
