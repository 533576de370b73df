//! Command dispatch and execution handlers.
//!
//! Routes a parsed command line either to a built-in command or to the
//! plugin that owns the chosen root command.

use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgMatches, Command, FromArgMatches};
use clap_complete::{Shell, generate};
use tether_common::AppDirs;
use tether_plugins::{CommandSynthesizer, PluginError, PluginHost, PluginRegistry};
use tokio_util::sync::CancellationToken;

use super::args::{Cli, Commands, CompletionCommand, GlobalArgs};
use crate::config::FileConfigStore;
use crate::dynamic;
use crate::prompt::DialoguerPrompter;

/// Load plugins, parse the full command line and run the chosen command.
pub async fn dispatch_command(
    globals: &GlobalArgs,
    args: Vec<OsString>,
    dirs: &AppDirs,
) -> Result<()> {
    let store = FileConfigStore::load(dirs, globals.plugins_dir.as_deref())?;
    let synthesizer = dynamic::synthesizer();

    // Ctrl+C is handled from before the first Discover launch.
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    let result = dispatch_with_cancel(&store, &synthesizer, args, &cancel).await;
    interrupt.abort();
    result
}

async fn dispatch_with_cancel(
    store: &FileConfigStore,
    synthesizer: &CommandSynthesizer,
    args: Vec<OsString>,
    cancel: &CancellationToken,
) -> Result<()> {
    let registry = dynamic::load_registry(store, synthesizer, cancel).await?;

    let mut command = dynamic::build_cli(&registry, synthesizer);
    let matches = command.try_get_matches_from_mut(args)?;

    if let Some((name, plugin_matches)) = dynamic::selected_plugin(&registry, &matches) {
        return run_plugin(&registry, synthesizer, &name, plugin_matches, cancel).await;
    }

    let cli = Cli::from_arg_matches(&matches)?;
    match cli.command {
        Some(Commands::Plugins(plugins_cli)) => plugins_cli.run(&registry),
        Some(Commands::Completion(completion_cli)) => {
            handle_completion(completion_cli, &mut command);
            Ok(())
        }
        None => {
            command.print_help()?;
            Ok(())
        }
    }
}

/// Run one plugin command; `cancel` fires on Ctrl+C.
async fn run_plugin(
    registry: &PluginRegistry,
    synthesizer: &CommandSynthesizer,
    name: &str,
    matches: &ArgMatches,
    cancel: &CancellationToken,
) -> Result<()> {
    let plugin = registry
        .get(name)
        .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
    let invocation = synthesizer.resolve(plugin, matches)?;

    let host = PluginHost::new(registry.config().clone())
        .with_prompter(Arc::new(DialoguerPrompter));
    host.invoke(
        plugin,
        invocation,
        tokio::io::stdout(),
        tokio::io::stderr(),
        cancel,
    )
    .await?;
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::debug!("Interrupt received, cancelling");
        cancel.cancel();
    }
}

/// Handle completion command.
fn handle_completion(completion_cli: CompletionCommand, command: &mut Command) {
    let shell = completion_cli.shell.unwrap_or_else(detect_shell_from_env);
    let name = command.get_name().to_string();
    generate(shell, command, name, &mut io::stdout());
}

/// Shell named by `$SHELL`, bash when unknown.
fn detect_shell_from_env() -> Shell {
    let shell_name = std::env::var("SHELL")
        .ok()
        .and_then(|path| {
            std::path::Path::new(&path)
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_lowercase)
        })
        .unwrap_or_default();

    match shell_name.as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "powershell" | "pwsh" => Shell::PowerShell,
        "elvish" => Shell::Elvish,
        other => {
            if !other.is_empty() {
                eprintln!("Warning: Unknown shell '{other}' from $SHELL. Defaulting to bash.");
            }
            Shell::Bash
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_detect_shell() {
        let saved = std::env::var_os("SHELL");
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::set_var("SHELL", "/usr/bin/zsh") };
        assert_eq!(detect_shell_from_env(), Shell::Zsh);
        unsafe { std::env::set_var("SHELL", "/bin/tcsh") };
        assert_eq!(detect_shell_from_env(), Shell::Bash);
        match saved {
            Some(value) => unsafe { std::env::set_var("SHELL", value) },
            None => unsafe { std::env::remove_var("SHELL") },
        }
    }
}
