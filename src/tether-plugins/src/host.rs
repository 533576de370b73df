//! Running one plugin command end to end.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::config::PluginHostConfig;
use crate::error::{PluginError, Result};
use crate::legacy::LegacyRunner;
use crate::prompt::{NonInteractive, Prompter};
use crate::registry::LoadedPlugin;
use crate::supervisor::{ProcessSupervisor, SupervisorOptions};
use crate::synth::Invocation;

/// Executes invocations against freshly launched plugin processes.
pub struct PluginHost {
    config: PluginHostConfig,
    supervisor: ProcessSupervisor,
    prompter: Arc<dyn Prompter>,
}

impl PluginHost {
    pub fn new(config: PluginHostConfig) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(SupervisorOptions::from(&config)),
            config,
            prompter: Arc::new(NonInteractive),
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    /// Check, prompt, launch, exec, kill.
    ///
    /// The required-flag check runs before anything is spawned. The process
    /// is killed whatever the outcome, and a non-zero exit code becomes
    /// [`PluginError::Exit`].
    pub async fn invoke<O, E>(
        &self,
        plugin: &LoadedPlugin,
        mut invocation: Invocation,
        stdout: O,
        stderr: E,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        invocation.check_required()?;
        invocation.prompt_unset(self.prompter.as_ref())?;

        if plugin.is_legacy() {
            return LegacyRunner::new(&self.config, self.prompter.clone())
                .run(&plugin.manifest, &invocation, cancel)
                .await;
        }

        let request = invocation.exec_request();
        tracing::info!(
            plugin = %plugin.name(),
            command = %request.command_name,
            "Invoking plugin command"
        );

        let mut process = self.supervisor.launch(&plugin.manifest).await?;
        let result = process
            .exec(&request, stdout, stderr, self.config.exec_timeout(), cancel)
            .await;
        process.kill().await?;

        let outcome = result?;
        if outcome.exit_code != 0 {
            return Err(PluginError::Exit {
                plugin: plugin.name().to_string(),
                code: outcome.exit_code,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{PluginManifest, PluginMode};
    use crate::registry::SchemaSource;
    use std::path::PathBuf;
    use tether_protocol::{CommandDefinition, FlagDefinition};

    fn plugin() -> LoadedPlugin {
        LoadedPlugin {
            manifest: PluginManifest {
                root_name: "ghost".into(),
                short: String::new(),
                long: String::new(),
                launch_command: "/nonexistent/tether-ghost-plugin".into(),
                launch_args: Vec::new(),
                mode: PluginMode::Rpc,
                deadline: None,
                static_commands: None,
                dir: std::env::temp_dir(),
                path: PathBuf::from("plugin.toml"),
            },
            commands: vec![
                CommandDefinition::new("run").with_flag(FlagDefinition::string("target").required()),
            ],
            source: SchemaSource::Manifest,
        }
    }

    #[tokio::test]
    async fn test_missing_required_flag_never_spawns() {
        let plugin = plugin();
        let invocation = Invocation::new("ghost", plugin.commands[0].clone());
        let err = PluginHost::new(PluginHostConfig::default())
            .invoke(&plugin, invocation, Vec::new(), Vec::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        // A spawn attempt would have surfaced as SpawnError.
        assert_eq!(err.kind(), "MissingRequiredFlagError");
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let plugin = plugin();
        let mut invocation = Invocation::new("ghost", plugin.commands[0].clone());
        invocation
            .set_flag("target", tether_protocol::FlagValue::String("x".into()))
            .unwrap();
        let err = PluginHost::new(PluginHostConfig::default())
            .invoke(&plugin, invocation, Vec::new(), Vec::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SpawnError");
    }
}
