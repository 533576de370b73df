//! Launching plugin subprocesses.

use std::process::Stdio;
use std::time::Duration;

use tether_common::timeout::{
    DEFAULT_DISCOVER_TIMEOUT_SECS, DEFAULT_KILL_GRACE_MS, DEFAULT_STARTUP_TIMEOUT_SECS,
};
use tether_protocol::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION, PROTOCOL_VERSION_KEY};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::PluginHostConfig;
use crate::error::{PluginError, Result};
use crate::handshake::HandshakeNegotiator;
use crate::manifest::PluginManifest;
use crate::process::PluginProcess;

/// How long to wait for an exit status after stdout closes early.
const EARLY_EXIT_WAIT: Duration = Duration::from_millis(200);

/// Supervision timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub startup_timeout: Duration,
    /// Bound on the Discover call of a launched process
    pub discover_timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            discover_timeout: Duration::from_secs(DEFAULT_DISCOVER_TIMEOUT_SECS),
            kill_grace: Duration::from_millis(DEFAULT_KILL_GRACE_MS),
        }
    }
}

impl From<&PluginHostConfig> for SupervisorOptions {
    fn from(config: &PluginHostConfig) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            discover_timeout: config.discover_timeout(),
            kill_grace: config.kill_grace(),
        }
    }
}

/// Spawns plugins and brings them to `Ready`.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    options: SupervisorOptions,
    negotiator: HandshakeNegotiator,
}

impl ProcessSupervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            negotiator: HandshakeNegotiator::default(),
        }
    }

    pub fn with_negotiator(mut self, negotiator: HandshakeNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Spawn the manifest's launch command and complete the handshake.
    ///
    /// On any failure the subprocess is killed before the error is returned.
    pub async fn launch(&self, manifest: &PluginManifest) -> Result<PluginProcess> {
        let name = manifest.root_name.as_str();
        let mut cmd = Command::new(&manifest.launch_command);
        cmd.args(&manifest.launch_args)
            .current_dir(&manifest.dir)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env(PROTOCOL_VERSION_KEY, PROTOCOL_VERSION.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        isolate_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| PluginError::Spawn {
            plugin: name.to_string(),
            source,
        })?;
        tracing::debug!(
            plugin = name,
            pid = child.id(),
            command = %manifest.launch_command,
            "Spawned plugin"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut process = PluginProcess::spawned(name, child, self.options.kill_grace);
        process.set_discover_timeout(self.options.discover_timeout);
        if let Some(stderr) = stderr {
            process.track(forward_lines(name, "stderr", BufReader::new(stderr).lines()));
        }

        process.begin_handshake();
        let Some(stdout) = stdout else {
            process.kill().await?;
            return Err(PluginError::handshake_error(name, "plugin stdout not captured"));
        };
        let mut lines = BufReader::new(stdout).lines();

        let negotiated = tokio::time::timeout(
            self.options.startup_timeout,
            self.negotiator.negotiate(name, &mut lines),
        )
        .await;

        let failure = match negotiated {
            Ok(Ok((_, transport))) => {
                process.track(forward_lines(name, "stdout", lines));
                process.mark_ready(transport);
                tracing::info!(plugin = name, "Plugin ready");
                return Ok(process);
            }
            Ok(Err(err)) => with_exit_status(err, &mut process).await,
            Err(_) => PluginError::StartupTimeout {
                plugin: name.to_string(),
                timeout: self.options.startup_timeout,
            },
        };

        tracing::warn!(plugin = name, error = %failure, "Plugin launch failed");
        process.kill().await?;
        Err(failure)
    }
}

/// Make the child the leader of its own process group (unix only).
pub(crate) fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        // SAFETY: setpgid only changes process group, no undefined behavior
        unsafe {
            cmd.pre_exec(|| {
                // Own process group so kill reaches everything the plugin started
                if libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Append the exit status to a handshake failure if the child already quit.
async fn with_exit_status(err: PluginError, process: &mut PluginProcess) -> PluginError {
    match err {
        PluginError::Handshake { plugin, message } => {
            match process.exit_status_within(EARLY_EXIT_WAIT).await {
                Some(status) => PluginError::Handshake {
                    plugin,
                    message: format!("{message} ({status})"),
                },
                None => PluginError::Handshake { plugin, message },
            }
        }
        other => other,
    }
}

/// Forward each line of a plugin stream to the debug log.
fn forward_lines<R>(plugin: &str, stream: &'static str, mut lines: Lines<R>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let plugin = plugin.to_string();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(plugin = %plugin, stream, "{line}");
        }
    })
}
