//! A live plugin subprocess and its RPC channel.

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tether_common::timeout::SHUTDOWN_NOTIFY_TIMEOUT_MS;
use tether_protocol::{CommandDefinition, ExecRequest, methods};
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{ExecOutcome, ExecutionBridge};
use crate::error::{PluginError, Result};
use crate::schema::SchemaClient;
use crate::transport::Transport;

/// Lifecycle state of a [`PluginProcess`].
///
/// `Spawned -> Handshaking -> Ready -> {Invoking -> Ready}* -> Killed`.
/// `Killed` is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Spawned,
    Handshaking,
    Ready,
    Invoking,
    Killed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawned => "spawned",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Invoking => "invoking",
            Self::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// One subprocess plus the channel it advertised.
///
/// Owned by a single invocation; never shared or reused after `kill`.
pub struct PluginProcess {
    name: String,
    state: ProcessState,
    child: Option<Child>,
    pid: Option<u32>,
    transport: Option<Arc<dyn Transport>>,
    kill_grace: Duration,
    discover_timeout: Option<Duration>,
    io_tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for PluginProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginProcess")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish()
    }
}

impl PluginProcess {
    pub(crate) fn spawned(name: impl Into<String>, child: Child, kill_grace: Duration) -> Self {
        let pid = child.id();
        Self {
            name: name.into(),
            state: ProcessState::Spawned,
            child: Some(child),
            pid,
            transport: None,
            kill_grace,
            discover_timeout: None,
            io_tasks: Vec::new(),
        }
    }

    /// A Ready process without a subprocess, for in-process transports.
    pub fn from_transport(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            state: ProcessState::Ready,
            child: None,
            pid: None,
            transport: Some(transport),
            kill_grace: Duration::ZERO,
            discover_timeout: None,
            io_tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// OS process id, if a subprocess was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the subprocess is still alive (always false once killed).
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => self.state != ProcessState::Killed,
        }
    }

    pub(crate) fn begin_handshake(&mut self) {
        if self.state == ProcessState::Spawned {
            self.state = ProcessState::Handshaking;
        }
    }

    pub(crate) fn mark_ready(&mut self, transport: Arc<dyn Transport>) {
        if self.state == ProcessState::Handshaking {
            self.transport = Some(transport);
            self.state = ProcessState::Ready;
        }
    }

    pub(crate) fn set_discover_timeout(&mut self, timeout: Duration) {
        self.discover_timeout = Some(timeout);
    }

    pub(crate) fn track(&mut self, task: JoinHandle<()>) {
        self.io_tasks.push(task);
    }

    /// Wait briefly for the subprocess to exit and report its status.
    pub(crate) async fn exit_status_within(&mut self, within: Duration) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match tokio::time::timeout(within, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => None,
        }
    }

    fn ready_transport(&self) -> Result<Arc<dyn Transport>> {
        match (&self.state, &self.transport) {
            (ProcessState::Ready, Some(transport)) => Ok(transport.clone()),
            _ => Err(PluginError::InvalidState {
                expected: ProcessState::Ready.to_string(),
                actual: self.state.to_string(),
            }),
        }
    }

    /// Fetch the plugin's command schema.
    pub async fn discover(&mut self) -> Result<Vec<CommandDefinition>> {
        let transport = self.ready_transport()?;
        self.state = ProcessState::Invoking;
        let result = SchemaClient::new(&self.name, transport)
            .with_timeout(self.discover_timeout)
            .discover_schema()
            .await;
        self.state = ProcessState::Ready;
        result
    }

    /// Run one command, streaming its output into `stdout` and `stderr`.
    ///
    /// A deadline or cancellation kills the process before returning.
    pub async fn exec<O, E>(
        &mut self,
        request: &ExecRequest,
        stdout: O,
        stderr: E,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome<O, E>>
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        let transport = self.ready_transport()?;
        self.state = ProcessState::Invoking;

        let result = ExecutionBridge::new(&self.name, transport)
            .with_deadline(deadline)
            .exec(request, stdout, stderr, cancel)
            .await;

        match &result {
            Err(PluginError::DeadlineExceeded { .. } | PluginError::Interrupted { .. }) => {
                self.kill().await?;
            }
            _ => self.state = ProcessState::Ready,
        }
        result
    }

    /// Stop the plugin and release its channel and subprocess.
    ///
    /// Asks politely first, then signals the process group, and finally
    /// kills after the grace period. Calling it again is a no-op.
    pub async fn kill(&mut self) -> Result<()> {
        if self.state == ProcessState::Killed {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state, ProcessState::Killed);
        tracing::debug!(plugin = %self.name, from = %previous, "Killing plugin");

        if let Some(transport) = self.transport.take() {
            let bound = Duration::from_millis(SHUTDOWN_NOTIFY_TIMEOUT_MS);
            let _ = tokio::time::timeout(bound, transport.notify(methods::SHUTDOWN, None)).await;
            let _ = tokio::time::timeout(bound, transport.close()).await;
        }

        if let Some(mut child) = self.child.take() {
            terminate(&self.name, self.pid, &mut child, self.kill_grace).await;
        }

        for task in self.io_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

/// SIGTERM the group, wait out the grace period, then force it.
pub(crate) async fn terminate(name: &str, pid: Option<u32>, child: &mut Child, grace: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::debug!(plugin = name, %status, "Plugin already exited");
        return;
    }

    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            signal_group(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(plugin = name, %status, "Plugin stopped");
        }
        _ => {
            tracing::warn!(
                plugin = name,
                grace_ms = grace.as_millis() as u64,
                "Plugin ignored termination, killing"
            );
            #[cfg(unix)]
            {
                if let Some(pid) = pid {
                    signal_group(pid, libc::SIGKILL);
                }
            }
            if let Err(e) = child.kill().await {
                tracing::warn!(plugin = name, error = %e, "Failed to reap plugin");
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: the child was spawned as leader of its own process group,
    // so -pid addresses only that group.
    unsafe {
        libc::kill(-(pid as i32), signal);
    }
}
