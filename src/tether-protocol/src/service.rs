//! Service contract implemented by every plugin.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::exec::{ExecRequest, ExecResult, OutputChunk};
use crate::jsonrpc::JsonRpcError;
use crate::schema::CommandDefinition;

/// What a plugin offers to the host.
///
/// Serving it over a socket is the SDK's job; the host may also call an
/// implementation in-process.
#[async_trait]
pub trait PluginService: Send + Sync + 'static {
    /// Report the commands this plugin provides.
    async fn discover(&self) -> Result<Vec<CommandDefinition>, JsonRpcError>;

    /// Run one command, writing output through `output` as it is produced.
    async fn exec(
        &self,
        request: ExecRequest,
        output: OutputSink,
    ) -> Result<ExecResult, JsonRpcError>;
}

/// Writer half of an exec output stream.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::Sender<OutputChunk>,
}

impl OutputSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutputChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit a chunk. Empty chunks are dropped.
    pub async fn send(&self, chunk: OutputChunk) -> Result<(), JsonRpcError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(chunk)
            .await
            .map_err(|_| JsonRpcError::internal_error("output stream closed by host"))
    }

    pub async fn stdout(&self, bytes: impl Into<Vec<u8>>) -> Result<(), JsonRpcError> {
        self.send(OutputChunk::stdout(bytes)).await
    }

    pub async fn stderr(&self, bytes: impl Into<Vec<u8>>) -> Result<(), JsonRpcError> {
        self.send(OutputChunk::stderr(bytes)).await
    }

    /// Whether the reading side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
