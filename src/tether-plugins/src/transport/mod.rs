//! RPC channel between the host and one plugin process.
//!
//! A [`Transport`] offers unary calls and server-streaming calls. Concrete
//! implementations:
//! - [`SocketTransport`]: JSON-RPC lines over TCP, a unix socket, or any byte stream
//! - [`MemoryTransport`]: direct dispatch to an in-process [`PluginService`]
//!
//! [`PluginService`]: tether_protocol::PluginService

mod memory;
mod socket;

use async_trait::async_trait;
use serde_json::Value;
use tether_protocol::{JsonRpcError, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryTransport;
pub use socket::SocketTransport;

/// Capacity of the frame buffer between a streaming call and its consumer.
pub(crate) const STREAM_BUFFER: usize = 64;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the advertised address.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Peer went away or the transport was closed.
    #[error("Connection closed")]
    Closed,

    /// The plugin answered with an error.
    #[error("Remote error: {0}")]
    Remote(JsonRpcError),

    /// Framing or decoding failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Address kind not available on this platform.
    #[error("Unsupported transport: {0}")]
    Unsupported(String),
}

/// One frame of a server-streaming call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Intermediate item (notification params)
    Item(Value),
    /// Final result; nothing follows it
    End(Value),
}

/// Receiving side of a streaming call.
///
/// Dropping it abandons the call; the transport stops forwarding frames.
#[derive(Debug)]
pub struct RpcStream {
    rx: mpsc::Receiver<Result<StreamFrame, TransportError>>,
}

impl RpcStream {
    /// Create a stream and the sender feeding it.
    pub fn channel(
        capacity: usize,
    ) -> (mpsc::Sender<Result<StreamFrame, TransportError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Next frame, or `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<Result<StreamFrame, TransportError>> {
        self.rx.recv().await
    }
}

/// RPC channel to a plugin.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Unary request/response.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError>;

    /// Server-streaming request: items followed by one end frame.
    async fn stream(&self, method: &str, params: Option<Value>)
    -> Result<RpcStream, TransportError>;

    /// Fire-and-forget notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Release the channel. Further calls fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the channel is still usable.
    fn is_connected(&self) -> bool;
}
