//! SDK error types.

use tether_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while serving a plugin.
#[derive(Error, Debug)]
pub enum SdkError {
    /// The binary was started by something other than the tether host.
    #[error(
        "This binary is a tether plugin and is not meant to be executed directly.\n\
         Install it under the tether plugins directory and run it through `tether`."
    )]
    NotLaunchedByHost,

    /// Framing or decoding failure on the RPC connection.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
