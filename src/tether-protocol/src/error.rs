//! Protocol error types.

use thiserror::Error;

/// Errors raised while parsing or framing protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The handshake line could not be parsed.
    #[error("Malformed handshake line '{line}': {reason}")]
    MalformedHandshake { line: String, reason: String },

    /// The advertised transport address is not understood.
    #[error("Invalid transport address '{0}'")]
    InvalidAddress(String),

    /// A canonical argument could not be decoded.
    #[error("Invalid canonical argument '{0}'")]
    InvalidArgument(String),

    /// A frame exceeded the maximum accepted size.
    #[error("Frame exceeds maximum size of {max} bytes")]
    FrameTooLarge { max: usize },

    /// JSON encode/decode failure.
    #[error("Frame decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O failure on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Create a malformed handshake error.
    pub fn malformed_handshake(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedHandshake {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
