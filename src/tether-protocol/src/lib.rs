//! Tether Protocol - the private wire contract between the tether host and its plugins.
//!
//! A plugin is an independently built executable. The host launches it, reads a
//! single handshake line from its stdout, connects to the advertised address and
//! then speaks newline-delimited JSON-RPC 2.0 over that connection.
//!
//! # Features
//! - Handshake line parsing and validation (`<version>|<cookie>|<address>`)
//! - JSON-RPC 2.0 request/response/notification frames and a line codec
//! - Command and flag schema types returned by the Discover method
//! - Exec request, streamed output chunk and end-marker types
//! - Canonical argument encoding shared by both sides
//! - The [`PluginService`] trait a plugin implements
//! - Payloads of the legacy mode, where the program calls back into the host
//!
//! # Example
//! ```rust
//! use tether_protocol::{CommandDefinition, FlagDefinition, HandshakeLine};
//!
//! let command = CommandDefinition::new("greet [name]")
//!     .with_short("Say hello")
//!     .with_flag(FlagDefinition::string("greeting").with_shorthand('g'));
//! assert_eq!(command.name(), "greet");
//!
//! let line = HandshakeLine::parse("1|cookie|tcp://127.0.0.1:4000").unwrap();
//! assert_eq!(line.protocol_version, 1);
//! ```

// ============================================================================
// Module declarations
// ============================================================================

mod args;
pub mod codec;
mod error;
mod exec;
mod handshake;
mod jsonrpc;
mod legacy;
mod schema;
mod service;

/// Method name constants.
pub mod methods;

// ============================================================================
// Re-exports
// ============================================================================

pub use args::{
    DecodedArgs, FlagValue, decode_canonical_args, encode_canonical_args, parse_bool_loose,
};
pub use error::{ProtocolError, Result};
pub use exec::{ExecChunk, ExecRequest, ExecResult, OutputChunk};
pub use handshake::{
    HandshakeLine, HandshakeMismatch, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION,
    PROTOCOL_VERSION_KEY, TransportAddress,
};
pub use jsonrpc::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use legacy::{HOST_ADDR_ENV, HostCommand, HostFlag, PromptAnswer, PromptRequest};
pub use schema::{CommandDefinition, DiscoverResult, FlagDefinition, FlagType};
pub use service::{OutputSink, PluginService};
