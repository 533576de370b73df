//! Tether Plugin SDK - serve a [`PluginService`] to the tether host.
//!
//! A plugin binary implements [`PluginService`] and hands it to [`serve`].
//! The SDK checks that the host launched it, listens on a loopback port,
//! prints the handshake line and answers `plugin/discover` and `plugin/exec`
//! until the host shuts it down.
//!
//! # Arguments
//!
//! `ExecRequest::args` is not the user's command line. The host rewrites it
//! into canonical form before sending it:
//!
//! - string flags as `--name=value`, in declaration order
//! - bool flags as a bare `--name` when true, omitted when false
//! - a literal `--` whenever positionals follow, then the positionals
//!
//! The `--` is inserted even if the user never typed one, so a positional
//! that starts with a dash still arrives as a positional. Decode with
//! [`decode_canonical_args`](prelude::decode_canonical_args) rather than
//! splitting by hand:
//!
//! ```rust
//! use tether_plugin_sdk::prelude::*;
//!
//! let args: Vec<String> = ["--name=Ada", "--loud", "--", "-x", "rest"]
//!     .iter()
//!     .map(|a| a.to_string())
//!     .collect();
//! let decoded = decode_canonical_args(&args).unwrap();
//! assert_eq!(decoded.get_str("name"), Some("Ada"));
//! assert!(decoded.get_bool("loud"));
//! assert_eq!(decoded.positional, vec!["-x", "rest"]);
//! ```
//!
//! # Example
//! ```rust,ignore
//! use async_trait::async_trait;
//! use tether_plugin_sdk::prelude::*;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl PluginService for Hello {
//!     async fn discover(&self) -> Result<Vec<CommandDefinition>, JsonRpcError> {
//!         Ok(vec![CommandDefinition::new("hello").with_short("Say hello")])
//!     }
//!
//!     async fn exec(&self, _: ExecRequest, out: OutputSink) -> Result<ExecResult, JsonRpcError> {
//!         out.stdout("hello\n").await?;
//!         Ok(ExecResult::success())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tether_plugin_sdk::Result<()> {
//!     tether_plugin_sdk::serve(Hello).await
//! }
//! ```

mod error;
mod server;

pub use error::{Result, SdkError};
pub use server::{PluginServer, serve, serve_connection};

/// Everything a plugin implementation usually needs.
pub mod prelude {
    pub use tether_protocol::{
        CommandDefinition, ExecRequest, ExecResult, FlagDefinition, JsonRpcError, OutputSink,
        PluginService, decode_canonical_args,
    };
}
