//! # Tether Plugin Host
//!
//! Extends the tether command line at runtime with subcommands served by
//! independently built plugin executables.
//!
//! ## Features
//!
//! - **Discovery**: one plugin per subdirectory of the plugins root, described by `plugin.toml`
//! - **Supervision**: spawn, versioned handshake, startup timeout, graceful-then-forced kill
//! - **Schema**: commands and flags fetched with a Discover call, or declared statically
//! - **Synthesis**: clap commands mirroring each schema, required flags, interactive prompts
//! - **Execution**: Exec call with output streamed to the terminal as it arrives
//! - **Legacy mode**: programs that call back into the host under a hard deadline
//!
//! ## Plugin Layout
//!
//! ```text
//! plugins/
//! └── hello/
//!     ├── plugin.toml      # Manifest: name, description, launch command
//!     └── hello-plugin     # Executable speaking the tether protocol
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_plugins::{CommandSynthesizer, PluginHost, PluginRegistry, StaticConfigStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = StaticConfigStore::new("/opt/tether/plugins");
//!     let synthesizer = CommandSynthesizer::default();
//!     let registry = PluginRegistry::load(&store, &synthesizer).await?;
//!
//!     for plugin in registry.plugins() {
//!         println!("{}: {} commands", plugin.name(), plugin.commands.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod handshake;
pub mod host;
pub mod legacy;
pub mod manifest;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod scanner;
pub mod schema;
pub mod supervisor;
pub mod synth;
pub mod transport;

// Re-exports for convenience
pub use bridge::{ExecOutcome, ExecutionBridge};
pub use config::{ConfigStore, PluginHostConfig, StaticConfigStore};
pub use error::{
    EXIT_DEADLINE, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_USAGE, PluginError, Result,
};
pub use handshake::HandshakeNegotiator;
pub use host::PluginHost;
pub use legacy::LegacyRunner;
pub use manifest::{MANIFEST_FILE, MANIFEST_JSON_FILE, ManifestFile, PluginManifest, PluginMode};
pub use process::{PluginProcess, ProcessState};
pub use prompt::{NonInteractive, Prompter, ScriptedPrompter};
pub use registry::{LoadedPlugin, PluginRegistry, SchemaSource};
pub use scanner::{ManifestScanner, PluginFailure, ScanReport};
pub use schema::SchemaClient;
pub use supervisor::{ProcessSupervisor, SupervisorOptions};
pub use synth::{CommandSynthesizer, Invocation, ReservedNames, ResolvedFlag};
pub use transport::{MemoryTransport, RpcStream, SocketTransport, StreamFrame, Transport, TransportError};
