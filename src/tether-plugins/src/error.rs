//! Plugin host error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit status used for failures that carry no better code.
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for local usage errors such as a missing required flag.
pub const EXIT_USAGE: i32 = 2;
/// Exit status for a deadline overrun, as used by `timeout(1)`.
pub const EXIT_DEADLINE: i32 = 124;
/// Exit status after an interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

/// Plugin host errors.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Manifest could not be read, parsed or validated.
    #[error("Invalid manifest for plugin '{plugin}' ({}): {message}", .path.display())]
    Manifest {
        plugin: String,
        path: PathBuf,
        message: String,
    },

    /// Subprocess could not be started.
    #[error("Failed to launch plugin '{plugin}': {source}")]
    Spawn {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    /// Handshake line missing, malformed, or cookie/version mismatch.
    #[error("Handshake with plugin '{plugin}' failed: {message}")]
    Handshake { plugin: String, message: String },

    /// No handshake within the startup timeout.
    #[error("Plugin '{plugin}' did not complete its handshake within {}ms", .timeout.as_millis())]
    StartupTimeout { plugin: String, timeout: Duration },

    /// Discover call failed or returned an undecodable schema.
    #[error("Schema discovery for plugin '{plugin}' failed: {message}")]
    Discovery { plugin: String, message: String },

    /// Schema decoded but cannot be mirrored onto the command line.
    #[error("Plugin '{plugin}' declared an invalid schema: {message}")]
    InvalidSchema { plugin: String, message: String },

    /// Required flags absent at invocation time.
    #[error("Missing required flag(s) for '{command}': {}", .flags.iter().map(|f| format!("--{f}")).collect::<Vec<_>>().join(", "))]
    MissingRequiredFlag { command: String, flags: Vec<String> },

    /// Flag value could not be converted to the flag's type.
    #[error("Invalid value '{value}' for flag --{flag}: {message}")]
    InvalidFlagValue {
        flag: String,
        value: String,
        message: String,
    },

    /// Interactive prompt failed.
    #[error("Prompt failed: {0}")]
    Prompt(String),

    /// Transport failed before the end of the output stream.
    #[error("Execution of plugin '{plugin}' failed: {message}")]
    Execution { plugin: String, message: String },

    /// Wall-clock deadline elapsed; the process was killed.
    #[error("Plugin '{plugin}' exceeded its deadline of {}ms", .timeout.as_millis())]
    DeadlineExceeded { plugin: String, timeout: Duration },

    /// Plugin command finished with a non-zero exit code.
    #[error("Plugin '{plugin}' exited with code {code}")]
    Exit { plugin: String, code: i32 },

    /// Invocation aborted by an external interrupt.
    #[error("Plugin '{plugin}' was interrupted")]
    Interrupted { plugin: String },

    /// Plugin not found.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// Plugin already exists.
    #[error("Plugin already exists: {0}")]
    AlreadyExists(String),

    /// Invalid plugin state.
    #[error("Invalid plugin state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Create a manifest error.
    pub fn manifest_error(
        plugin: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Manifest {
            plugin: plugin.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a handshake error.
    pub fn handshake_error(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handshake {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a discovery error.
    pub fn discovery_error(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an execution error.
    pub fn execution_error(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Classified kind, as reported to the user.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manifest { .. } => "ManifestError",
            Self::Spawn { .. } => "SpawnError",
            Self::Handshake { .. } => "HandshakeError",
            Self::StartupTimeout { .. } => "StartupTimeoutError",
            Self::Discovery { .. } => "DiscoveryError",
            Self::InvalidSchema { .. } => "InvalidSchemaError",
            Self::MissingRequiredFlag { .. } => "MissingRequiredFlagError",
            Self::InvalidFlagValue { .. } => "InvalidFlagValueError",
            Self::Prompt(_) => "PromptError",
            Self::Execution { .. } => "ExecutionError",
            Self::DeadlineExceeded { .. } => "DeadlineExceeded",
            Self::Exit { .. } => "ExitError",
            Self::Interrupted { .. } => "Interrupted",
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::InvalidState { .. } => "InvalidState",
            Self::Io(_) => "IoError",
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingRequiredFlag { .. } | Self::InvalidFlagValue { .. } => EXIT_USAGE,
            Self::DeadlineExceeded { .. } => EXIT_DEADLINE,
            Self::Interrupted { .. } => EXIT_INTERRUPTED,
            Self::Exit { code, .. } if *code != 0 => *code,
            _ => EXIT_FAILURE,
        }
    }

    /// Name of the plugin the error belongs to, if any.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::Manifest { plugin, .. }
            | Self::Spawn { plugin, .. }
            | Self::Handshake { plugin, .. }
            | Self::StartupTimeout { plugin, .. }
            | Self::Discovery { plugin, .. }
            | Self::InvalidSchema { plugin, .. }
            | Self::Execution { plugin, .. }
            | Self::DeadlineExceeded { plugin, .. }
            | Self::Exit { plugin, .. }
            | Self::Interrupted { plugin } => Some(plugin),
            Self::NotFound(plugin) | Self::AlreadyExists(plugin) => Some(plugin),
            _ => None,
        }
    }
}

/// Result type alias for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PluginError::NotFound("test-plugin".to_string());
        assert_eq!(err.to_string(), "Plugin not found: test-plugin");
    }

    #[test]
    fn test_missing_flags_display() {
        let err = PluginError::MissingRequiredFlag {
            command: "greet".into(),
            flags: vec!["name".into(), "region".into()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required flag(s) for 'greet': --name, --region"
        );
        assert_eq!(err.kind(), "MissingRequiredFlagError");
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_exit_codes() {
        let exit = PluginError::Exit {
            plugin: "p".into(),
            code: 3,
        };
        assert_eq!(exit.exit_code(), 3);

        let deadline = PluginError::DeadlineExceeded {
            plugin: "p".into(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(deadline.exit_code(), EXIT_DEADLINE);
        assert_eq!(deadline.kind(), "DeadlineExceeded");
        assert!(deadline.to_string().contains("50ms"));

        assert_eq!(
            PluginError::handshake_error("p", "cookie").exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_manifest_error_mentions_path() {
        let err = PluginError::manifest_error("hello", "/plugins/hello/plugin.toml", "bad");
        let text = err.to_string();
        assert!(text.contains("hello"));
        assert!(text.contains("/plugins/hello/plugin.toml"));
        assert_eq!(err.plugin(), Some("hello"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let plugin_err: PluginError = io_err.into();
        assert!(matches!(plugin_err, PluginError::Io(_)));
    }
}
