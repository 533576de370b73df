//! Plugin manifest parsing and validation.
//!
//! A manifest lives in its plugin's directory as `plugin.toml` (or
//! `plugin.json`):
//!
//! ```toml
//! [plugin]
//! name = "hello"
//! short = "Friendly greetings"
//! command = "${TETHER_HOME}/plugins/hello/hello-plugin"
//! args = ["--serve"]
//!
//! # Optional: a static command tree used instead of asking the plugin.
//! [[commands]]
//! use = "greet"
//! short = "Say hello"
//! [[commands.flags]]
//! name = "name"
//! type = "string"
//! required = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tether_protocol::CommandDefinition;

use crate::error::{PluginError, Result};

/// Primary manifest file name.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Alternative JSON manifest file name.
pub const MANIFEST_JSON_FILE: &str = "plugin.json";

/// How the host talks to a plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PluginMode {
    /// Host connects to the plugin and issues Discover/Exec.
    #[default]
    Rpc,
    /// The program connects back to the host and runs under a hard deadline.
    Legacy,
}

impl std::fmt::Display for PluginMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rpc => write!(f, "rpc"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// On-disk manifest layout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestFile {
    /// Plugin identity and launch command.
    pub plugin: ManifestSection,

    /// Static command tree; when present, Discover is skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandDefinition>,
}

/// The `[plugin]` table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestSection {
    /// Root command name.
    pub name: String,

    /// One-line description.
    #[serde(default)]
    pub short: String,

    /// Long description.
    #[serde(default)]
    pub long: String,

    /// Executable to launch. `$VAR` and `${VAR}` are expanded.
    pub command: String,

    /// Launch arguments. `$VAR` and `${VAR}` are expanded.
    #[serde(default)]
    pub args: Vec<String>,

    /// Protocol mode.
    #[serde(default)]
    pub mode: PluginMode,

    /// Deadline in seconds for legacy-mode runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Serialization format of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    /// Guess the format from a file name.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// A loaded, expanded and validated manifest. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    pub root_name: String,
    pub short: String,
    pub long: String,
    pub launch_command: String,
    pub launch_args: Vec<String>,
    pub mode: PluginMode,
    pub deadline: Option<Duration>,
    pub static_commands: Option<Vec<CommandDefinition>>,
    /// Plugin directory; the subprocess runs here.
    pub dir: PathBuf,
    /// Manifest file path.
    pub path: PathBuf,
}

impl PluginManifest {
    /// Read and validate a manifest file.
    pub async fn load(path: &Path) -> Result<Self> {
        let fallback = fallback_name(path);
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PluginError::manifest_error(&fallback, path, format!("cannot read manifest: {e}"))
        })?;
        Self::parse(&content, ManifestFormat::from_path(path), path)
    }

    /// Parse manifest text. `path` is used for error reporting and to locate
    /// the plugin directory.
    pub fn parse(content: &str, format: ManifestFormat, path: &Path) -> Result<Self> {
        let fallback = fallback_name(path);
        let file: ManifestFile = match format {
            ManifestFormat::Toml => toml::from_str(content).map_err(|e| {
                PluginError::manifest_error(&fallback, path, format!("Failed to parse TOML: {e}"))
            })?,
            ManifestFormat::Json => serde_json::from_str(content).map_err(|e| {
                PluginError::manifest_error(&fallback, path, format!("Failed to parse JSON: {e}"))
            })?,
        };
        Self::from_file(file, path)
    }

    /// Expand and validate a decoded manifest.
    pub fn from_file(file: ManifestFile, path: &Path) -> Result<Self> {
        let ManifestFile { plugin, commands } = file;
        let name = plugin.name.trim().to_string();
        let error = |message: String| {
            let plugin = if name.is_empty() {
                fallback_name(path)
            } else {
                name.clone()
            };
            PluginError::manifest_error(plugin, path, message)
        };

        validate_root_name(&name).map_err(|m| error(m.to_string()))?;

        let command = tether_common::expand_env(&plugin.command)
            .map_err(|e| error(format!("command: {e}")))?;
        let mut launch_args = plugin
            .args
            .iter()
            .map(|arg| tether_common::expand_env(arg))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| error(format!("args: {e}")))?;

        let mut launch_command = command.trim().to_string();
        if launch_args.is_empty() && launch_command.contains(char::is_whitespace) {
            let mut words = shlex::split(&launch_command)
                .ok_or_else(|| error("command has unbalanced quotes".to_string()))?
                .into_iter();
            launch_command = words.next().unwrap_or_default();
            launch_args = words.collect();
        }
        if launch_command.is_empty() {
            return Err(error("command cannot be empty".to_string()));
        }

        if plugin.mode == PluginMode::Legacy && commands.is_empty() {
            return Err(error(
                "legacy plugins must declare their [[commands]] in the manifest".to_string(),
            ));
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            root_name: name,
            short: plugin.short,
            long: plugin.long,
            launch_command,
            launch_args,
            mode: plugin.mode,
            deadline: plugin.timeout_secs.map(Duration::from_secs),
            static_commands: (!commands.is_empty()).then_some(commands),
            dir,
            path: path.to_path_buf(),
        })
    }

    /// Whether the command tree comes from the manifest instead of Discover.
    pub fn has_static_commands(&self) -> bool {
        self.static_commands.is_some()
    }

    /// JSON Schema describing the manifest file.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ManifestFile)
    }
}

fn validate_root_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("plugin name cannot be empty");
    }
    if name.chars().any(char::is_whitespace) {
        return Err("plugin name cannot contain whitespace");
    }
    if name.starts_with('-') {
        return Err("plugin name cannot start with '-'");
    }
    Ok(())
}

/// Name used in errors before the manifest's own name is known.
fn fallback_name(path: &Path) -> String {
    path.parent()
        .and_then(|dir| dir.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tether_protocol::FlagType;

    fn parse(content: &str) -> Result<PluginManifest> {
        PluginManifest::parse(
            content,
            ManifestFormat::Toml,
            Path::new("/plugins/hello/plugin.toml"),
        )
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = parse(
            r#"
            [plugin]
            name = "hello"
            short = "Say hi"
            command = "/bin/hello"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.root_name, "hello");
        assert_eq!(manifest.short, "Say hi");
        assert_eq!(manifest.launch_command, "/bin/hello");
        assert!(manifest.launch_args.is_empty());
        assert_eq!(manifest.mode, PluginMode::Rpc);
        assert_eq!(manifest.dir, PathBuf::from("/plugins/hello"));
        assert!(!manifest.has_static_commands());
    }

    #[test]
    #[serial]
    fn test_env_expansion_in_command_and_args() {
        // SAFETY: serialized with the other env-mutating tests
        unsafe {
            std::env::set_var("TETHER_TEST_PLUGIN_BIN", "/opt/bin");
        }
        let manifest = parse(
            r#"
            [plugin]
            name = "hello"
            command = "${TETHER_TEST_PLUGIN_BIN}/hello"
            args = ["--root=$TETHER_TEST_PLUGIN_BIN"]
            "#,
        )
        .unwrap();
        unsafe {
            std::env::remove_var("TETHER_TEST_PLUGIN_BIN");
        }

        assert_eq!(manifest.launch_command, "/opt/bin/hello");
        assert_eq!(manifest.launch_args, vec!["--root=/opt/bin".to_string()]);
    }

    #[test]
    fn test_command_with_inline_args_is_split() {
        let manifest = parse(
            r#"
            [plugin]
            name = "py"
            command = "python3 -u 'my plugin.py'"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.launch_command, "python3");
        assert_eq!(manifest.launch_args, vec!["-u", "my plugin.py"]);
    }

    #[test]
    fn test_static_commands() {
        let manifest = parse(
            r#"
            [plugin]
            name = "deploy"
            command = "deployer"

            [[commands]]
            use = "ship <app>"
            short = "Ship it"

            [[commands.flags]]
            name = "env"
            shorthand = "e"
            type = "string"
            required = true
            options = ["staging", "prod"]
            "#,
        )
        .unwrap();

        let commands = manifest.static_commands.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name(), "ship");
        assert_eq!(commands[0].flags[0].flag_type, FlagType::String);
        assert_eq!(commands[0].flags[0].options, vec!["staging", "prod"]);
    }

    #[test]
    fn test_json_manifest() {
        let manifest = PluginManifest::parse(
            r#"{"plugin": {"name": "j", "command": "j-bin", "mode": "rpc"}}"#,
            ManifestFormat::Json,
            Path::new("/plugins/j/plugin.json"),
        )
        .unwrap();
        assert_eq!(manifest.root_name, "j");
    }

    #[test]
    fn test_invalid_manifests() {
        let cases = [
            ("not toml at all [", "parse"),
            ("[plugin]\nname = \"\"\ncommand = \"x\"", "empty"),
            ("[plugin]\nname = \"two words\"\ncommand = \"x\"", "whitespace"),
            ("[plugin]\nname = \"-x\"\ncommand = \"x\"", "'-'"),
            ("[plugin]\nname = \"x\"\ncommand = \"  \"", "command cannot be empty"),
            ("[plugin]\nname = \"x\"\ncommand = \"a 'b\"", "unbalanced"),
            (
                "[plugin]\nname = \"x\"\ncommand = \"x\"\nmode = \"legacy\"",
                "legacy",
            ),
        ];
        for (content, needle) in cases {
            let err = parse(content).unwrap_err();
            assert!(matches!(err, PluginError::Manifest { .. }), "{content}");
            assert!(
                err.to_string().contains(needle),
                "'{err}' should mention '{needle}'"
            );
        }
    }

    #[test]
    fn test_parse_error_uses_directory_name() {
        let err = parse("garbage =").unwrap_err();
        assert_eq!(err.plugin(), Some("hello"));
    }

    #[test]
    fn test_json_schema_mentions_fields() {
        let schema = serde_json::to_value(PluginManifest::json_schema()).unwrap();
        let text = schema.to_string();
        assert!(text.contains("ManifestSection"));
        assert!(text.contains("timeout_secs"));
    }
}
