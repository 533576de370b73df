//! Payloads of the legacy mode, where the spawned program calls the host.
//!
//! The host listens on the address in `TETHER_HOST_ADDR`; the program asks
//! it for the parsed command (`host/command`), may ask it to prompt the user
//! (`host/prompt`), and reports completion (`host/complete`).

use serde::{Deserialize, Serialize};

/// Environment variable carrying the host's listener address (`host:port`).
pub const HOST_ADDR_ENV: &str = "TETHER_HOST_ADDR";

/// Result of `host/command`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCommand {
    /// Command name
    pub cmd: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Every declared flag with its resolved value
    #[serde(default)]
    pub flags: Vec<HostFlag>,
    #[serde(default)]
    pub interactive: bool,
}

impl HostCommand {
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// A flag as seen by a legacy program. Booleans are `"true"` or `"false"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFlag {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
}

/// Params of `host/prompt`. Options turn it into a single-select.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Result of `host/prompt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptAnswer {
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_command_shape() {
        let command: HostCommand = serde_json::from_value(json!({
            "cmd": "report",
            "args": ["q1"],
            "flags": [
                {"name": "format", "value": "csv", "options": ["csv", "json"]},
                {"name": "dry-run", "value": "false"}
            ]
        }))
        .unwrap();
        assert_eq!(command.flag("format"), Some("csv"));
        assert_eq!(command.flag("dry-run"), Some("false"));
        assert!(!command.interactive);
    }
}
