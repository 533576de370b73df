//! Exec method payloads.

use serde::{Deserialize, Serialize};

use crate::jsonrpc::RequestId;

/// Parameters of `plugin/exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    /// Name of the command to run.
    pub command_name: String,
    /// Canonical flags followed by positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExecRequest {
    pub fn new(command_name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command_name: command_name.into(),
            args,
        }
    }
}

/// One fragment of command output. Either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    #[serde(default, with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub stdout: Vec<u8>,
    #[serde(default, with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub stderr: Vec<u8>,
}

impl OutputChunk {
    pub fn stdout(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: bytes.into(),
            stderr: Vec::new(),
        }
    }

    pub fn stderr(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// Params of the `plugin/execChunk` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecChunk {
    /// Id of the exec request this chunk belongs to.
    pub request_id: RequestId,
    #[serde(flatten)]
    pub output: OutputChunk,
}

/// End marker of an exec stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    #[serde(default)]
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success() -> Self {
        Self { exit_code: 0 }
    }

    pub fn exit(code: i32) -> Self {
        Self { exit_code: code }
    }
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_bytes_are_base64() {
        let chunk = ExecChunk {
            request_id: RequestId::Number(3),
            output: OutputChunk::stdout(b"hi\n".to_vec()),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value, json!({"requestId": 3, "stdout": "aGkK"}));

        let decoded: ExecChunk = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.output.stdout, b"hi\n");
        assert!(decoded.output.stderr.is_empty());
    }

    #[test]
    fn test_binary_output_survives() {
        let chunk = OutputChunk::stderr(vec![0u8, 159, 146, 150, 255]);
        let text = serde_json::to_string(&chunk).unwrap();
        let decoded: OutputChunk = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_exec_request_wire_names() {
        let request = ExecRequest::new("greet", vec!["--name=x".into()]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"commandName": "greet", "args": ["--name=x"]}));
    }

    #[test]
    fn test_exec_result_defaults_to_success() {
        let result: ExecResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(result, ExecResult::success());
    }
}
