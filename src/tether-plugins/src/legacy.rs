//! Legacy mode: the spawned program polls the host, under a hard deadline.
//!
//! The host binds a loopback listener, hands its address to the program via
//! `TETHER_HOST_ADDR`, and answers `host/command` and `host/prompt` until the
//! program reports `host/complete` or exits. The program's stdio is inherited.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_protocol::codec::{read_frame, write_frame};
use tether_protocol::{
    FlagValue, HOST_ADDR_ENV, HostCommand, HostFlag, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION,
    PROTOCOL_VERSION_KEY, PromptAnswer, PromptRequest, methods,
};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::PluginHostConfig;
use crate::error::{EXIT_FAILURE, PluginError, Result};
use crate::manifest::PluginManifest;
use crate::process::terminate;
use crate::prompt::Prompter;
use crate::supervisor::isolate_process_group;
use crate::synth::Invocation;

impl From<&Invocation> for HostCommand {
    fn from(invocation: &Invocation) -> Self {
        let flags = invocation
            .flags
            .iter()
            .map(|flag| HostFlag {
                name: flag.definition.name.clone(),
                value: match &flag.value {
                    FlagValue::String(s) => s.clone(),
                    FlagValue::Bool(b) => b.to_string(),
                },
                options: flag.definition.options.clone(),
                prompt: flag.definition.prompt.clone(),
            })
            .collect();
        Self {
            cmd: invocation.command_name().to_string(),
            args: invocation.positional.clone(),
            flags,
            interactive: invocation.command.interactive,
        }
    }
}

/// How a legacy run ended.
enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Completed,
    DeadlineExceeded,
    Interrupted,
}

/// Runs legacy-mode plugins.
pub struct LegacyRunner {
    deadline: Duration,
    kill_grace: Duration,
    prompter: Arc<dyn Prompter>,
}

impl LegacyRunner {
    pub fn new(config: &PluginHostConfig, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            deadline: config.legacy_deadline(),
            kill_grace: config.kill_grace(),
            prompter,
        }
    }

    /// Run the program once. The manifest's own deadline wins over the default.
    pub async fn run(
        &self,
        manifest: &PluginManifest,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let name = manifest.root_name.as_str();
        let deadline = manifest.deadline.unwrap_or(self.deadline);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let completed = CancellationToken::new();
        let server = tokio::spawn(serve(
            name.to_string(),
            listener,
            HostCommand::from(invocation),
            self.prompter.clone(),
            completed.clone(),
        ));

        let mut cmd = Command::new(&manifest.launch_command);
        cmd.args(&manifest.launch_args)
            .current_dir(&manifest.dir)
            .env(HOST_ADDR_ENV, address.to_string())
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env(PROTOCOL_VERSION_KEY, PROTOCOL_VERSION.to_string())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                server.abort();
                return Err(PluginError::Spawn {
                    plugin: name.to_string(),
                    source,
                });
            }
        };
        let pid = child.id();
        tracing::debug!(plugin = name, pid, %address, deadline_ms = deadline.as_millis() as u64, "Legacy plugin started");

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = completed.cancelled() => Outcome::Completed,
            _ = tokio::time::sleep(deadline) => Outcome::DeadlineExceeded,
            _ = cancel.cancelled() => Outcome::Interrupted,
        };

        let result = match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PluginError::Exit {
                        plugin: name.to_string(),
                        code: status.code().unwrap_or(EXIT_FAILURE),
                    })
                }
            }
            Outcome::Completed => {
                tracing::debug!(plugin = name, "Legacy plugin reported completion");
                if tokio::time::timeout(self.kill_grace, child.wait()).await.is_err() {
                    terminate(name, pid, &mut child, self.kill_grace).await;
                }
                Ok(())
            }
            Outcome::DeadlineExceeded => {
                tracing::warn!(plugin = name, "Legacy plugin exceeded its deadline");
                terminate(name, pid, &mut child, self.kill_grace).await;
                Err(PluginError::DeadlineExceeded {
                    plugin: name.to_string(),
                    timeout: deadline,
                })
            }
            Outcome::Interrupted => {
                terminate(name, pid, &mut child, self.kill_grace).await;
                Err(PluginError::Interrupted {
                    plugin: name.to_string(),
                })
            }
        };

        server.abort();
        result
    }
}

/// Accept connections from the program until aborted.
async fn serve(
    plugin: String,
    listener: TcpListener,
    command: HostCommand,
    prompter: Arc<dyn Prompter>,
    completed: CancellationToken,
) {
    let command = Arc::new(command);
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!(plugin = %plugin, error = %e, "Legacy listener failed");
                return;
            }
        };
        let handler = Handler {
            plugin: plugin.clone(),
            command: command.clone(),
            prompter: prompter.clone(),
            completed: completed.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = handler.handle(stream).await {
                tracing::debug!(plugin = %handler.plugin, error = %e, "Legacy connection ended");
            }
        });
    }
}

struct Handler {
    plugin: String,
    command: Arc<HostCommand>,
    prompter: Arc<dyn Prompter>,
    completed: CancellationToken,
}

impl Handler {
    async fn handle(&self, stream: TcpStream) -> tether_protocol::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut buf = String::new();

        while let Some(message) = read_frame(&mut reader, &mut buf).await? {
            match message {
                JsonRpcMessage::Request(request) => {
                    let response = match self.dispatch(&request).await {
                        Ok(result) => JsonRpcResponse::success(request.id, result),
                        Err(error) => JsonRpcResponse::error(request.id, error),
                    };
                    write_frame(&mut write, &response).await?;
                }
                JsonRpcMessage::Notification(notification) => {
                    if notification.method == methods::HOST_COMPLETE {
                        self.completed.cancel();
                    }
                }
                JsonRpcMessage::Response(_) => {}
            }
        }
        Ok(())
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        tracing::debug!(plugin = %self.plugin, method = %request.method, "Legacy request");
        match request.method.as_str() {
            methods::HOST_COMMAND => serde_json::to_value(self.command.as_ref())
                .map_err(|e| JsonRpcError::internal_error(e.to_string())),
            methods::HOST_PROMPT => {
                let prompt: PromptRequest =
                    serde_json::from_value(request.params.clone().unwrap_or(Value::Null))
                        .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                let prompter = self.prompter.clone();
                let answer = tokio::task::spawn_blocking(move || {
                    if prompt.options.is_empty() {
                        prompter.text(&prompt.prompt)
                    } else {
                        prompter.select(&prompt.prompt, &prompt.options)
                    }
                })
                .await
                .map_err(|e| JsonRpcError::internal_error(e.to_string()))?
                .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
                serde_json::to_value(PromptAnswer { answer })
                    .map_err(|e| JsonRpcError::internal_error(e.to_string()))
            }
            methods::HOST_COMPLETE => {
                self.completed.cancel();
                Ok(Value::Null)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use tether_protocol::{CommandDefinition, FlagDefinition, JsonRpcNotification};
    use tokio::io::AsyncBufReadExt;

    fn invocation() -> Invocation {
        let command = CommandDefinition::new("report")
            .interactive()
            .with_flag(FlagDefinition::string("format").with_options(["csv", "json"]))
            .with_flag(FlagDefinition::bool("dry-run"));
        let mut invocation = Invocation::new("legacy", command).with_positional(vec!["q1".into()]);
        invocation
            .set_flag("format", FlagValue::String("csv".into()))
            .unwrap();
        invocation
    }

    #[test]
    fn test_host_command_from_invocation() {
        let command = HostCommand::from(&invocation());
        assert_eq!(command.cmd, "report");
        assert_eq!(command.args, vec!["q1"]);
        assert_eq!(command.flag("format"), Some("csv"));
        assert_eq!(command.flag("dry-run"), Some("false"));
        assert!(command.interactive);
    }

    #[tokio::test]
    async fn test_handler_answers_and_completes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let completed = CancellationToken::new();
        let server = tokio::spawn(serve(
            "legacy".into(),
            listener,
            HostCommand::from(&invocation()),
            Arc::new(ScriptedPrompter::new(["json"])),
            completed.clone(),
        ));

        let stream = TcpStream::connect(address).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write_frame(&mut write, &JsonRpcRequest::new(1, methods::HOST_COMMAND))
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["result"]["cmd"], "report");

        let prompt = JsonRpcRequest::new(2, methods::HOST_PROMPT).with_params(
            serde_json::json!({"prompt": "Format?", "options": ["csv", "json"]}),
        );
        write_frame(&mut write, &prompt).await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["result"]["answer"], "json");

        write_frame(&mut write, &JsonRpcNotification::new(methods::HOST_COMPLETE))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), completed.cancelled())
            .await
            .unwrap();
        server.abort();
    }
}
