//! Exec call: forward an invocation and stream its output as it arrives.

use std::sync::Arc;
use std::time::Duration;

use tether_protocol::{ExecChunk, ExecRequest, ExecResult, methods};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{PluginError, Result};
use crate::transport::{RpcStream, StreamFrame, Transport};

/// What an exec call produced once its stream ended.
#[derive(Debug)]
pub struct ExecOutcome<O, E> {
    /// Writer that received stdout, handed back
    pub stdout: O,
    /// Writer that received stderr, handed back
    pub stderr: E,
    /// Exit code reported in the end marker
    pub exit_code: i32,
    /// Number of output chunks copied
    pub chunks: usize,
}

/// Issues Exec on one channel.
///
/// A background task copies chunks into the host's writers while the
/// caller waits for the end marker, a deadline, or cancellation.
pub struct ExecutionBridge {
    plugin: String,
    transport: Arc<dyn Transport>,
    deadline: Option<Duration>,
}

impl ExecutionBridge {
    pub fn new(plugin: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            plugin: plugin.into(),
            transport,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn exec<O, E>(
        &self,
        request: &ExecRequest,
        stdout: O,
        stderr: E,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome<O, E>>
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        let params = serde_json::to_value(request)
            .map_err(|e| PluginError::execution_error(&self.plugin, e.to_string()))?;
        let stream = self
            .transport
            .stream(methods::EXEC, Some(params))
            .await
            .map_err(|e| PluginError::execution_error(&self.plugin, e.to_string()))?;

        tracing::debug!(
            plugin = %self.plugin,
            command = %request.command_name,
            args = request.args.len(),
            "Exec started"
        );

        let mut reader = tokio::spawn(drain(self.plugin.clone(), stream, stdout, stderr));
        let abort = reader.abort_handle();
        let cancel = cancel.child_token();
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            joined = &mut reader => match joined {
                Ok(result) => result,
                Err(e) => Err(PluginError::execution_error(
                    &self.plugin,
                    format!("output task failed: {e}"),
                )),
            },
            _ = expired => {
                abort.abort();
                tracing::warn!(plugin = %self.plugin, "Exec deadline exceeded");
                Err(PluginError::DeadlineExceeded {
                    plugin: self.plugin.clone(),
                    timeout: deadline.unwrap_or_default(),
                })
            }
            _ = cancel.cancelled() => {
                abort.abort();
                tracing::debug!(plugin = %self.plugin, "Exec interrupted");
                Err(PluginError::Interrupted {
                    plugin: self.plugin.clone(),
                })
            }
        }
    }
}

/// Copy chunks in order until the end marker.
async fn drain<O, E>(
    plugin: String,
    mut stream: RpcStream,
    mut stdout: O,
    mut stderr: E,
) -> Result<ExecOutcome<O, E>>
where
    O: AsyncWrite + Send + Unpin,
    E: AsyncWrite + Send + Unpin,
{
    let mut chunks = 0;
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| PluginError::execution_error(&plugin, e.to_string()))?;
        match frame {
            StreamFrame::Item(value) => {
                let chunk: ExecChunk = serde_json::from_value(value).map_err(|e| {
                    PluginError::execution_error(&plugin, format!("malformed output chunk: {e}"))
                })?;
                if !chunk.output.stdout.is_empty() {
                    stdout.write_all(&chunk.output.stdout).await?;
                    stdout.flush().await?;
                }
                if !chunk.output.stderr.is_empty() {
                    stderr.write_all(&chunk.output.stderr).await?;
                    stderr.flush().await?;
                }
                chunks += 1;
            }
            StreamFrame::End(value) => {
                let result: ExecResult = serde_json::from_value(value).map_err(|e| {
                    PluginError::execution_error(&plugin, format!("malformed end marker: {e}"))
                })?;
                tracing::debug!(plugin = %plugin, exit_code = result.exit_code, chunks, "Exec finished");
                return Ok(ExecOutcome {
                    stdout,
                    stderr,
                    exit_code: result.exit_code,
                    chunks,
                });
            }
        }
    }
    Err(PluginError::execution_error(
        &plugin,
        "output stream ended before the end marker",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, STREAM_BUFFER};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tether_protocol::{OutputChunk, RequestId};
    use tokio::sync::Mutex;

    type Frames = Vec<std::result::Result<StreamFrame, TransportError>>;

    /// Replays scripted frames, optionally never finishing.
    struct Scripted {
        frames: Mutex<Option<Frames>>,
        hang: bool,
    }

    impl Scripted {
        fn new(frames: Frames) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Some(frames)),
                hang: false,
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Some(Vec::new())),
                hang: true,
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, _: &str, _: Option<Value>) -> std::result::Result<Value, TransportError> {
            Err(TransportError::Closed)
        }

        async fn stream(
            &self,
            _: &str,
            _: Option<Value>,
        ) -> std::result::Result<RpcStream, TransportError> {
            let frames = self.frames.lock().await.take().unwrap_or_default();
            let hang = self.hang;
            let (tx, stream) = RpcStream::channel(STREAM_BUFFER);
            tokio::spawn(async move {
                for frame in frames {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                if hang {
                    tx.closed().await;
                }
            });
            Ok(stream)
        }

        async fn notify(&self, _: &str, _: Option<Value>) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn item(output: OutputChunk) -> std::result::Result<StreamFrame, TransportError> {
        Ok(StreamFrame::Item(
            serde_json::to_value(ExecChunk {
                request_id: RequestId::Number(1),
                output,
            })
            .unwrap(),
        ))
    }

    fn end(code: i32) -> std::result::Result<StreamFrame, TransportError> {
        Ok(StreamFrame::End(json!({ "exitCode": code })))
    }

    async fn run(
        transport: Arc<dyn Transport>,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome<Vec<u8>, Vec<u8>>> {
        ExecutionBridge::new("p", transport)
            .with_deadline(deadline)
            .exec(&ExecRequest::new("run", vec![]), Vec::new(), Vec::new(), cancel)
            .await
    }

    #[tokio::test]
    async fn test_chunks_copied_in_order() {
        let transport = Scripted::new(vec![
            item(OutputChunk::stdout("a")),
            item(OutputChunk::stderr("warn\n")),
            item(OutputChunk::stdout("b")),
            item(OutputChunk::stdout("c")),
            end(0),
        ]);
        let outcome = run(transport, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stdout, b"abc");
        assert_eq!(outcome.stderr, b"warn\n");
        assert_eq!(outcome.chunks, 4);
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let transport = Scripted::new(vec![end(3)]);
        let outcome = run(transport, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let transport = Scripted::new(vec![
            item(OutputChunk::stdout("a")),
            Err(TransportError::Closed),
        ]);
        let err = run(transport, None, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
    }

    #[tokio::test]
    async fn test_stream_without_end_marker() {
        let transport = Scripted::new(vec![item(OutputChunk::stdout("a"))]);
        let err = run(transport, None, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
        assert!(err.to_string().contains("end marker"));
    }

    #[tokio::test]
    async fn test_deadline() {
        let err = run(
            Scripted::hanging(),
            Some(Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "DeadlineExceeded");
    }

    #[tokio::test]
    async fn test_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = run(Scripted::hanging(), None, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "Interrupted");
    }
}
