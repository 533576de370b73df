//! In-process transport dispatching straight to a [`PluginService`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tether_protocol::{
    DiscoverResult, ExecChunk, ExecRequest, JsonRpcError, OutputSink, PluginService, RequestId,
    methods,
};

use super::{RpcStream, STREAM_BUFFER, StreamFrame, Transport, TransportError};

/// Transport backed by a service living in the host process.
///
/// Frames carry the same JSON shapes as the socket transport, so everything
/// above the transport behaves identically.
pub struct MemoryTransport {
    service: Arc<dyn PluginService>,
    connected: AtomicBool,
    next_id: AtomicI64,
}

impl MemoryTransport {
    pub fn new(service: Arc<dyn PluginService>) -> Self {
        Self {
            service,
            connected: AtomicBool::new(true),
            next_id: AtomicI64::new(1),
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value)
        .map_err(|e| TransportError::Protocol(tether_protocol::ProtocolError::Decode(e)))
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, method: &str, _params: Option<Value>) -> Result<Value, TransportError> {
        self.ensure_open()?;
        match method {
            methods::DISCOVER => {
                let commands = self
                    .service
                    .discover()
                    .await
                    .map_err(TransportError::Remote)?;
                encode(&DiscoverResult { commands })
            }
            other => Err(TransportError::Remote(JsonRpcError::method_not_found(other))),
        }
    }

    async fn stream(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RpcStream, TransportError> {
        self.ensure_open()?;
        if method != methods::EXEC {
            return Err(TransportError::Remote(JsonRpcError::method_not_found(
                method,
            )));
        }
        let request: ExecRequest = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| TransportError::Remote(JsonRpcError::invalid_params(e.to_string())))?;

        let request_id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let service = self.service.clone();
        let (tx, stream) = RpcStream::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let (sink, mut chunks) = OutputSink::channel(STREAM_BUFFER);
            let exec = service.exec(request, sink);
            tokio::pin!(exec);
            let mut outcome = None;

            loop {
                tokio::select! {
                    chunk = chunks.recv() => match chunk {
                        Some(output) => {
                            let item = encode(&ExecChunk {
                                request_id: request_id.clone(),
                                output,
                            })
                            .map(StreamFrame::Item);
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    },
                    result = &mut exec, if outcome.is_none() => outcome = Some(result),
                }
            }

            let result = match outcome {
                Some(result) => result,
                None => exec.await,
            };
            let end = match result {
                Ok(result) => encode(&result).map(StreamFrame::End),
                Err(error) => Err(TransportError::Remote(error)),
            };
            let _ = tx.send(end).await;
        });

        Ok(stream)
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<(), TransportError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::{CommandDefinition, ExecResult};

    struct Echo;

    #[async_trait]
    impl PluginService for Echo {
        async fn discover(&self) -> Result<Vec<CommandDefinition>, JsonRpcError> {
            Ok(vec![CommandDefinition::new("echo")])
        }

        async fn exec(
            &self,
            request: ExecRequest,
            output: OutputSink,
        ) -> Result<ExecResult, JsonRpcError> {
            for arg in &request.args {
                output.stdout(arg.clone()).await?;
            }
            Ok(ExecResult::success())
        }
    }

    #[tokio::test]
    async fn test_discover_shape() {
        let transport = MemoryTransport::new(Arc::new(Echo));
        let value = transport.call(methods::DISCOVER, None).await.unwrap();
        assert_eq!(value["commands"][0]["use"], "echo");
    }

    #[tokio::test]
    async fn test_exec_streams_all_chunks_before_end() {
        let transport = MemoryTransport::new(Arc::new(Echo));
        let request = ExecRequest::new("echo", vec!["a".into(), "b".into(), "c".into()]);
        let mut stream = transport
            .stream(methods::EXEC, Some(serde_json::to_value(&request).unwrap()))
            .await
            .unwrap();

        let mut out = Vec::new();
        while let Some(frame) = stream.next().await {
            match frame.unwrap() {
                StreamFrame::Item(v) => {
                    let chunk: ExecChunk = serde_json::from_value(v).unwrap();
                    out.extend(chunk.output.stdout);
                }
                StreamFrame::End(v) => {
                    let result: ExecResult = serde_json::from_value(v).unwrap();
                    assert_eq!(result.exit_code, 0);
                    break;
                }
            }
        }
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let transport = MemoryTransport::new(Arc::new(Echo));
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.call(methods::DISCOVER, None).await,
            Err(TransportError::Closed)
        ));
    }
}
