//! Plugin side of the protocol: handshake, then serve one host connection.

use std::sync::Arc;

use serde_json::Value;
use tether_protocol::codec::{read_frame, write_frame};
use tether_protocol::{
    DiscoverResult, ExecChunk, ExecRequest, HandshakeLine, JSONRPC_VERSION, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
    OutputSink, PluginService, ProtocolError, RequestId, TransportAddress, methods,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, SdkError};

/// Buffered output chunks per running exec.
const OUTPUT_BUFFER: usize = 64;

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Serves a [`PluginService`] to the tether host.
pub struct PluginServer {
    service: Arc<dyn PluginService>,
    bind: String,
    cookie: String,
}

impl PluginServer {
    pub fn new(service: impl PluginService) -> Self {
        Self {
            service: Arc::new(service),
            bind: "127.0.0.1:0".to_string(),
            cookie: MAGIC_COOKIE_VALUE.to_string(),
        }
    }

    /// Listen on another loopback address.
    pub fn with_bind_address(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Advertise a different cookie in the handshake line.
    pub fn with_magic_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    /// Refuse to run unless the host's cookie is in the environment.
    pub fn check_launched_by_host() -> Result<()> {
        match std::env::var(MAGIC_COOKIE_KEY) {
            Ok(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
            _ => Err(SdkError::NotLaunchedByHost),
        }
    }

    /// Bind, print the handshake line, and serve the host's connection
    /// until it sends `plugin/shutdown` or hangs up.
    pub async fn run(self) -> Result<()> {
        Self::check_launched_by_host()?;

        let listener = TcpListener::bind(&self.bind).await?;
        let address = TransportAddress::Tcp(listener.local_addr()?.to_string());
        let mut line = HandshakeLine::new(address);
        line.magic_cookie = self.cookie.clone();

        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{line}\n").as_bytes()).await?;
        stdout.flush().await?;
        debug!(%line, "Handshake written");

        let (stream, peer) = listener.accept().await?;
        drop(listener);
        info!(%peer, "Host connected");
        serve_connection(self.service, stream).await
    }
}

/// Serve a service with the default settings.
pub async fn serve(service: impl PluginService) -> Result<()> {
    PluginServer::new(service).run().await
}

/// Answer requests on one connection until shutdown or end of stream.
pub async fn serve_connection<S>(service: Arc<dyn PluginService>, stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read, write) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);
    let writer: SharedWriter = Arc::new(Mutex::new(Box::new(write)));
    let mut running = JoinSet::new();
    let mut buf = String::new();

    loop {
        let message = match read_frame(&mut reader, &mut buf).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Host closed the connection");
                break;
            }
            Err(ProtocolError::Io(e)) => {
                running.abort_all();
                return Err(e.into());
            }
            Err(e) => {
                warn!(error = %e, "Dropping unreadable frame");
                let response = JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(e.to_string()),
                );
                send(&writer, &response).await?;
                continue;
            }
        };

        match message {
            JsonRpcMessage::Request(request) if request.jsonrpc != JSONRPC_VERSION => {
                let error = JsonRpcError::invalid_request(format!(
                    "unsupported jsonrpc version {:?}",
                    request.jsonrpc
                ));
                send(&writer, &JsonRpcResponse::error(request.id, error)).await?;
            }
            JsonRpcMessage::Request(request) => match request.method.as_str() {
                methods::DISCOVER => {
                    let response = match service.discover().await {
                        Ok(commands) => match serde_json::to_value(DiscoverResult { commands }) {
                            Ok(value) => JsonRpcResponse::success(request.id, value),
                            Err(e) => JsonRpcResponse::error(
                                request.id,
                                JsonRpcError::internal_error(e.to_string()),
                            ),
                        },
                        Err(error) => JsonRpcResponse::error(request.id, error),
                    };
                    send(&writer, &response).await?;
                }
                methods::EXEC => {
                    running.spawn(run_exec(service.clone(), writer.clone(), request));
                }
                other => {
                    let response =
                        JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(other));
                    send(&writer, &response).await?;
                }
            },
            JsonRpcMessage::Notification(notification) => {
                if notification.method == methods::SHUTDOWN {
                    debug!("Shutdown requested");
                    break;
                }
                debug!(method = %notification.method, "Ignoring notification");
            }
            JsonRpcMessage::Response(_) => {}
        }
    }

    running.abort_all();
    Ok(())
}

/// Stream one exec's chunks as notifications, then its final response.
async fn run_exec(service: Arc<dyn PluginService>, writer: SharedWriter, request: JsonRpcRequest) {
    let id = request.id.clone();
    let params = request.params.unwrap_or(Value::Null);
    let response = match serde_json::from_value::<ExecRequest>(params) {
        Ok(exec) => {
            debug!(command = %exec.command_name, "Exec");
            let (sink, mut chunks) = OutputSink::channel(OUTPUT_BUFFER);
            let call = service.exec(exec, sink);
            tokio::pin!(call);
            let mut outcome = None;

            loop {
                tokio::select! {
                    chunk = chunks.recv() => match chunk {
                        Some(output) => {
                            let params = ExecChunk { request_id: id.clone(), output };
                            let Ok(params) = serde_json::to_value(params) else { continue };
                            let note = JsonRpcNotification::new(methods::EXEC_CHUNK).with_params(params);
                            if send(&writer, &note).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    },
                    result = &mut call, if outcome.is_none() => outcome = Some(result),
                }
            }

            let result = match outcome {
                Some(result) => result,
                None => call.await,
            };
            match result.and_then(|r| {
                serde_json::to_value(r).map_err(|e| JsonRpcError::internal_error(e.to_string()))
            }) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(error) => JsonRpcResponse::error(id, error),
            }
        }
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string())),
    };

    if let Err(e) = send(&writer, &response).await {
        warn!(error = %e, "Failed to send exec result");
    }
}

async fn send<T: serde::Serialize>(writer: &SharedWriter, frame: &T) -> Result<()> {
    let mut guard = writer.lock().await;
    write_frame(&mut *guard, frame).await?;
    Ok(())
}
