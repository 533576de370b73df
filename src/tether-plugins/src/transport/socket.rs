//! JSON-RPC over a byte stream (TCP, unix socket, in-memory duplex).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tether_protocol::codec::{read_frame, write_frame};
use tether_protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId, TransportAddress,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use super::{RpcStream, STREAM_BUFFER, StreamFrame, Transport, TransportError};

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;
type FrameSender = mpsc::Sender<Result<StreamFrame, TransportError>>;

struct Connection {
    reader: BufReader<BoxedRead>,
    writer: BoxedWrite,
    buf: String,
}

impl Connection {
    async fn send<T: Serialize>(&mut self, frame: &T) -> Result<(), TransportError> {
        write_frame(&mut self.writer, frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<JsonRpcMessage>, TransportError> {
        Ok(read_frame(&mut self.reader, &mut self.buf).await?)
    }
}

/// Line-delimited JSON-RPC client.
///
/// Requests are serialized: the connection lock is held for a unary call
/// until its response arrives, and for a streaming call until its end frame.
pub struct SocketTransport {
    conn: Arc<Mutex<Option<Connection>>>,
    connected: Arc<AtomicBool>,
    next_id: AtomicI64,
    peer: String,
}

impl SocketTransport {
    /// Connect to an advertised address.
    pub async fn connect(address: &TransportAddress) -> Result<Self, TransportError> {
        match address {
            TransportAddress::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|e| TransportError::Connect(format!("{address}: {e}")))?;
                let _ = stream.set_nodelay(true);
                Ok(Self::from_stream(stream, address.to_string()))
            }
            #[cfg(unix)]
            TransportAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| TransportError::Connect(format!("{address}: {e}")))?;
                Ok(Self::from_stream(stream, address.to_string()))
            }
            #[cfg(not(unix))]
            TransportAddress::Unix(_) => Err(TransportError::Unsupported(address.to_string())),
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let connection = Connection {
            reader: BufReader::new(Box::new(read_half) as BoxedRead),
            writer: Box::new(write_half),
            buf: String::new(),
        };
        Self {
            conn: Arc::new(Mutex::new(Some(connection))),
            connected: Arc::new(AtomicBool::new(true)),
            next_id: AtomicI64::new(1),
            peer: peer.into(),
        }
    }

    /// Description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn request(&self, method: &str, params: Option<Value>) -> (RequestId, JsonRpcRequest) {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        (id, request)
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(TransportError::Closed)?;

        let (id, request) = self.request(method, params);
        tracing::trace!(peer = %self.peer, %id, method, "Sending request");
        if let Err(e) = conn.send(&request).await {
            self.mark_closed();
            return Err(e);
        }

        loop {
            match conn.recv().await? {
                None => {
                    self.mark_closed();
                    return Err(TransportError::Closed);
                }
                Some(JsonRpcMessage::Response(response)) if response.id == id => {
                    return response.into_result().map_err(TransportError::Remote);
                }
                Some(other) => {
                    tracing::trace!(peer = %self.peer, frame = ?other, "Ignoring unrelated frame");
                }
            }
        }
    }

    async fn stream(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RpcStream, TransportError> {
        let mut guard = self.conn.clone().lock_owned().await;
        let (id, request) = self.request(method, params);

        match guard.as_mut() {
            Some(conn) => {
                if let Err(e) = conn.send(&request).await {
                    self.mark_closed();
                    return Err(e);
                }
            }
            None => return Err(TransportError::Closed),
        }
        tracing::trace!(peer = %self.peer, %id, method, "Opened stream");

        let (tx, stream) = RpcStream::channel(STREAM_BUFFER);
        let connected = self.connected.clone();
        let peer = self.peer.clone();
        tokio::spawn(async move {
            pump_stream(guard, id, tx, connected, peer).await;
        });

        Ok(stream)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(TransportError::Closed)?;

        let mut notification = JsonRpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        conn.send(&notification).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            let _ = conn.writer.shutdown().await;
            tracing::debug!(peer = %self.peer, "Transport closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Forward frames of one streaming call until its end frame, an error, or
/// the consumer dropping the stream. Holds the connection for the duration.
async fn pump_stream(
    mut guard: OwnedMutexGuard<Option<Connection>>,
    id: RequestId,
    tx: FrameSender,
    connected: Arc<AtomicBool>,
    peer: String,
) {
    let Some(conn) = guard.as_mut() else {
        let _ = tx.send(Err(TransportError::Closed)).await;
        return;
    };

    loop {
        let frame = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(peer = %peer, %id, "Stream abandoned by consumer");
                return;
            }
            frame = conn.recv() => frame,
        };

        let forwarded = match frame {
            Ok(None) => {
                connected.store(false, Ordering::SeqCst);
                Err(TransportError::Closed)
            }
            Ok(Some(JsonRpcMessage::Notification(notification))) => match notification.params {
                Some(params) if belongs_to(&params, &id) => Ok(StreamFrame::Item(params)),
                _ => continue,
            },
            Ok(Some(JsonRpcMessage::Response(response))) if response.id == id => response
                .into_result()
                .map(StreamFrame::End)
                .map_err(TransportError::Remote),
            Ok(Some(other)) => {
                tracing::trace!(peer = %peer, frame = ?other, "Ignoring unrelated frame");
                continue;
            }
            Err(e) => Err(e),
        };

        let finished = !matches!(forwarded, Ok(StreamFrame::Item(_)));
        if tx.send(forwarded).await.is_err() || finished {
            return;
        }
    }
}

fn belongs_to(params: &Value, id: &RequestId) -> bool {
    params
        .get("requestId")
        .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok())
        .is_some_and(|request_id| &request_id == id)
}
