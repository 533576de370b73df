//! Newline-delimited JSON framing.
//!
//! Each frame is one JSON document terminated by `\n`. Blank lines are skipped.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::jsonrpc::JsonRpcMessage;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serialize a frame, append a newline and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize + ?Sized,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame. Returns `Ok(None)` on a clean end of stream.
///
/// `buf` is scratch space reused across calls.
pub async fn read_frame<R>(reader: &mut R, buf: &mut String) -> Result<Option<JsonRpcMessage>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    loop {
        buf.clear();
        let read = reader.read_line(buf).await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                max: MAX_FRAME_BYTES,
            });
        }
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }
        return Ok(Some(JsonRpcMessage::parse(line)?));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_frames_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut write_half) = tokio::io::split(client);
        let (read_half, _) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);

        write_frame(&mut write_half, &JsonRpcRequest::new(1, "plugin/discover"))
            .await
            .unwrap();
        write_half.write_all(b"\n\n").await.unwrap();
        write_frame(&mut write_half, &JsonRpcNotification::new("plugin/shutdown"))
            .await
            .unwrap();
        drop(write_half);

        let mut buf = String::new();
        let first = read_frame(&mut reader, &mut buf).await.unwrap();
        assert!(matches!(first, Some(JsonRpcMessage::Request(r)) if r.method == "plugin/discover"));

        let second = read_frame(&mut reader, &mut buf).await.unwrap();
        assert!(
            matches!(second, Some(JsonRpcMessage::Notification(n)) if n.method == "plugin/shutdown")
        );
    }

    #[tokio::test]
    async fn test_eof_is_none() {
        let mut reader = BufReader::new(&b""[..]);
        let mut buf = String::new();
        assert!(read_frame(&mut reader, &mut buf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let mut reader = BufReader::new(&b"{oops\n"[..]);
        let mut buf = String::new();
        let err = read_frame(&mut reader, &mut buf).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
