//! Handshake negotiation on a freshly spawned plugin.

use std::sync::Arc;

use tether_protocol::{HandshakeLine, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::{PluginError, Result};
use crate::transport::{SocketTransport, Transport};

/// Reads the handshake line, checks it, and opens the RPC channel.
#[derive(Debug, Clone)]
pub struct HandshakeNegotiator {
    expected_version: u32,
    expected_cookie: String,
}

impl Default for HandshakeNegotiator {
    fn default() -> Self {
        Self::new(PROTOCOL_VERSION, MAGIC_COOKIE_VALUE)
    }
}

impl HandshakeNegotiator {
    pub fn new(expected_version: u32, expected_cookie: impl Into<String>) -> Self {
        Self {
            expected_version,
            expected_cookie: expected_cookie.into(),
        }
    }

    /// Read the first non-empty line from the plugin's stdout.
    pub async fn read_line<R>(&self, plugin: &str, lines: &mut Lines<R>) -> Result<HandshakeLine>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let line = lines.next_line().await.map_err(|e| {
                PluginError::handshake_error(plugin, format!("failed to read stdout: {e}"))
            })?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    tracing::debug!(plugin, line = %line.trim(), "Received handshake");
                    return HandshakeLine::parse(&line)
                        .map_err(|e| PluginError::handshake_error(plugin, e.to_string()));
                }
                None => {
                    return Err(PluginError::handshake_error(
                        plugin,
                        "plugin closed stdout before completing the handshake",
                    ));
                }
            }
        }
    }

    /// Reject a handshake whose version or cookie differs from ours.
    pub fn validate(&self, plugin: &str, line: &HandshakeLine) -> Result<()> {
        line.validate(self.expected_version, &self.expected_cookie)
            .map_err(|mismatch| PluginError::handshake_error(plugin, mismatch.to_string()))
    }

    /// Open the channel advertised by a validated handshake.
    pub async fn connect(&self, plugin: &str, line: &HandshakeLine) -> Result<Arc<dyn Transport>> {
        let transport = SocketTransport::connect(&line.address)
            .await
            .map_err(|e| PluginError::handshake_error(plugin, e.to_string()))?;
        tracing::debug!(plugin, address = %line.address, "RPC channel open");
        Ok(Arc::new(transport))
    }

    /// Full negotiation: read, validate, connect.
    pub async fn negotiate<R>(
        &self,
        plugin: &str,
        lines: &mut Lines<R>,
    ) -> Result<(HandshakeLine, Arc<dyn Transport>)>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = self.read_line(plugin, lines).await?;
        self.validate(plugin, &line)?;
        let transport = self.connect(plugin, &line).await?;
        Ok((line, transport))
    }
}
