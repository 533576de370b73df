//! Discover call: fetch a plugin's command schema.

use std::sync::Arc;
use std::time::Duration;

use tether_protocol::{CommandDefinition, DiscoverResult, methods};

use crate::error::{PluginError, Result};
use crate::transport::Transport;

/// Issues the Discover call over an established channel.
pub struct SchemaClient {
    plugin: String,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl SchemaClient {
    pub fn new(plugin: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            plugin: plugin.into(),
            transport,
            timeout: None,
        }
    }

    /// Fail with `DiscoveryError` when no answer arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Any transport or decode failure is a `DiscoveryError` for this plugin.
    pub async fn discover_schema(&self) -> Result<Vec<CommandDefinition>> {
        let call = self.transport.call(methods::DISCOVER, None);
        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                PluginError::discovery_error(
                    &self.plugin,
                    format!("no answer within {}ms", limit.as_millis()),
                )
            })?,
            None => call.await,
        };
        let value =
            answer.map_err(|e| PluginError::discovery_error(&self.plugin, e.to_string()))?;

        let result: DiscoverResult = serde_json::from_value(value).map_err(|e| {
            PluginError::discovery_error(&self.plugin, format!("undecodable schema: {e}"))
        })?;

        tracing::debug!(
            plugin = %self.plugin,
            commands = result.commands.len(),
            "Discovered plugin schema"
        );
        Ok(result.commands)
    }
}
