//! Plugin host configuration and the config store contract.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_common::timeout::{
    DEFAULT_DISCOVER_TIMEOUT_SECS, DEFAULT_KILL_GRACE_MS, DEFAULT_LEGACY_DEADLINE_SECS,
    DEFAULT_STARTUP_TIMEOUT_SECS,
};

/// Supervision settings, read from the `[plugins]` table of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHostConfig {
    /// Seconds a plugin may take to print its handshake line
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Seconds a plugin may take to answer Discover
    #[serde(default = "default_discover_timeout_secs")]
    pub discover_timeout_secs: u64,

    /// Milliseconds between the polite stop and a forced kill
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Optional wall-clock limit on a single exec call
    #[serde(default)]
    pub exec_timeout_secs: Option<u64>,

    /// Deadline for legacy-mode programs without their own `timeout_secs`
    #[serde(default = "default_legacy_deadline_secs")]
    pub legacy_deadline_secs: u64,

    /// Plugins that should not be loaded at all
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

fn default_discover_timeout_secs() -> u64 {
    DEFAULT_DISCOVER_TIMEOUT_SECS
}

fn default_kill_grace_ms() -> u64 {
    DEFAULT_KILL_GRACE_MS
}

fn default_legacy_deadline_secs() -> u64 {
    DEFAULT_LEGACY_DEADLINE_SECS
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout_secs(),
            discover_timeout_secs: default_discover_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
            exec_timeout_secs: None,
            legacy_deadline_secs: default_legacy_deadline_secs(),
            disabled: Vec::new(),
        }
    }
}

impl PluginHostConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn discover_timeout(&self) -> Duration {
        Duration::from_secs(self.discover_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }

    pub fn legacy_deadline(&self) -> Duration {
        Duration::from_secs(self.legacy_deadline_secs)
    }

    /// Check if a plugin is enabled.
    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d == name)
    }
}

/// Where the host finds its plugins and how it supervises them.
pub trait ConfigStore: Send + Sync {
    /// Directory whose subdirectories hold one plugin each.
    fn plugins_root_path(&self) -> PathBuf;

    /// Supervision settings.
    fn host_config(&self) -> PluginHostConfig {
        PluginHostConfig::default()
    }
}

/// A fixed, in-memory config store.
#[derive(Debug, Clone)]
pub struct StaticConfigStore {
    root: PathBuf,
    config: PluginHostConfig,
}

impl StaticConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: PluginHostConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PluginHostConfig) -> Self {
        self.config = config;
        self
    }
}

impl ConfigStore for StaticConfigStore {
    fn plugins_root_path(&self) -> PathBuf {
        self.root.clone()
    }

    fn host_config(&self) -> PluginHostConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: PluginHostConfig = toml::from_str("").unwrap();
        assert_eq!(config, PluginHostConfig::default());
        assert_eq!(
            config.startup_timeout(),
            Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS)
        );
        assert_eq!(
            config.discover_timeout(),
            Duration::from_secs(DEFAULT_DISCOVER_TIMEOUT_SECS)
        );
        assert_eq!(config.exec_timeout(), None);
    }

    #[test]
    fn test_partial_override() {
        let config: PluginHostConfig = toml::from_str(
            r#"
            startup_timeout_secs = 3
            exec_timeout_secs = 30
            disabled = ["noisy"]
            "#,
        )
        .unwrap();
        assert_eq!(config.startup_timeout(), Duration::from_secs(3));
        assert_eq!(config.exec_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.kill_grace(), Duration::from_millis(DEFAULT_KILL_GRACE_MS));
        assert!(!config.is_plugin_enabled("noisy"));
        assert!(config.is_plugin_enabled("hello"));
    }

    #[test]
    fn test_static_store() {
        let store = StaticConfigStore::new("/srv/plugins");
        assert_eq!(store.plugins_root_path(), PathBuf::from("/srv/plugins"));
        assert_eq!(store.host_config(), PluginHostConfig::default());
    }
}
