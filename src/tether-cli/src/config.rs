//! `config.toml` loading and the file-backed [`ConfigStore`].
//!
//! ```toml
//! plugins_dir = "$HOME/work/tether-plugins"
//!
//! [plugins]
//! startup_timeout_secs = 5
//! disabled = ["experimental"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tether_common::{AppDirs, expand_env};
use tether_plugins::{ConfigStore, PluginHostConfig};

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TetherConfig {
    /// Plugins root; `$VAR` references are expanded
    #[serde(default)]
    pub plugins_dir: Option<String>,

    /// Supervision settings
    #[serde(default)]
    pub plugins: PluginHostConfig,
}

impl TetherConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Config store backed by `$TETHER_HOME/config.toml`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    plugins_root: PathBuf,
    host: PluginHostConfig,
}

impl FileConfigStore {
    /// Resolve the plugins root: `override_dir` (flag or env) first, then
    /// `plugins_dir` from the config file, then `$TETHER_HOME/plugins`.
    pub fn load(dirs: &AppDirs, override_dir: Option<&Path>) -> Result<Self> {
        let config = TetherConfig::load(&dirs.config_file())?;

        let plugins_root = match (override_dir, &config.plugins_dir) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(dir)) => {
                let expanded = expand_env(dir).context("Invalid plugins_dir in config.toml")?;
                let path = PathBuf::from(expanded);
                if path.is_relative() { dirs.home.join(path) } else { path }
            }
            (None, None) => dirs.plugins_dir(),
        };

        tracing::debug!(root = %plugins_root.display(), "Resolved plugins directory");
        Ok(Self {
            plugins_root,
            host: config.plugins,
        })
    }
}

impl ConfigStore for FileConfigStore {
    fn plugins_root_path(&self) -> PathBuf {
        self.plugins_root.clone()
    }

    fn host_config(&self) -> PluginHostConfig {
        self.host.clone()
    }
}
