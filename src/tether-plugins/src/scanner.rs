//! Manifest discovery under the plugins root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{PluginError, Result};
use crate::manifest::{MANIFEST_FILE, MANIFEST_JSON_FILE, PluginManifest};

/// A plugin that could not be registered, kept so it never vanishes silently.
#[derive(Debug)]
pub struct PluginFailure {
    /// Plugin (or directory) name
    pub plugin: String,
    /// What went wrong
    pub error: PluginError,
}

impl PluginFailure {
    pub fn new(plugin: impl Into<String>, error: PluginError) -> Self {
        Self {
            plugin: plugin.into(),
            error,
        }
    }
}

/// Outcome of scanning a plugins root.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Valid manifests, sorted by root name
    pub manifests: Vec<PluginManifest>,
    /// Per-plugin failures
    pub failures: Vec<PluginFailure>,
}

/// Reads the plugins root: one plugin per immediate subdirectory.
#[derive(Debug, Clone)]
pub struct ManifestScanner {
    root: PathBuf,
}

impl ManifestScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root. Broken manifests are reported per plugin and never
    /// stop the scan; only an unreadable root is an error.
    pub async fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "Plugins root does not exist");
            return Ok(report);
        }

        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut seen = HashSet::new();
        for dir in dirs {
            let Some(manifest_path) = manifest_path_in(&dir) else {
                tracing::debug!(dir = %dir.display(), "Skipping directory without a manifest");
                continue;
            };

            match PluginManifest::load(&manifest_path).await {
                Ok(manifest) => {
                    if !seen.insert(manifest.root_name.clone()) {
                        let error = PluginError::manifest_error(
                            &manifest.root_name,
                            &manifest_path,
                            "another plugin already uses this name",
                        );
                        tracing::warn!(plugin = %manifest.root_name, "{}", error);
                        report
                            .failures
                            .push(PluginFailure::new(manifest.root_name, error));
                        continue;
                    }
                    tracing::debug!(
                        plugin = %manifest.root_name,
                        mode = %manifest.mode,
                        "Found plugin manifest"
                    );
                    report.manifests.push(manifest);
                }
                Err(error) => {
                    let plugin = error.plugin().unwrap_or("unknown").to_string();
                    tracing::warn!(plugin = %plugin, "{}", error);
                    report.failures.push(PluginFailure::new(plugin, error));
                }
            }
        }

        report
            .manifests
            .sort_by(|a, b| a.root_name.cmp(&b.root_name));
        tracing::info!(
            found = report.manifests.len(),
            failed = report.failures.len(),
            "Scanned plugins root"
        );
        Ok(report)
    }
}

fn manifest_path_in(dir: &Path) -> Option<PathBuf> {
    [MANIFEST_FILE, MANIFEST_JSON_FILE]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
