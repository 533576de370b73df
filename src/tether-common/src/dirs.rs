//! Application directories for tether.
//!
//! Everything lives under one home directory, `~/.tether` by default. The
//! `TETHER_HOME` environment variable moves the whole tree.

use std::path::PathBuf;

/// Home directory name under the user's home.
pub const HOME_DIR_NAME: &str = ".tether";

/// Environment variable overriding the home directory.
pub const TETHER_HOME_ENV: &str = "TETHER_HOME";

/// Application directories structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// Root of all tether state (`~/.tether`)
    pub home: PathBuf,
}

impl AppDirs {
    /// Resolve directories, honoring `TETHER_HOME`.
    ///
    /// A relative override is resolved against the current directory so the
    /// tree never lands somewhere unexpected.
    pub fn new() -> Option<Self> {
        let override_home = std::env::var(TETHER_HOME_ENV)
            .ok()
            .filter(|home| !home.trim().is_empty());
        if let Some(home) = override_home {
            let home = PathBuf::from(home);
            let home = if home.is_relative() {
                let cwd = std::env::current_dir().ok()?;
                let resolved = cwd.join(&home);
                resolved.canonicalize().unwrap_or(resolved)
            } else {
                home
            };
            return Some(Self { home });
        }

        let home = ::dirs::home_dir()?.join(HOME_DIR_NAME);
        Some(Self { home })
    }

    /// Build directories rooted at an explicit path.
    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `config.toml` path
    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Default plugins root
    pub fn plugins_dir(&self) -> PathBuf {
        self.home.join("plugins")
    }

    /// Debug log directory
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// Create the home and logs directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.home, &self.logs_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
                }
            }
        }
        Ok(())
    }
}

/// The effective tether home directory.
pub fn get_tether_home() -> Option<PathBuf> {
    AppDirs::new().map(|dirs| dirs.home)
}
