//! Common utilities shared across tether crates.

pub mod dirs;
pub mod env_expand;
pub mod timeout;

pub use self::dirs::{AppDirs, HOME_DIR_NAME, TETHER_HOME_ENV, get_tether_home};
pub use env_expand::{ExpandError, expand_env, expand_env_with};
