//! Environment variable expansion for plugin launch commands.
//!
//! Supports `$VAR` and `${VAR}`. Unset variables expand to the empty string,
//! matching shell behavior. A `${` without its closing brace is an error.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Group 1: braced name, group 2: bare name
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable regex pattern is valid")
});

/// Errors that can occur during expansion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// `${` without a matching `}` or with an invalid name.
    #[error("Invalid variable reference in '{0}'")]
    InvalidReference(String),
}

/// Expand variables from the process environment.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Expand variables using a custom lookup.
pub fn expand_env_with<F>(input: &str, lookup: F) -> Result<String, ExpandError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = VAR_REGEX.replace_all(input, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        lookup(name).unwrap_or_default()
    });

    // Anything still shaped like `${` was not a valid reference.
    if VAR_REGEX.replace_all(input, "").contains("${") {
        return Err(ExpandError::InvalidReference(input.to_string()));
    }

    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/ada".to_string()),
            "BIN" => Some("hello".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_bare_and_braced() {
        assert_eq!(
            expand_env_with("$HOME/.tether/${BIN}-plugin", lookup).unwrap(),
            "/home/ada/.tether/hello-plugin"
        );
    }

    #[test]
    fn test_unset_is_empty() {
        assert_eq!(expand_env_with("a${NOPE}b$NOPE", lookup).unwrap(), "ab");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(expand_env_with("./run --fast", lookup).unwrap(), "./run --fast");
        assert_eq!(expand_env_with("cost: 5$", lookup).unwrap(), "cost: 5$");
    }

    #[test]
    fn test_unterminated_brace_is_error() {
        assert!(matches!(
            expand_env_with("${HOME", lookup),
            Err(ExpandError::InvalidReference(_))
        ));
        assert!(expand_env_with("${1BAD}", lookup).is_err());
    }

    #[test]
    fn test_process_environment() {
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env("${PATH}").unwrap(), path);
    }
}
