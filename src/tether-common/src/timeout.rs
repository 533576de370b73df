//! Timeout defaults for plugin supervision.

/// How long a plugin may take to print its handshake line (10 seconds).
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How long a plugin may take to answer the Discover call (10 seconds).
pub const DEFAULT_DISCOVER_TIMEOUT_SECS: u64 = 10;

/// Time between the polite stop request and a forced kill (2 seconds).
pub const DEFAULT_KILL_GRACE_MS: u64 = 2_000;

/// Wall-clock deadline for legacy-mode programs (60 seconds).
pub const DEFAULT_LEGACY_DEADLINE_SECS: u64 = 60;

/// Bound on the best-effort shutdown notification sent before killing (250 ms).
pub const SHUTDOWN_NOTIFY_TIMEOUT_MS: u64 = 250;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_timeout_values_are_reasonable() {
        assert!(DEFAULT_STARTUP_TIMEOUT_SECS > 0);
        assert!(DEFAULT_DISCOVER_TIMEOUT_SECS > 0);
        assert!(DEFAULT_KILL_GRACE_MS >= SHUTDOWN_NOTIFY_TIMEOUT_MS);
        assert!(DEFAULT_LEGACY_DEADLINE_SECS > DEFAULT_STARTUP_TIMEOUT_SECS);
    }
}
