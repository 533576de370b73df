//! Tracing setup for the `tether` binary.
//!
//! Logs go to stderr so plugin output on stdout stays clean. `--debug` adds
//! a trace-level file under `$TETHER_HOME/logs`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tether_common::AppDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::GlobalArgs;

/// Debug log file name inside the logs directory.
pub const DEBUG_LOG_FILE: &str = "tether-debug.log";

/// Keeps the debug log writer alive; flushes on drop.
#[derive(Default)]
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
    /// Where the debug log is written, when enabled
    pub debug_file: Option<PathBuf>,
}

/// Stderr filter: `RUST_LOG` when set, otherwise the requested level.
fn stderr_filter(globals: &GlobalArgs) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(globals.effective_log_level().as_filter_str()))
}

/// Install the global subscriber.
pub fn init_logging(globals: &GlobalArgs, dirs: &AppDirs) -> Result<LogGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter(globals));

    if !globals.debug {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .context("Failed to initialize logging")?;
        return Ok(LogGuard::default());
    }

    dirs.ensure_dirs()
        .with_context(|| format!("Failed to create {}", dirs.logs_dir().display()))?;
    let appender = tracing_appender::rolling::never(dirs.logs_dir(), DEBUG_LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    let debug_file = dirs.logs_dir().join(DEBUG_LOG_FILE);
    eprintln!("Debug mode enabled: logging to {}", debug_file.display());
    Ok(LogGuard {
        _guard: Some(guard),
        debug_file: Some(debug_file),
    })
}
