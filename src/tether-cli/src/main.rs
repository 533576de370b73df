//! Tether CLI - Main entry point.
//!
//! Global options are read first so logging and the plugins directory are
//! known before the plugin-augmented command tree is built and parsed.

use std::ffi::OsString;
use std::process::ExitCode;

use tether_cli::cli::{GlobalArgs, dispatch_command};
use tether_cli::logging::init_logging;
use tether_cli::report_error;
use tether_common::AppDirs;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();
    let globals = GlobalArgs::pre_parse(&args);

    let Some(dirs) = AppDirs::new() else {
        eprintln!("Error: cannot determine the home directory; set TETHER_HOME");
        return ExitCode::FAILURE;
    };

    let _log_guard = match init_logging(&globals, &dirs) {
        Ok(guard) => guard,
        Err(e) => return report_error(&e),
    };

    match dispatch_command(&globals, args, &dirs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}
