//! Tether CLI library module.
//!
//! - `cli/` - Argument parsing and command dispatch
//! - `dynamic` - Plugin commands grafted onto the clap tree
//! - `plugins_cmd` - The `plugins` built-in
//! - `config` - `config.toml` and the file-backed config store
//! - `printer` - JSON, YAML and text output
//! - `prompt` - Terminal prompts for plugin flags
//! - `logging` - Tracing setup

use std::process::ExitCode;

use tether_plugins::PluginError;

pub mod cli;
pub mod config;
pub mod dynamic;
pub mod logging;
pub mod plugins_cmd;
pub mod printer;
pub mod prompt;

/// Print an error the way the host reports failures and pick the exit code.
///
/// Usage errors (clap's and missing required flags) exit with 2, plugin
/// exit codes pass through, deadlines exit with 124 and interrupts with 130.
pub fn report_error(err: &anyhow::Error) -> ExitCode {
    if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
        let _ = clap_err.print();
        return ExitCode::from(clamp_code(clap_err.exit_code()));
    }

    if let Some(plugin_err) = err.downcast_ref::<PluginError>() {
        // The plugin already wrote its own diagnostics.
        if !matches!(plugin_err, PluginError::Exit { .. }) {
            eprintln!("Error [{}]: {plugin_err}", plugin_err.kind());
        }
        return ExitCode::from(clamp_code(plugin_err.exit_code()));
    }

    eprintln!("Error: {err:#}");
    ExitCode::FAILURE
}

fn clamp_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
