//! CLI styling and formatting.
//!
//! Defines ANSI colors and formatting for the CLI help output.

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Tether styled help theme.
pub fn get_styles() -> Styles {
    Styles::styled()
        // Headers (USAGE, COMMANDS, OPTIONS) - Bold cyan
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        // Command and flag names
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Cyan.on_default())
        .invalid(AnsiColor::Yellow.on_default())
}

/// After-help section with environment variables and paths.
pub const AFTER_HELP: &str = color_print::cstr!(
    r#"<cyan,bold>PLUGINS</>
    Every subdirectory of the plugins directory holding a <dim>plugin.toml</> adds
    one top-level command. Run <green,bold>tether plugins list</> to see what loaded.

<cyan,bold>ENVIRONMENT VARIABLES</>
    <yellow>TETHER_HOME</>          Override the tether directory (default: ~/.tether)
    <yellow>TETHER_PLUGINS_DIR</>   Plugins directory (alternative to --plugins-dir)
    <yellow>TETHER_LOG_LEVEL</>     Log verbosity (error, warn, info, debug, trace)
    <yellow>RUST_LOG</>             Full tracing filter, overrides the log level

<cyan,bold>PATHS</>
    <dim>Config</>      ~/.tether/config.toml
    <dim>Plugins</>     ~/.tether/plugins/
    <dim>Debug logs</>  ~/.tether/logs/"#
);

