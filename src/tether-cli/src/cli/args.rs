//! CLI argument structures and parsing.
//!
//! The built-in surface is declared with clap derive. Plugin commands are
//! added to the same tree at runtime, see [`crate::dynamic`].

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::styles::{AFTER_HELP, get_styles};
use crate::plugins_cmd::PluginsCli;

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Options accepted before or after any subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Log verbosity
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "TETHER_LOG_LEVEL",
        default_value_t = LogLevel::Warn
    )]
    pub log_level: LogLevel,

    /// Enable verbose output (same as --log-level debug)
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Directory holding one plugin per subdirectory
    #[arg(
        long = "plugins-dir",
        global = true,
        env = "TETHER_PLUGINS_DIR",
        value_name = "DIR"
    )]
    pub plugins_dir: Option<PathBuf>,

    /// Write a trace-level log file under $TETHER_HOME/logs
    #[arg(long = "debug", global = true)]
    pub debug: bool,
}

/// Long names of the global flags; plugins may not reuse them.
pub const GLOBAL_FLAGS: &[&str] = &[
    "log-level",
    "verbose",
    "plugins-dir",
    "debug",
    "help",
    "version",
];

/// Shorthands taken by the host.
pub const GLOBAL_SHORTHANDS: &[char] = &['h', 'v', 'V'];

#[derive(Parser)]
#[command(name = "tether")]
struct PreParse {
    #[command(flatten)]
    globals: GlobalArgs,
}

impl GlobalArgs {
    /// Effective log level after `--verbose`.
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose && self.log_level < LogLevel::Debug {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }

    /// Read the global options before the command tree exists.
    ///
    /// Only the global flags are picked out of `args`; everything else
    /// belongs to commands that are not known yet. Parse errors are ignored
    /// here and reported by the full parse.
    pub fn pre_parse(args: &[OsString]) -> Self {
        let mut kept = vec![OsString::from("tether")];
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let Some(text) = arg.to_str() else { continue };
            match text {
                "--" => break,
                "-v" | "--verbose" | "--debug" => kept.push(arg.clone()),
                "--plugins-dir" | "--log-level" => {
                    kept.push(arg.clone());
                    if let Some(value) = iter.next() {
                        kept.push(value.clone());
                    }
                }
                _ if text.starts_with("--plugins-dir=") || text.starts_with("--log-level=") => {
                    kept.push(arg.clone());
                }
                _ => {}
            }
        }

        PreParse::try_parse_from(kept)
            .or_else(|_| PreParse::try_parse_from(["tether"]))
            .map(|pre| pre.globals)
            .unwrap_or_default()
    }
}

/// Tether - a command line extended at runtime by plugins
#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about = "Tether - a command line extended at runtime by plugins", long_about = None)]
#[command(styles = get_styles(), after_help = AFTER_HELP, arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    /// Built-in command; `None` when a plugin command was chosen.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Built-in commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Inspect installed plugins
    #[command(visible_alias = "plugin", display_order = 1)]
    Plugins(PluginsCli),

    /// Generate shell completion scripts, plugin commands included
    #[command(display_order = 2)]
    Completion(CompletionCommand),
}

/// Names of the built-in commands, including clap's `help`.
pub const BUILTIN_COMMANDS: &[&str] = &["plugins", "plugin", "completion", "help"];

/// Completion command.
#[derive(Args, Debug)]
pub struct CompletionCommand {
    /// Shell to generate completions for (detected from $SHELL when omitted)
    #[arg(value_enum)]
    pub shell: Option<clap_complete::Shell>,
}
