//! CLI argument parsing and command dispatch.
//!
//! - `args` - Global options and built-in command structures
//! - `styles` - ANSI styling for help output
//! - `handlers` - Command execution handlers

pub mod args;
pub mod handlers;
pub mod styles;

// Re-export main types
pub use args::{
    BUILTIN_COMMANDS, Cli, Commands, CompletionCommand, GLOBAL_FLAGS, GLOBAL_SHORTHANDS,
    GlobalArgs, LogLevel,
};
pub use handlers::dispatch_command;
pub use styles::{AFTER_HELP, get_styles};
