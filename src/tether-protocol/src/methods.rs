//! Method name constants.

// Plugin side (host is the client)
/// Discover the plugin's command schema.
pub const DISCOVER: &str = "plugin/discover";
/// Execute one plugin command, answered with a stream of chunks.
pub const EXEC: &str = "plugin/exec";
/// Output chunk notification sent while an exec request is running.
pub const EXEC_CHUNK: &str = "plugin/execChunk";
/// Ask the plugin to stop serving.
pub const SHUTDOWN: &str = "plugin/shutdown";

// Host side (legacy mode, the spawned program is the client)
/// Fetch the resolved command invocation.
pub const HOST_COMMAND: &str = "host/command";
/// Ask the host to prompt the user.
pub const HOST_PROMPT: &str = "host/prompt";
/// Report that the program has finished its work.
pub const HOST_COMPLETE: &str = "host/complete";
