//! Demo plugin exercising the host: flags, prompts, streaming, exit codes.
//!
//! `--silent` and `--bad-cookie` make it misbehave during the handshake so
//! the host's failure paths can be driven from a manifest.

use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tether_plugin_sdk::PluginServer;
use tether_plugin_sdk::prelude::*;
use tracing_subscriber::EnvFilter;

/// Bad-cookie mode advertises this instead of the real cookie.
const WRONG_COOKIE: &str = "not-the-tether-cookie";

#[derive(Parser, Debug)]
#[command(name = "tether-hello-plugin", about = "Demo tether plugin")]
struct Args {
    /// Never print the handshake line.
    #[arg(long)]
    silent: bool,

    /// Advertise a cookie the host will reject.
    #[arg(long)]
    bad_cookie: bool,
}

struct HelloService;

impl HelloService {
    fn commands() -> Vec<CommandDefinition> {
        vec![
            CommandDefinition::new("greet [words...]")
                .with_short("Greet someone")
                .with_long("Print a greeting for NAME, optionally shouting it.")
                .with_example("tether hello greet --name Ada --loud")
                .with_flag(
                    FlagDefinition::string("name")
                        .with_shorthand('n')
                        .with_usage("Who to greet")
                        .required(),
                )
                .with_flag(
                    FlagDefinition::bool("loud")
                        .with_shorthand('l')
                        .with_usage("Shout the greeting"),
                )
                .with_flag(
                    FlagDefinition::string("greeting")
                        .with_usage("Greeting word")
                        .with_prompt("Pick a greeting")
                        .with_options(["Hello", "Hi", "Hey"]),
                ),
            CommandDefinition::new("count").with_short("Stream a, b and c as separate chunks"),
            CommandDefinition::new("fail").with_short("Write to stderr and exit with status 3"),
            CommandDefinition::new("sleep")
                .with_short("Sleep before answering")
                .with_flag(FlagDefinition::string("secs").with_usage("Seconds to sleep")),
        ]
    }

    async fn greet(args: &[String], out: &OutputSink) -> Result<ExecResult, JsonRpcError> {
        let decoded =
            decode_canonical_args(args).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        let Some(name) = decoded.get_str("name") else {
            return Err(JsonRpcError::invalid_params("--name is required"));
        };
        let greeting = decoded
            .get_str("greeting")
            .filter(|g| !g.is_empty())
            .unwrap_or("Hello");

        let mut line = format!("{greeting}, {name}!");
        if !decoded.positional.is_empty() {
            line.push(' ');
            line.push_str(&decoded.positional.join(" "));
        }
        if decoded.get_bool("loud") {
            line = line.to_uppercase();
        }
        out.stdout(format!("{line}\n")).await?;
        Ok(ExecResult::success())
    }

    async fn sleep(args: &[String]) -> Result<ExecResult, JsonRpcError> {
        let decoded =
            decode_canonical_args(args).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        let secs = match decoded.get_str("secs") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| JsonRpcError::invalid_params(format!("invalid --secs '{raw}'")))?,
            None => 30,
        };
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(ExecResult::success())
    }
}

#[async_trait]
impl PluginService for HelloService {
    async fn discover(&self) -> Result<Vec<CommandDefinition>, JsonRpcError> {
        Ok(Self::commands())
    }

    async fn exec(
        &self,
        request: ExecRequest,
        output: OutputSink,
    ) -> Result<ExecResult, JsonRpcError> {
        match request.command_name.as_str() {
            "greet" => Self::greet(&request.args, &output).await,
            "count" => {
                for part in ["a", "b", "c"] {
                    output.stdout(part).await?;
                }
                Ok(ExecResult::success())
            }
            "fail" => {
                output.stderr("something went wrong\n").await?;
                Ok(ExecResult::exit(3))
            }
            "sleep" => Self::sleep(&request.args).await,
            other => Err(JsonRpcError::unknown_command(other)),
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = Args::parse();

    if args.silent {
        if let Err(e) = PluginServer::check_launched_by_host() {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return std::process::ExitCode::SUCCESS;
    }

    let mut server = PluginServer::new(HelloService);
    if args.bad_cookie {
        server = server.with_magic_cookie(WRONG_COOKIE);
    }

    match server.run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}
