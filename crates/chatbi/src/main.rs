#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chatbi::cli::app::{Cli, Command, RuntimeArgs};
use chatbi::cli::commands;
use chatbi::config::{DecoderConfig, RuntimePaths};
use chatbi::logging::init_logging;
use chatbi::models::{CommandFailure, ResponseEnvelope};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::{error, info};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    let command_name = command_name(&cli.command);
    if let Err(error) = init_logging(&cli.runtime.log_level) {
        eprintln!("chatbi: {error:#}");
        return EXIT_USAGE_ERROR;
    }
    info!(command = command_name, "starting");

    match execute(cli) {
        Ok(()) => {
            info!(command = command_name, exit_code = EXIT_SUCCESS, "completed");
            EXIT_SUCCESS
        }
        Err(failure) => {
            let exit_code = report_failure(command_name, &failure);
            error!(command = command_name, exit_code, "failed: {failure:#}");
            exit_code
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Replay(args) => {
            let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
            let decoder_config = DecoderConfig::resolve(cli.runtime.queue_capacity)?;
            commands::replay::run(&args, &runtime_paths, decoder_config)
        }
        Command::Conversations(args) => {
            let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
            commands::conversations::run(&args, &runtime_paths)
        }
        Command::GenerateChart(args) => {
            let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
            commands::generate_chart::run(&args, &runtime_paths)
        }
        Command::Schema(args) => commands::schema::run(&args),
    }
}

/// Prints the failure envelope on stdout and picks the exit code.
fn report_failure(command_name: &str, failure: &anyhow::Error) -> i32 {
    let (envelope, exit_code) = match failure.downcast_ref::<CommandFailure>() {
        Some(command_failure) => (
            command_failure.envelope().clone(),
            command_failure.exit_code(),
        ),
        None => (
            ResponseEnvelope::from_error(
                command_name,
                "runtime_failure",
                "command failed",
                failure,
            ),
            EXIT_RUNTIME_FAILURE,
        ),
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(encoded) => println!("{encoded}"),
        Err(_) => eprintln!("chatbi: {failure:#}"),
    }
    exit_code
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Replay(_) => "replay",
        Command::Conversations(args) => args.command.name(),
        Command::GenerateChart(_) => "generate-chart",
        Command::Schema(_) => "schema",
    }
}

fn resolve_runtime_paths(args: &RuntimeArgs) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    chatbi::config::resolve_runtime_paths(&home_dir, &cwd, args.data_dir.as_deref())
}
