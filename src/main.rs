//! `reqprof` binary: records request profiling samples and reports on them.

mod cli_logger;

use clap::{Parser, Subcommand};
use reqprof::{
    Config, MaintainCommand, RecordArgs, ReportCommand, Reporter, TrendCommand, maintain_command,
    record_command, report_command, trend_command,
};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli_logger::CliLogger;

#[derive(Debug, Parser)]
#[command(name = "reqprof", version, about = "Request profiling reports")]
struct Cli {
    /// Emit machine-readable JSON instead of the pretty reporter.
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colors in pretty output.
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Path to reqprof.toml; missing files fall back to defaults.
    #[arg(long, global = true, default_value = "reqprof.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record one completed request or script execution.
    Record(RecordArgs),
    /// Query recorded samples.
    #[command(subcommand)]
    Report(ReportCommand),
    /// Inspect or extend monthly page-group aggregates.
    #[command(subcommand)]
    Trend(TrendCommand),
    /// Retention and integrity maintenance.
    #[command(subcommand)]
    Maintain(MaintainCommand),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_optional(&cli.config);
    let json = cli.json || config.reporter == Reporter::Json;
    let logger = CliLogger::new(json, cli.no_color);

    let result = match &cli.command {
        Command::Record(args) => record_command(&config, args),
        Command::Report(command) => report_command(&config, command),
        Command::Trend(command) => trend_command(&config, command),
        Command::Maintain(command) => maintain_command(&config, command),
    };

    match result {
        Ok(value) => {
            if let Err(err) = logger.print_serialized(&value) {
                logger.print_error(&err.to_string());
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            logger.print_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
