//! Eddy CLI - Command-line interface
//!
//! Runs the built-in stream scenarios, fuzzes the harness for determinism and
//! demonstrates the threaded multicast backend.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use eddy_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "eddy")]
#[command(about = "Deterministic test harness for replayable and multicast event streams")]
struct Cli {
    /// Console log level; the log file always records everything
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full debug log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command).await
}
