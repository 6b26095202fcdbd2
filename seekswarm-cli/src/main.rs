//! Seekswarm CLI - Command-line interface
//!
//! Exposes piece mapping, request validation and swarm health refresh.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use seekswarm_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "seekswarm")]
#[command(about = "Seekable streams and swarm health for BitTorrent media")]
struct Cli {
    /// Console log level; the log file always records everything
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
