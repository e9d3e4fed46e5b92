//! Tether CLI - Command-line interface for the tether sync engine
//!
//! Provides commands for:
//! - Running a sync round and inspecting its report
//! - Viewing pending changes and connectivity
//! - Managing the outbox (list, discard, retry)
//! - Reading and writing records through the offline-first API
//! - Running the long-lived sync agent

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tether_core::config::Config;

mod commands;
mod credentials;
mod engine;
mod output;

use commands::{
    config::ConfigCommand, outbox::OutboxCommand, records::RecordsCommand, run::RunCommand,
    status::StatusCommand, sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "tether", version, about = "Offline-first record sync agent")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one sync round now
    Sync(SyncCommand),
    /// Show pending changes, cursors and connectivity
    Status(StatusCommand),
    /// Inspect and manage queued changes
    #[command(subcommand)]
    Outbox(OutboxCommand),
    /// Read and write records
    #[command(subcommand)]
    Records(RecordsCommand),
    /// Run the sync agent until interrupted
    Run(RunCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Pick the log filter: `RUST_LOG` wins, then `-v`/`-q`, then the config file
fn log_filter(verbose: u8, quiet: bool, configured: &str) -> EnvFilter {
    let level = match (verbose, quiet) {
        (0, true) => "warn",
        (0, false) => configured,
        (1, _) => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let logging = Config::load_or_default(&config_path).logging;

    // Setup tracing
    let env_filter = log_filter(cli.verbose, cli.quiet, &logging.level);
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&config_path, format).await,
        Commands::Status(cmd) => cmd.execute(&config_path, format).await,
        Commands::Outbox(cmd) => cmd.execute(&config_path, format).await,
        Commands::Records(cmd) => cmd.execute(&config_path, format).await,
        Commands::Run(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
