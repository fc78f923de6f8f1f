//! tkharvest - incremental harvester for the Tweede Kamer SyncFeed
//!
//! Resumes from the stored cursor, converts new documents to plain text and
//! publishes the batch as Parquet.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "tkharvest")]
#[command(about = "Incremental harvester for the Tweede Kamer SyncFeed")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./tkharvest.toml or ~/.config/tkharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest new documents from the stored cursor and publish them
    Harvest(cmd::harvest::HarvestArgs),
    /// Inspect or change stored cursors
    Cursor(cmd::cursor::CursorArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(tkharvest_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — the page spinner shows activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    tkharvest_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Harvest(args) => cmd::harvest::run(args, &config, &progress),
        Command::Cursor(args) => cmd::cursor::run(args, &config),
        Command::Config => {
            eprintln!("\n{}", cmd::config_table(&config));
            Ok(())
        }
    }
}
