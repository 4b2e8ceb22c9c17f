//! # lansync
//!
//! Keeps selected folders on two or more machines on the same network
//! continuously consistent: filesystem watching with debounce, mDNS peer
//! discovery, and deterministic conflict resolution.
//!
//! ## Commands
//!
//! - `daemon`: run the sync daemon (default when no command is given)
//! - `status`: show configuration and sync status
//! - `add` / `remove`: manage synced folders
//! - `peers`: listen for peers on the local network
//!
//! ## Example
//!
//! ```bash
//! lansync add ~/Desktop
//! lansync daemon
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lansync_node::Paths;

mod commands;

use commands::{daemon, folders, peers, status};

/// Real-time folder synchronization over the local network.
#[derive(Parser, Debug)]
#[command(name = "lansync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the config file and sync state
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon
    Daemon,
    /// Show configuration and sync status
    Status,
    /// Add a folder to sync
    Add {
        /// Path of the folder to add
        path: PathBuf,
    },
    /// Remove a folder from sync
    Remove {
        /// Path of the folder to remove
        path: PathBuf,
    },
    /// Listen for peers on the local network
    Peers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = match cli.config_dir {
        Some(dir) => Paths::in_dir(dir),
        None => Paths::resolve().context("Could not determine config directory")?,
    };

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => daemon::run(&paths).await,
        Commands::Status => status::run(&paths),
        Commands::Add { path } => folders::add(&paths, &path),
        Commands::Remove { path } => folders::remove(&paths, &path),
        Commands::Peers => peers::run(&paths).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
