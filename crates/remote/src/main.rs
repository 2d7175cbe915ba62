// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! drift-remote: receiving peer for drift clients.
//!
//! Stores uploaded file versions, replays missed versions to reconnecting
//! sessions and notifies connected sessions of new versions.

mod error;
mod server;
mod sessions;
mod state;
#[cfg(test)]
mod test_helpers;

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// drift-remote: file sync receiving peer
#[derive(Parser, Debug)]
#[command(name = "drift-remote")]
#[command(about = "WebSocket receiving peer for drift file sync")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Directory for database storage
    #[arg(short, long, default_value = ".")]
    data: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.verbose, args.log_file.as_deref());

    info!("Starting drift-remote");
    info!("  Bind address: {}", args.bind);
    info!("  Data directory: {}", args.data.display());

    if let Err(e) = run(&args).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> error::Result<()> {
    fs::create_dir_all(&args.data)?;
    let state = state::ServerState::new(&args.data)?;
    info!("  Tracked files: {}", state.list_active_files()?.len());
    server::run(args.bind, state).await
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Fall back to stderr if the log file cannot be opened.
    let file = log_file.and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
