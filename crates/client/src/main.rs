// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! drift - continuous file sync client.
//!
//! Usage:
//!   drift --config drift.toml
//!   drift --root ~/notes --remote ws://host:7890

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::fs;
use std::path::Path;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drift::{Args, SyncEngine};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.verbose, args.log_file.as_deref());

    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> drift::Result<()> {
    let config = args.into_config()?;
    let engine = SyncEngine::start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    engine.stop().await;
    Ok(())
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
