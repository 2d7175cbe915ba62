// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::Result;

/// drift: continuous file sync client
#[derive(Parser, Debug)]
#[command(name = "drift")]
#[command(about = "Watch a directory and sync file versions to a remote peer")]
pub struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory to watch (overrides config)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Remote endpoint, e.g. ws://host:7890 (overrides config)
    #[arg(long)]
    pub remote: Option<String>,

    /// Local database path (overrides config)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Stable client identity (overrides config)
    #[arg(long)]
    pub session_id: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Loads the configuration file, if any, and applies overrides.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(remote) = self.remote {
            config.remote = remote;
        }
        if let Some(database) = self.database {
            config.database = Some(database);
        }
        if let Some(session_id) = self.session_id {
            config.session_id = Some(session_id);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
