// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is read from a TOML file (conventionally `drift.toml`) and
//! includes:
//! - `root`: the directory tree to watch
//! - `remote`: WebSocket endpoint of the remote peer (`ws://...` or `wss://...`)
//! - `database`: optional path of the local SQLite store
//! - reconnection interval, chunk size, extension allow-list and session id

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drift_core::protocol::{CHUNK_SIZE, CONTROL_PATH, UPLOAD_PATH};
use drift_core::store::DEFAULT_EXTENSIONS;

use crate::error::{Error, Result};

const STATE_DIR_NAME: &str = ".drift";
const DB_FILE_NAME: &str = "drift.db";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the watched directory tree.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Path of the local database (default: `<root>/.drift/drift.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Remote endpoint, e.g. `ws://localhost:7890`.
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Seconds between reconnection attempts while disconnected (default: 10).
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    /// Upload chunk size in bytes (default: 64 KiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Tracked file extensions (default: md, txt).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Stable client identity. Derived from the watch root when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "ws://localhost:7890".to_string()
}

fn default_reconnect_interval_secs() -> u64 {
    10
}

fn default_chunk_size() -> usize {
    CHUNK_SIZE
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: default_root(),
            database: None,
            remote: default_remote(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            chunk_size: default_chunk_size(),
            extensions: default_extensions(),
            session_id: None,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(self.remote.starts_with("ws://") || self.remote.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "remote '{}' is not a WebSocket URL\n  hint: use ws://host:port or wss://host:port",
                self.remote
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.reconnect_interval_secs == 0 {
            return Err(Error::Config(
                "reconnect_interval_secs must be positive".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config(
                "extensions must list at least one extension".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the local database.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.root.join(STATE_DIR_NAME).join(DB_FILE_NAME))
    }

    /// Interval between reconnection attempts.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// URL of the control stream.
    pub fn control_url(&self) -> String {
        format!("{}{}", self.remote.trim_end_matches('/'), CONTROL_PATH)
    }

    /// URL of the upload stream.
    pub fn upload_url(&self) -> String {
        format!("{}{}", self.remote.trim_end_matches('/'), UPLOAD_PATH)
    }

    /// Returns the configured session id, or one derived from the canonical
    /// watch root so restarts keep the same catch-up cursor on the remote.
    pub fn session_id(&self) -> Result<String> {
        if let Some(id) = &self.session_id {
            return Ok(id.clone());
        }
        let root = self.root.canonicalize()?;
        let digest = Sha256::digest(root.to_string_lossy().as_bytes());
        Ok(format!("drift-{}", &hex::encode(digest)[..16]))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
