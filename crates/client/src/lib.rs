// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! drift - continuous file sync client.
//!
//! Watches a directory tree, records every change to a tracked file as a
//! version in a local SQLite store, and uploads versions to a remote peer
//! over WebSocket.
//!
//! # Main Components
//!
//! - [`SyncEngine`] - Orchestrates watching, recording and uploading
//! - [`Config`] - Client configuration (root, remote, intervals, extensions)
//! - [`watcher`] - Filesystem events and version recording
//! - [`sync`] - Control session state machine and chunked uploads
//! - [`Error`] - Error types for all operations
//!
//! ```rust,ignore
//! let config = Config::load(Path::new("drift.toml"))?;
//! let engine = SyncEngine::start(config).await?;
//! tokio::signal::ctrl_c().await?;
//! engine.stop().await;
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod sync;
pub mod watcher;

pub use cli::Args;
pub use config::Config;
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use sync::{ControlSession, SessionEvent, SessionState, TransferClient};
pub use watcher::{FsWatcher, Recorder, WatchEvent};
