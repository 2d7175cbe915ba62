// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::sync::TransportError;

/// All possible errors that can occur in the drift client.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] drift_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected to remote")]
    NotConnected,

    #[error("write to untracked path: {0}\n  hint: files are registered when they are created or found by the startup scan")]
    UntrackedPath(String),

    #[error("unexpected control message: {0}")]
    UnexpectedMessage(String),

    #[error("remote silent for {0:?}")]
    RemoteSilent(Duration),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("watch root removed: {}", .0.display())]
    WatchRootRemoved(PathBuf),

    #[error("watch subscription closed")]
    WatchClosed,

    #[error("upload of {location} rejected: {message}")]
    Upload { location: String, message: String },
}

/// A specialized Result type for drift client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
