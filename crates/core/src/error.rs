// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for drift-core operations.

use thiserror::Error;

/// All possible errors that can occur in drift-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("no version recorded for file: {0}")]
    VersionNotFound(String),

    #[error("invalid change type: '{0}'\n  hint: valid types are: add, remove")]
    InvalidChangeType(String),

    #[error("invalid control message type: '{0}'")]
    InvalidMessageType(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for drift-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
