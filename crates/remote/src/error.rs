// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors that end a connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] drift_core::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message for session {got} on the stream of session {expected}")]
    SessionMismatch { expected: String, got: String },

    #[error("unknown stream path: {0}\n  hint: connect to /control or /upload")]
    UnknownPath(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
