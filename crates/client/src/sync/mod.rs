// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote sync over the control and upload streams.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ControlSession│────►│  Transport  │────►│   Remote    │
//! │ (state, run) │◄────│   (trait)   │◄────│   /control  │
//! └──────────────┘     └─────────────┘     └─────────────┘
//!        ▲ START_TRANSFER
//! ┌──────────────┐     ┌───────────────┐     ┌─────────────┐
//! │TransferClient│────►│UploadTransport│────►│   Remote    │
//! │  (chunks)    │◄────│    (trait)    │◄────│   /upload   │
//! └──────────────┘     └───────────────┘     └─────────────┘
//! ```
//!
//! # Features
//!
//! - Fixed-interval reconnection while disconnected
//! - READY handshake with a stable session id
//! - Pause/resume of remote notifications
//! - Chunked uploads acknowledged with a single response
//! - Injectable transport traits for testing

mod session;
mod transport;
mod upload;

pub use session::{ControlSession, SessionEvent, SessionState};
pub use transport::{
    Transport, TransportError, TransportFactory, TransportFuture, TransportResult,
    UploadTransport, WebSocketTransport, WebSocketUploadTransport,
};
pub use upload::TransferClient;


#[cfg(test)]
mod session_tests;
