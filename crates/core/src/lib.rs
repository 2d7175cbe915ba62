// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! drift-core: Shared library for the drift sync engine
//!
//! This crate provides the persisted records, the line diff engine, the
//! SQLite store and the wire protocol used by both the drift client and the
//! drift-remote server.

pub mod db;
pub mod diff;
pub mod error;
pub mod model;
pub mod protocol;
pub mod store;

pub use db::Database;
pub use diff::{apply_changes, diff_lines};
pub use error::{Error, Result};
pub use model::{ChangeType, ClientSession, File, FileChange, FileVersion};
pub use protocol::{ActionResponse, ControlMessage, ControlType, UploadMessage, VersionChunk};
pub use store::Store;
