// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Core data types for the drift sync engine.
//!
//! This module contains the persisted records: File, FileVersion, FileChange
//! and ClientSession.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A tracked path with its current content.
///
/// `content` always equals the content of the most recently committed
/// [`FileVersion`] for this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Unique identifier.
    pub id: String,
    /// Location relative to the watch root, `/`-separated. Unique.
    pub location: String,
    /// Content of the latest committed version.
    pub content: String,
    /// Inactive files are excluded from catch-up.
    pub active: bool,
}

impl File {
    /// Creates a new active file with empty content and a fresh identifier.
    pub fn new(location: impl Into<String>) -> Self {
        File {
            id: new_id(),
            location: location.into(),
            content: String::new(),
            active: true,
        }
    }
}

/// An immutable full-content snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    pub location: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Session identity of the client that produced this version.
    pub client: String,
}

/// Direction of a line-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Line present in the new snapshot only.
    Add,
    /// Line present in the old snapshot only.
    Remove,
}

impl ChangeType {
    /// Returns the string representation used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Remove => "remove",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(ChangeType::Add),
            "remove" => Ok(ChangeType::Remove),
            _ => Err(Error::InvalidChangeType(s.to_string())),
        }
    }
}

/// One line-level annotation between two snapshots.
///
/// Supplementary audit data. The version's content snapshot is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub change_type: ChangeType,
    /// The single line added or removed, without its trailing newline.
    pub content: String,
    /// Index into the new snapshot for adds, into the old snapshot for removes.
    pub position: usize,
    /// Owning version; empty until the change is persisted.
    #[serde(default)]
    pub version_id: String,
}

impl FileChange {
    /// Creates an add of `content` at `position` in the new snapshot.
    pub fn add(content: impl Into<String>, position: usize) -> Self {
        FileChange {
            change_type: ChangeType::Add,
            content: content.into(),
            position,
            version_id: String::new(),
        }
    }

    /// Creates a remove of `content` at `position` in the old snapshot.
    pub fn remove(content: impl Into<String>, position: usize) -> Self {
        FileChange {
            change_type: ChangeType::Remove,
            content: content.into(),
            position,
            version_id: String::new(),
        }
    }
}

/// Per-client catch-up cursor kept by the receiving peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub session_id: String,
    pub last_sync_time: DateTime<Utc>,
    pub is_active: bool,
}

/// Generates a new random record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
