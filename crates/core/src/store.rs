// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence interface shared by the client engine and the remote.
//!
//! [`Store`] is the only way the rest of the system touches durable state.
//! [`crate::Database`] is the SQLite implementation.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{ClientSession, File, FileChange, FileVersion};

/// Extensions tracked when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "txt"];

/// Durable store of files, versions and client sessions.
///
/// Implementations must be safe for concurrent use.
pub trait Store: Send + Sync {
    /// Looks up a file by its location.
    fn find_file_by_location(&self, location: &str) -> Result<Option<File>>;

    /// Registers a new active file with empty content.
    fn create_file(&self, location: &str) -> Result<File>;

    /// Records `content` as the next version of `file`.
    ///
    /// Within one transaction: inserts the version, inserts its line changes
    /// against the file's current content, and updates the file's content.
    /// On failure nothing is written.
    fn create_file_version(&self, file: &File, content: &str, client: &str)
        -> Result<FileVersion>;

    /// Returns the most recent version of a file.
    fn latest_version(&self, file_id: &str) -> Result<FileVersion>;

    /// Returns every version of a file, oldest first.
    fn list_versions(&self, file_id: &str) -> Result<Vec<FileVersion>>;

    /// Returns the line changes recorded with a version, in position order.
    fn list_changes(&self, version_id: &str) -> Result<Vec<FileChange>>;

    /// Returns all active files.
    fn list_active_files(&self) -> Result<Vec<File>>;

    /// Whether a location has a tracked extension.
    fn valid_extension(&self, location: &str) -> bool;

    /// Looks up a client session cursor.
    fn get_session(&self, session_id: &str) -> Result<Option<ClientSession>>;

    /// Creates or updates a session cursor. The stored time never moves backwards.
    fn upsert_session(&self, session_id: &str, time: DateTime<Utc>, active: bool) -> Result<()>;

    /// Latest version of each active file recorded by this store after
    /// `since`, oldest first.
    ///
    /// Compares the local receive time, not the sender's timestamp, so a
    /// version created offline and uploaded later is still reported.
    fn versions_since(&self, since: DateTime<Utc>) -> Result<Vec<FileVersion>>;

    /// Persists a version received from a peer.
    ///
    /// Upserts the file at the version's location and inserts the version.
    /// Returns the stored version (with the local file id), or `None` if the
    /// version id was already stored.
    fn store_upload(&self, version: &FileVersion) -> Result<Option<FileVersion>>;

    /// Marks a version as acknowledged by the peer.
    fn mark_uploaded(&self, version_id: &str) -> Result<()>;

    /// Latest version of each active file not yet acknowledged by the peer.
    fn pending_uploads(&self) -> Result<Vec<FileVersion>>;
}

/// Checks `location` against an extension allow-list, ignoring case and a
/// leading dot in the list entries.
pub fn has_extension<S: AsRef<str>>(location: &str, extensions: &[S]) -> bool {
    let Some(ext) = Path::new(location).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.as_ref().trim_start_matches('.').eq_ignore_ascii_case(ext))
}
