// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed implementation of [`Store`].
//!
//! The [`Database`] struct serializes access to one connection behind a
//! mutex. Version creation runs in an immediate transaction so concurrent
//! writers to the same file are ordered.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::diff::diff_lines;
use crate::error::{Error, Result};
use crate::model::{new_id, ClientSession, File, FileChange, FileVersion};
use crate::store::{has_extension, Store, DEFAULT_EXTENSIONS};

/// SQL schema for the sync database.
pub const SCHEMA: &str = r#"
-- Tracked paths with the content of their latest version
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    location TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1
);

-- Immutable content snapshots
CREATE TABLE IF NOT EXISTS file_versions (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    location TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    client TEXT NOT NULL,
    uploaded INTEGER NOT NULL DEFAULT 0,
    -- Local clock when this store recorded the version
    received_at TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (file_id) REFERENCES files(id)
);

-- Line-level audit trail between consecutive versions
CREATE TABLE IF NOT EXISTS file_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id TEXT NOT NULL,
    type TEXT NOT NULL,
    content TEXT NOT NULL,
    position INTEGER NOT NULL,
    FOREIGN KEY (version_id) REFERENCES file_versions(id)
);

-- Per-client catch-up cursors
CREATE TABLE IF NOT EXISTS client_sessions (
    session_id TEXT PRIMARY KEY,
    last_sync_time TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_versions_file ON file_versions(file_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_changes_version ON file_changes(version_id);
"#;

/// Selects the latest version of every active file, filtered by `{filter}`.
const LATEST_VERSIONS: &str = "
    SELECT v.id, v.file_id, f.location, v.content, v.timestamp, v.client
    FROM files f
    JOIN file_versions v ON v.file_id = f.id
    WHERE f.active = 1
      AND v.rowid = (
          SELECT v2.rowid FROM file_versions v2
          WHERE v2.file_id = f.id
          ORDER BY v2.timestamp DESC, v2.rowid DESC
          LIMIT 1
      )
      AND {filter}
    ORDER BY v.timestamp ASC, v.rowid ASC";

/// Current time at the precision stored in the database.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp as fixed-width RFC3339 so text order is time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse a string value from the database, returning a rusqlite error on parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

fn file_from_row(row: &Row<'_>) -> std::result::Result<File, rusqlite::Error> {
    Ok(File {
        id: row.get(0)?,
        location: row.get(1)?,
        content: row.get(2)?,
        active: row.get(3)?,
    })
}

fn version_from_row(row: &Row<'_>) -> std::result::Result<FileVersion, rusqlite::Error> {
    let timestamp: String = row.get(4)?;
    Ok(FileVersion {
        id: row.get(0)?,
        file_id: row.get(1)?,
        location: row.get(2)?,
        content: row.get(3)?,
        timestamp: parse_timestamp(&timestamp, "timestamp")?,
        client: row.get(5)?,
    })
}

/// Run schema creation on a database connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_add_received_at(conn)?;
    Ok(())
}

/// Add the received_at column to databases created before it existed.
///
/// Existing rows fall back to their version timestamp.
fn migrate_add_received_at(conn: &Connection) -> Result<()> {
    let has_column: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('file_versions') WHERE name = 'received_at'",
        [],
        |row| row.get(0),
    )?;
    if !has_column {
        conn.execute(
            "ALTER TABLE file_versions ADD COLUMN received_at TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    conn.execute(
        "UPDATE file_versions SET received_at = timestamp WHERE received_at = ''",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_versions_received ON file_versions(received_at)",
        [],
    )?;
    Ok(())
}

/// SQLite database connection implementing [`Store`].
pub struct Database {
    conn: Mutex<Connection>,
    extensions: Vec<String>,
}

impl Database {
    /// Open a database connection at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for concurrency
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Replaces the tracked extension allow-list.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latest_versions_where(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<FileVersion>> {
        let conn = self.conn();
        let sql = LATEST_VERSIONS.replace("{filter}", filter);
        let mut stmt = conn.prepare(&sql)?;
        let versions = stmt
            .query_map(params, version_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }
}

impl Store for Database {
    fn find_file_by_location(&self, location: &str) -> Result<Option<File>> {
        let file = self
            .conn()
            .query_row(
                "SELECT id, location, content, active FROM files WHERE location = ?1",
                params![location],
                file_from_row,
            )
            .optional()?;
        Ok(file)
    }

    fn create_file(&self, location: &str) -> Result<File> {
        let file = File::new(location);
        self.conn().execute(
            "INSERT INTO files (id, location, content, active) VALUES (?1, ?2, ?3, ?4)",
            params![file.id, file.location, file.content, file.active],
        )?;
        Ok(file)
    }

    fn create_file_version(
        &self,
        file: &File,
        content: &str,
        client: &str,
    ) -> Result<FileVersion> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Diff against the committed content, not the caller's snapshot.
        let current: String = tx
            .query_row(
                "SELECT content FROM files WHERE id = ?1",
                params![file.id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::FileNotFound(file.location.clone()))?;

        let version = FileVersion {
            id: new_id(),
            file_id: file.id.clone(),
            location: file.location.clone(),
            content: content.to_string(),
            timestamp: timestamp_now(),
            client: client.to_string(),
        };

        let timestamp = format_timestamp(&version.timestamp);
        tx.execute(
            "INSERT INTO file_versions (id, file_id, location, content, timestamp, client, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5)",
            params![
                version.id,
                version.file_id,
                version.location,
                version.content,
                timestamp,
                version.client,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO file_changes (version_id, type, content, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for change in diff_lines(&current, content) {
                stmt.execute(params![
                    version.id,
                    change.change_type.as_str(),
                    change.content,
                    change.position as i64,
                ])?;
            }
        }

        tx.execute(
            "UPDATE files SET content = ?1 WHERE id = ?2",
            params![content, file.id],
        )?;

        tx.commit()?;
        Ok(version)
    }

    fn latest_version(&self, file_id: &str) -> Result<FileVersion> {
        self.conn()
            .query_row(
                "SELECT id, file_id, location, content, timestamp, client
                 FROM file_versions WHERE file_id = ?1
                 ORDER BY timestamp DESC, rowid DESC LIMIT 1",
                params![file_id],
                version_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::VersionNotFound(file_id.to_string()))
    }

    fn list_versions(&self, file_id: &str) -> Result<Vec<FileVersion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, location, content, timestamp, client
             FROM file_versions WHERE file_id = ?1
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let versions = stmt
            .query_map(params![file_id], version_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn list_changes(&self, version_id: &str) -> Result<Vec<FileChange>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT type, content, position, version_id
             FROM file_changes WHERE version_id = ?1
             ORDER BY position ASC, id ASC",
        )?;
        let changes = stmt
            .query_map(params![version_id], |row| {
                let type_str: String = row.get(0)?;
                let position: i64 = row.get(2)?;
                Ok(FileChange {
                    change_type: parse_db(&type_str, "type")?,
                    content: row.get(1)?,
                    position: position as usize,
                    version_id: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    fn list_active_files(&self) -> Result<Vec<File>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, location, content, active FROM files
             WHERE active = 1 ORDER BY location",
        )?;
        let files = stmt
            .query_map([], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn valid_extension(&self, location: &str) -> bool {
        has_extension(location, &self.extensions)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<ClientSession>> {
        let session = self
            .conn()
            .query_row(
                "SELECT session_id, last_sync_time, is_active
                 FROM client_sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    let last_sync: String = row.get(1)?;
                    Ok(ClientSession {
                        session_id: row.get(0)?,
                        last_sync_time: parse_timestamp(&last_sync, "last_sync_time")?,
                        is_active: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn upsert_session(&self, session_id: &str, time: DateTime<Utc>, active: bool) -> Result<()> {
        self.conn().execute(
            "INSERT INTO client_sessions (session_id, last_sync_time, is_active)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                 last_sync_time = MAX(last_sync_time, excluded.last_sync_time),
                 is_active = excluded.is_active",
            params![session_id, format_timestamp(&time), active],
        )?;
        Ok(())
    }

    fn versions_since(&self, since: DateTime<Utc>) -> Result<Vec<FileVersion>> {
        self.latest_versions_where("v.received_at > ?1", &[&format_timestamp(&since)])
    }

    fn store_upload(&self, version: &FileVersion) -> Result<Option<FileVersion>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM file_versions WHERE id = ?1",
            params![version.id],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(None);
        }

        let existing = tx
            .query_row(
                "SELECT id, location, content, active FROM files WHERE location = ?1",
                params![version.location],
                file_from_row,
            )
            .optional()?;

        let file_id = match existing {
            Some(file) => {
                let latest: Option<String> = tx.query_row(
                    "SELECT MAX(timestamp) FROM file_versions WHERE file_id = ?1",
                    params![file.id],
                    |row| row.get(0),
                )?;
                let incoming = format_timestamp(&version.timestamp);
                // A late, older version is recorded but does not replace newer content.
                if latest.is_none_or(|latest| incoming >= latest) {
                    tx.execute(
                        "UPDATE files SET content = ?1, active = 1 WHERE id = ?2",
                        params![version.content, file.id],
                    )?;
                }
                file.id
            }
            None => {
                tx.execute(
                    "INSERT INTO files (id, location, content, active) VALUES (?1, ?2, ?3, 1)",
                    params![version.file_id, version.location, version.content],
                )?;
                version.file_id.clone()
            }
        };

        // The sender's timestamp orders history; the receive time drives catch-up.
        tx.execute(
            "INSERT INTO file_versions
                 (id, file_id, location, content, timestamp, client, uploaded, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                version.id,
                file_id,
                version.location,
                version.content,
                format_timestamp(&version.timestamp),
                version.client,
                format_timestamp(&timestamp_now()),
            ],
        )?;

        tx.commit()?;
        Ok(Some(FileVersion {
            file_id,
            ..version.clone()
        }))
    }

    fn mark_uploaded(&self, version_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE file_versions SET uploaded = 1 WHERE id = ?1",
            params![version_id],
        )?;
        Ok(())
    }

    fn pending_uploads(&self) -> Result<Vec<FileVersion>> {
        self.latest_versions_where("v.uploaded = 0", &[])
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
