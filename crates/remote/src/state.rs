// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the store, the connected-session table and the live notification
//! channel for shared access from connection tasks.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use drift_core::db::timestamp_now;
use drift_core::{Database, File, FileVersion, Result, Store};

use crate::sessions::SessionTable;

/// Database filename within the data directory.
const DB_FILE_NAME: &str = "drift.db";

/// A newly stored version, announced to other sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Session that uploaded the version.
    pub origin: String,
    pub filename: String,
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    store: Arc<dyn Store>,
    sessions: SessionTable,
    /// Broadcast channel for notifying control streams of new versions.
    broadcast_tx: broadcast::Sender<Notification>,
}

impl ServerState {
    /// Opens the store in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = Database::open(&data_dir.join(DB_FILE_NAME))?;
        Ok(Self::with_store(Arc::new(db)))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        ServerState {
            inner: Arc::new(ServerStateInner {
                store,
                sessions: SessionTable::new(),
                broadcast_tx,
            }),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    /// Versions the session has not seen: the latest version of each active
    /// file received after its cursor, oldest first. Unknown sessions get everything.
    pub fn catch_up(&self, session_id: &str) -> Result<Vec<FileVersion>> {
        let since = self
            .inner
            .store
            .get_session(session_id)?
            .map(|session| session.last_sync_time)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let versions = self.inner.store.versions_since(since)?;
        debug!(session_id, "catch-up since {}: {} versions", since, versions.len());
        Ok(versions)
    }

    /// Advances the session cursor to now and marks it active.
    pub fn finish_catch_up(&self, session_id: &str) -> Result<()> {
        self.inner
            .store
            .upsert_session(session_id, timestamp_now(), true)
    }

    /// Marks the session inactive once its last control stream closes.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        if self.inner.sessions.release(session_id).await {
            // The cursor never moves backwards, so the epoch only flips the flag.
            self.inner
                .store
                .upsert_session(session_id, DateTime::<Utc>::UNIX_EPOCH, false)?;
        }
        Ok(())
    }

    /// Persists an uploaded version and announces it.
    ///
    /// Returns false if the version was already stored.
    pub fn store_upload(&self, version: &FileVersion) -> Result<bool> {
        let Some(stored) = self.inner.store.store_upload(version)? else {
            return Ok(false);
        };
        // No receivers just means no control stream is open.
        let _ = self.inner.broadcast_tx.send(Notification {
            origin: version.client.clone(),
            filename: stored.location,
        });
        Ok(true)
    }

    /// All active files, for diagnostics.
    pub fn list_active_files(&self) -> Result<Vec<File>> {
        self.inner.store.list_active_files()
    }

    /// Subscribe to new-version notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.broadcast_tx.subscribe()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
