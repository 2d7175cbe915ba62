// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Table of sessions with an open control stream.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionEntry {
    /// Open control streams for this session id.
    streams: usize,
    paused: bool,
}

/// Connected sessions keyed by session id.
///
/// A client that reconnects may briefly hold two streams; the entry lives
/// until the last one is released.
#[derive(Debug, Default)]
pub struct SessionTable {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a control stream for `session_id`. A new stream starts unpaused.
    pub async fn register(&self, session_id: &str) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(session_id.to_string()).or_default();
        entry.streams += 1;
        entry.paused = false;
    }

    /// Releases one control stream. Returns true when it was the last.
    pub async fn release(&self, session_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(session_id) else {
            return false;
        };
        entry.streams = entry.streams.saturating_sub(1);
        if entry.streams == 0 {
            entries.remove(session_id);
            true
        } else {
            false
        }
    }

    /// Sets the pause flag. Returns false for an unknown session.
    pub async fn set_paused(&self, session_id: &str, paused: bool) -> bool {
        match self.entries.write().await.get_mut(session_id) {
            Some(entry) => {
                entry.paused = paused;
                true
            }
            None => false,
        }
    }

    pub async fn is_paused(&self, session_id: &str) -> bool {
        self.entries
            .read()
            .await
            .get(session_id)
            .is_some_and(|entry| entry.paused)
    }

    #[cfg(test)]
    pub async fn contains(&self, session_id: &str) -> bool {
        self.entries.read().await.contains_key(session_id)
    }

    /// Number of connected sessions.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
