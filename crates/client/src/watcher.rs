// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watching and version recording.
//!
//! [`FsWatcher`] turns `notify` events under the watch root into
//! [`WatchEvent`]s. [`Recorder`] applies them to the store:
//!
//! - create: register the location if it is new, then record its content
//! - write: record the content of an already tracked location; writes to
//!   untracked locations are reported as [`Error::UntrackedPath`]
//!
//! Removes, renames and metadata changes are ignored. Content identical to
//! the file's current content does not produce a version.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use drift_core::{File, FileVersion, Store};

use crate::error::{Error, Result};

/// A filesystem change relevant to version recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Written(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Written(path) => path,
        }
    }
}

/// Maps a notify event to the changes it reports.
pub fn classify(event: &Event) -> Vec<WatchEvent> {
    let make: fn(PathBuf) -> WatchEvent = match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => WatchEvent::Created,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => WatchEvent::Written,
        _ => return Vec::new(),
    };
    event.paths.iter().cloned().map(make).collect()
}

/// Location of `path` relative to `root`, `/`-separated.
///
/// Returns `None` for the root itself and for paths outside it.
pub fn location_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Records filesystem changes as file versions.
pub struct Recorder {
    store: Arc<dyn Store>,
    root: PathBuf,
    client: String,
}

impl Recorder {
    /// Creates a recorder for paths under `root`, attributing versions to `client`.
    pub fn new(store: Arc<dyn Store>, root: impl Into<PathBuf>, client: impl Into<String>) -> Self {
        Recorder {
            store,
            root: root.into(),
            client: client.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Applies one event. Returns the version it produced, if any.
    pub fn record(&self, event: &WatchEvent) -> Result<Option<FileVersion>> {
        match event {
            WatchEvent::Created(path) => self.record_created(path),
            WatchEvent::Written(path) => self.record_written(path),
        }
    }

    /// Registers the location if needed and records its content.
    pub fn record_created(&self, path: &Path) -> Result<Option<FileVersion>> {
        let Some(location) = self.tracked_location(path) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }

        let file = match self.store.find_file_by_location(&location)? {
            Some(file) => file,
            None => {
                let file = self.store.create_file(&location)?;
                info!(location = %location, "tracking new file");
                file
            }
        };
        self.commit(&file, path)
    }

    /// Records the content of an already tracked location.
    pub fn record_written(&self, path: &Path) -> Result<Option<FileVersion>> {
        let Some(location) = self.tracked_location(path) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }

        let file = self
            .store
            .find_file_by_location(&location)?
            .ok_or(Error::UntrackedPath(location))?;
        self.commit(&file, path)
    }

    /// Walks the whole tree, giving every tracked path a baseline version.
    ///
    /// Per-path failures are logged and skipped. Returns the versions created.
    pub fn scan(&self) -> Vec<FileVersion> {
        let mut versions = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("scan: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match self.record_created(entry.path()) {
                Ok(Some(version)) => versions.push(version),
                Ok(None) => {}
                Err(e) => warn!(path = %entry.path().display(), "scan: {}", e),
            }
        }
        debug!("scan recorded {} versions", versions.len());
        versions
    }

    fn tracked_location(&self, path: &Path) -> Option<String> {
        location_for(&self.root, path).filter(|location| self.store.valid_extension(location))
    }

    fn commit(&self, file: &File, path: &Path) -> Result<Option<FileVersion>> {
        let content = std::fs::read_to_string(path)?;

        // Re-read the committed content; `file` may be stale.
        if let Some(current) = self.store.find_file_by_location(&file.location)? {
            if current.content == content && self.has_version(&current)? {
                return Ok(None);
            }
        }

        let version = self
            .store
            .create_file_version(file, &content, &self.client)?;
        debug!(location = %file.location, version = %version.id, "recorded version");
        Ok(Some(version))
    }

    fn has_version(&self, file: &File) -> Result<bool> {
        match self.store.latest_version(&file.id) {
            Ok(_) => Ok(true),
            Err(drift_core::Error::VersionNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Subscription to filesystem events under a root.
pub struct FsWatcher {
    root: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    // Dropping the watcher closes the subscription.
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Starts watching `root` recursively.
    pub fn start(root: &Path) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is gone only after the watcher is dropped.
            let _ = tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("watching {}", root.display());

        Ok(FsWatcher {
            root: root.to_path_buf(),
            events,
            _watcher: watcher,
        })
    }

    /// Waits for the next batch of relevant changes.
    ///
    /// Fails when the subscription reports an error, when the root is
    /// removed, or when the subscription ends.
    pub async fn next(&mut self) -> Result<Vec<WatchEvent>> {
        loop {
            let event = self.events.recv().await.ok_or(Error::WatchClosed)??;

            if matches!(event.kind, EventKind::Remove(_))
                && (event.paths.iter().any(|p| p == &self.root) || !self.root.exists())
            {
                return Err(Error::WatchRootRemoved(self.root.clone()));
            }

            let changes = classify(&event);
            if !changes.is_empty() {
                return Ok(changes);
            }
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
