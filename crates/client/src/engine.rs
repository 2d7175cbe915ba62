// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync engine: wires the watcher, the store, the control session and the
//! transfer client together.
//!
//! Startup order:
//! 1. open the local store
//! 2. start the control session's reconnection loop
//! 3. subscribe to filesystem events, then scan the tree so every tracked
//!    file has a baseline version, uploading each one if already connected
//! 4. hand the subscription to the change pipeline
//!
//! The pipeline is one task. It records filesystem changes, uploads new
//! versions while connected, flushes pending versions whenever the session
//! becomes ready, and restarts the watch after a failure. Recording and
//! scanning run on the blocking pool and are always awaited, so no store
//! handle outlives [`SyncEngine::stop`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drift_core::{Database, FileVersion, Store};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::{
    ControlSession, SessionEvent, TransferClient, Transport, TransportFactory, UploadTransport,
    WebSocketTransport, WebSocketUploadTransport,
};
use crate::watcher::{FsWatcher, Recorder, WatchEvent};

/// A running sync engine.
pub struct SyncEngine {
    root: PathBuf,
    store: Arc<dyn Store>,
    session: ControlSession,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Starts the engine against the WebSocket endpoints in `config`.
    pub async fn start(config: Config) -> Result<Self> {
        let control: TransportFactory<WebSocketTransport> = Arc::new(WebSocketTransport::new);
        let upload: TransportFactory<WebSocketUploadTransport> =
            Arc::new(WebSocketUploadTransport::new);
        Self::start_with(config, control, upload).await
    }

    /// Starts the engine with explicit transport factories.
    pub async fn start_with<T, U>(
        config: Config,
        control: TransportFactory<T>,
        upload: TransportFactory<U>,
    ) -> Result<Self>
    where
        T: Transport + 'static,
        U: UploadTransport + 'static,
    {
        config.validate()?;
        let root = config.root.canonicalize().map_err(|e| {
            Error::Config(format!("watch root {}: {}", config.root.display(), e))
        })?;
        let session_id = config.session_id()?;

        let database_path = config.database_path();
        let store: Arc<dyn Store> =
            Arc::new(Database::open(&database_path)?.with_extensions(config.extensions.clone()));
        info!(
            session_id = %session_id,
            "drift starting: root={} database={}",
            root.display(),
            database_path.display()
        );

        let cancel = CancellationToken::new();
        let (session, events) = ControlSession::new(&session_id, config.control_url());
        let interval = config.reconnect_interval();
        let session_task = tokio::spawn(session.clone().run(control, interval, cancel.clone()));

        let pipeline = Pipeline {
            recorder: Arc::new(Recorder::new(Arc::clone(&store), &root, &session_id)),
            transfer: TransferClient::new(
                session.clone(),
                Arc::clone(&store),
                upload,
                config.upload_url(),
                config.chunk_size,
            ),
            restart_interval: interval,
            cancel: cancel.clone(),
        };

        // Subscribe before scanning so changes made during the scan are not lost.
        let watcher = match FsWatcher::start(&root) {
            Ok(watcher) => watcher,
            Err(e) => {
                cancel.cancel();
                let _ = session_task.await;
                return Err(e);
            }
        };
        let scanned = pipeline.rescan().await;
        info!("initial scan recorded {} versions", scanned);

        let pipeline_task = tokio::spawn(async move {
            pipeline.run(watcher, events).await;
            debug!("change pipeline stopped");
        });

        Ok(SyncEngine {
            root,
            store,
            session,
            cancel,
            tasks: vec![session_task, pipeline_task],
        })
    }

    /// Canonical watch root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn session(&self) -> &ControlSession {
        &self.session
    }

    /// Stops all engine tasks and waits for them to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("engine task failed: {}", e);
            }
        }
        info!("drift stopped");
    }
}

struct Pipeline<U: UploadTransport> {
    recorder: Arc<Recorder>,
    transfer: TransferClient<U>,
    restart_interval: Duration,
    cancel: CancellationToken,
}

impl<U: UploadTransport> Pipeline<U> {
    async fn run(&self, watcher: FsWatcher, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut watcher = Some(watcher);
        let mut restart_at = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.on_session_event(event).await,
                    None => break,
                },
                batch = next_batch(&mut watcher) => match batch {
                    Ok(changes) => {
                        for change in &changes {
                            self.on_change(change).await;
                        }
                    }
                    Err(e) => {
                        error!("filesystem watch failed: {}", e);
                        watcher = None;
                        restart_at = Instant::now() + self.restart_interval;
                    }
                },
                _ = tokio::time::sleep_until(restart_at), if watcher.is_none() => {
                    match FsWatcher::start(self.recorder.root()) {
                        Ok(restarted) => {
                            watcher = Some(restarted);
                            let recorded = self.rescan().await;
                            info!("watch restarted, rescan recorded {} versions", recorded);
                            self.flush().await;
                        }
                        Err(e) => {
                            warn!("watch restart failed: {}", e);
                            restart_at = Instant::now() + self.restart_interval;
                        }
                    }
                }
            }
        }
    }

    async fn on_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Ready => self.flush().await,
            SessionEvent::NewFile(location) => {
                // Remote versions are not pulled; surface the conflict only.
                info!(location = %location, "remote has a newer version");
            }
            SessionEvent::Disconnected => debug!("uploads deferred until reconnected"),
        }
    }

    async fn on_change(&self, change: &WatchEvent) {
        let recorder = Arc::clone(&self.recorder);
        let owned = change.clone();
        let recorded = tokio::task::spawn_blocking(move || recorder.record(&owned)).await;
        let version = match recorded {
            Ok(Ok(Some(version))) => version,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                warn!(path = %change.path().display(), "change not recorded: {}", e);
                return;
            }
            Err(e) => {
                error!(path = %change.path().display(), "record task failed: {}", e);
                return;
            }
        };
        self.publish(&version).await;
    }

    /// Scans the whole tree and publishes every recorded version.
    async fn rescan(&self) -> usize {
        let recorder = Arc::clone(&self.recorder);
        let versions = match tokio::task::spawn_blocking(move || recorder.scan()).await {
            Ok(versions) => versions,
            Err(e) => {
                error!("scan task failed: {}", e);
                return 0;
            }
        };
        for version in &versions {
            self.publish(version).await;
        }
        versions.len()
    }

    /// Uploads one version. Versions left unacknowledged stay pending for
    /// the next flush, including when the engine stops mid-upload.
    async fn publish(&self, version: &FileVersion) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.transfer.upload(version) => result,
        };
        match result {
            Ok(()) => {}
            Err(Error::NotConnected) => {
                debug!(location = %version.location, "offline, upload deferred");
            }
            Err(e) => warn!(location = %version.location, "upload failed: {}", e),
        }
    }

    async fn flush(&self) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.transfer.flush_pending() => result,
        };
        match result {
            Ok(0) => {}
            Ok(n) => info!("uploaded {} pending versions", n),
            Err(e) => warn!("flush of pending versions stopped: {}", e),
        }
    }
}

async fn next_batch(watcher: &mut Option<FsWatcher>) -> Result<Vec<WatchEvent>> {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
