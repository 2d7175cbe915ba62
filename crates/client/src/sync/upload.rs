// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Chunked upload of file versions.
//!
//! Each upload announces itself with START_TRANSFER on the control stream,
//! then opens a dedicated upload stream, sends the version in order as
//! fixed-size chunks followed by a commit frame, and reads one
//! acknowledgment. Failures abort the upload; nothing is retried here. The
//! version stays pending and is picked up by the next flush.

use std::sync::Arc;

use tracing::{debug, info, warn};

use drift_core::protocol::{chunk_version, ActionResponse, UploadMessage};
use drift_core::{FileVersion, Store};

use super::session::ControlSession;
use super::transport::{
    TransportError, TransportFactory, UploadTransport, WebSocketUploadTransport,
};
use crate::error::{Error, Result};

/// Uploads versions to the remote peer.
pub struct TransferClient<U: UploadTransport = WebSocketUploadTransport> {
    session: ControlSession,
    store: Arc<dyn Store>,
    connect: TransportFactory<U>,
    url: String,
    chunk_size: usize,
}

impl<U: UploadTransport> TransferClient<U> {
    /// Creates a transfer client that uploads to `url`.
    pub fn new(
        session: ControlSession,
        store: Arc<dyn Store>,
        connect: TransportFactory<U>,
        url: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        TransferClient {
            session,
            store,
            connect,
            url: url.into(),
            chunk_size,
        }
    }

    /// Uploads one version and marks it acknowledged.
    ///
    /// Fails with [`Error::NotConnected`] when the control session has not
    /// completed its handshake.
    pub async fn upload(&self, version: &FileVersion) -> Result<()> {
        if !self.session.is_connected().await {
            return Err(Error::NotConnected);
        }
        self.session.start_transfer(&version.location).await?;

        let mut transport = (self.connect)();
        let result = self.transfer(&mut transport, version).await;
        let _ = transport.disconnect().await;
        let response = result?;

        if !response.success {
            return Err(Error::Upload {
                location: version.location.clone(),
                message: response.message,
            });
        }

        self.store.mark_uploaded(&version.id)?;
        info!(location = %version.location, version = %version.id, "uploaded");
        Ok(())
    }

    async fn transfer(
        &self,
        transport: &mut U,
        version: &FileVersion,
    ) -> Result<ActionResponse> {
        transport.connect(&self.url).await?;

        let chunks = chunk_version(version, self.session.session_id(), self.chunk_size);
        debug!(location = %version.location, "sending {} chunks", chunks.len());
        for chunk in chunks {
            transport.send(UploadMessage::Chunk(chunk)).await?;
        }
        transport.send(UploadMessage::Commit).await?;

        let response = transport
            .recv()
            .await?
            .ok_or(TransportError::ConnectionClosed)?;
        Ok(response)
    }

    /// Uploads the latest version of every file the remote has not
    /// acknowledged.
    ///
    /// Stops at the first failure. Returns the number of versions uploaded.
    pub async fn flush_pending(&self) -> Result<usize> {
        let pending = self.store.pending_uploads()?;
        if pending.is_empty() {
            return Ok(0);
        }

        debug!("flushing {} pending uploads", pending.len());
        let mut uploaded = 0;
        for version in &pending {
            if let Err(e) = self.upload(version).await {
                warn!(location = %version.location, "pending upload aborted: {}", e);
                return Err(e);
            }
            uploaded += 1;
        }
        Ok(uploaded)
    }
}
