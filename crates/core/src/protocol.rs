// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! Two logical streams share the remote endpoint:
//! - the control stream (`/control`) carries [`ControlMessage`]s both ways
//! - the upload stream (`/upload`) carries [`UploadMessage`]s from client to
//!   server and ends with a single [`ActionResponse`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::FileVersion;

/// Default size of one upload chunk in bytes.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Request path of the control stream.
pub const CONTROL_PATH: &str = "/control";

/// Request path of the upload stream.
pub const UPLOAD_PATH: &str = "/upload";

/// Kind of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    /// Handshake from the client, acknowledgment from the server.
    Ready,
    /// The client is about to upload `filename`.
    StartTransfer,
    /// Withhold file-availability notifications for this session.
    Pause,
    /// Resume file-availability notifications.
    Resume,
    /// A newer version of `filename` is available on the server.
    NewFile,
    /// Keepalive from the client.
    Ping,
    /// Server reply to a ping.
    Pong,
}

/// A message on the control stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: ControlType,
    /// Present for `start_transfer` and `new_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ControlMessage {
    fn new(session_id: impl Into<String>, kind: ControlType) -> Self {
        ControlMessage {
            session_id: session_id.into(),
            kind,
            filename: None,
        }
    }

    /// Creates a Ready message.
    pub fn ready(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ControlType::Ready)
    }

    /// Creates a StartTransfer message.
    pub fn start_transfer(session_id: impl Into<String>, filename: impl Into<String>) -> Self {
        ControlMessage {
            filename: Some(filename.into()),
            ..Self::new(session_id, ControlType::StartTransfer)
        }
    }

    /// Creates a Pause message.
    pub fn pause(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ControlType::Pause)
    }

    /// Creates a Resume message.
    pub fn resume(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ControlType::Resume)
    }

    /// Creates a NewFile message.
    pub fn new_file(session_id: impl Into<String>, filename: impl Into<String>) -> Self {
        ControlMessage {
            filename: Some(filename.into()),
            ..Self::new(session_id, ControlType::NewFile)
        }
    }

    /// Creates a Ping message.
    pub fn ping(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ControlType::Ping)
    }

    /// Creates a Pong message.
    pub fn pong(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ControlType::Pong)
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One chunk of a version's content on the upload stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChunk {
    /// Version identifier.
    pub id: String,
    pub location: String,
    pub file_id: String,
    /// Session identity of the uploading client.
    pub client: String,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Length of this chunk in bytes.
    pub offset: u64,
}

/// Messages sent from client to server on the upload stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadMessage {
    /// The next chunk, in order.
    Chunk(VersionChunk),
    /// No more chunks follow; the server answers with an [`ActionResponse`].
    Commit,
}

impl UploadMessage {
    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Terminal acknowledgment of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    /// Creates a successful response.
    pub fn ok(message: impl Into<String>) -> Self {
        ActionResponse {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failed response.
    pub fn failed(message: impl Into<String>) -> Self {
        ActionResponse {
            success: false,
            message: message.into(),
        }
    }

    /// Serializes the response to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the response from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Splits a version into ordered upload chunks of at most `chunk_size` bytes.
///
/// Produces `ceil(len / chunk_size)` chunks, or a single empty chunk for
/// empty content so the upload still announces the version.
pub fn chunk_version(version: &FileVersion, client: &str, chunk_size: usize) -> Vec<VersionChunk> {
    let make = |bytes: &[u8]| VersionChunk {
        id: version.id.clone(),
        location: version.location.clone(),
        file_id: version.file_id.clone(),
        client: client.to_string(),
        timestamp: version.timestamp,
        content: bytes.to_vec(),
        offset: bytes.len() as u64,
    };

    let bytes = version.content.as_bytes();
    if bytes.is_empty() {
        return vec![make(bytes)];
    }
    bytes.chunks(chunk_size.max(1)).map(make).collect()
}

/// Reassembles the chunks of one upload, in arrival order.
#[derive(Debug, Default)]
pub struct UploadAssembler {
    first: Option<VersionChunk>,
    content: Vec<u8>,
    chunks: usize,
}

impl UploadAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks accepted so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Appends the next chunk.
    ///
    /// Every chunk must belong to the same version as the first one, and its
    /// `offset` must match its length.
    pub fn push(&mut self, chunk: VersionChunk) -> Result<()> {
        if chunk.offset != chunk.content.len() as u64 {
            return Err(Error::InvalidUpload(format!(
                "chunk {} of {} declares {} bytes but carries {}",
                self.chunks,
                chunk.location,
                chunk.offset,
                chunk.content.len()
            )));
        }

        if let Some(first) = &self.first {
            if first.id != chunk.id || first.file_id != chunk.file_id {
                return Err(Error::InvalidUpload(format!(
                    "chunk for version {} inside upload of version {}",
                    chunk.id, first.id
                )));
            }
        }

        self.content.extend_from_slice(&chunk.content);
        if self.first.is_none() {
            // Metadata comes from the first chunk; its bytes live in `content`.
            self.first = Some(VersionChunk {
                content: Vec::new(),
                ..chunk
            });
        }

        self.chunks += 1;
        Ok(())
    }

    /// Completes the upload, yielding the assembled version.
    pub fn finish(self) -> Result<FileVersion> {
        let first = self
            .first
            .ok_or_else(|| Error::InvalidUpload("no chunks received".to_string()))?;
        let content = String::from_utf8(self.content).map_err(|_| {
            Error::InvalidUpload(format!("content of {} is not valid UTF-8", first.location))
        })?;

        Ok(FileVersion {
            id: first.id,
            file_id: first.file_id,
            location: first.location,
            content,
            timestamp: first.timestamp,
            client: first.client,
        })
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
