// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Test server utilities.
//!
//! Provides a TestServer that runs on a random port, plus small WebSocket
//! client helpers for driving the control and upload streams.

#![cfg(test)]
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use drift_core::protocol::{ActionResponse, ControlMessage, UploadMessage};

use crate::server;
use crate::state::ServerState;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A test server that runs on a random port.
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: ServerState,
    /// Keep the temp directory alive for the lifetime of the test server.
    _temp_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a new test server on a random available port.
    pub async fn start() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(temp_dir.path()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state_clone = state.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = server::serve(listener, state_clone) => {
                    if let Err(e) = result {
                        eprintln!("Test server error: {}", e);
                    }
                }
                _ = shutdown_rx => {}
            }
        });

        TestServer {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Server state for verification.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub async fn connect(&self, path: &str) -> Client {
        let (ws, _) = connect_async(self.url(path)).await.unwrap();
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_text(ws: &mut Client, text: String) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

pub async fn send_control(ws: &mut Client, msg: &ControlMessage) {
    send_text(ws, msg.to_json().unwrap()).await;
}

pub async fn send_upload(ws: &mut Client, msg: &UploadMessage) {
    send_text(ws, msg.to_json().unwrap()).await;
}

/// Next text frame, or `None` once the server closes the stream.
pub async fn next_text(ws: &mut Client) -> Option<String> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for server")
}

pub async fn recv_control(ws: &mut Client) -> ControlMessage {
    let text = next_text(ws).await.expect("stream closed");
    ControlMessage::from_json(&text).unwrap()
}

/// Whether no control message arrives within `wait`.
pub async fn stays_quiet(ws: &mut Client, wait: Duration) -> bool {
    tokio::time::timeout(wait, ws.next()).await.is_err()
}

/// Completes the READY handshake for `session_id`.
pub async fn handshake(server: &TestServer, session_id: &str) -> Client {
    let mut ws = server.connect("/control").await;
    send_control(&mut ws, &ControlMessage::ready(session_id)).await;
    assert_eq!(recv_control(&mut ws).await, ControlMessage::ready(session_id));
    ws
}

/// Sends `frames` on a fresh upload stream and returns the response, if any.
pub async fn upload(server: &TestServer, frames: &[UploadMessage]) -> Option<ActionResponse> {
    let mut ws = server.connect("/upload").await;
    for frame in frames {
        send_upload(&mut ws, frame).await;
    }
    let text = next_text(&mut ws).await?;
    Some(ActionResponse::from_json(&text).unwrap())
}
