// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Each connection is routed by its request path:
//! - `/control`: READY handshake, catch-up, pause/resume, keepalive pings
//!   and live NEW_FILE notifications for one session
//! - `/upload`: chunks of one version, persisted on commit and acknowledged
//!   with a single response

use std::net::SocketAddr;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use drift_core::protocol::{
    ActionResponse, ControlMessage, ControlType, UploadAssembler, UploadMessage, CONTROL_PATH,
    UPLOAD_PATH,
};

use crate::error::{Error, Result};
use crate::state::{Notification, ServerState};

type WsStream = WebSocketStream<TcpStream>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accept connections from a bound listener.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<()> {
    let mut path = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            Ok(response)
        },
    )
    .await?;

    match path.as_str() {
        CONTROL_PATH => {
            debug!("control stream from {}", peer_addr);
            ControlConnection::new(ws, peer_addr, state).serve().await
        }
        UPLOAD_PATH => {
            debug!("upload stream from {}", peer_addr);
            handle_upload(ws, peer_addr, state).await
        }
        _ => {
            let mut ws = ws;
            let _ = ws.close(None).await;
            Err(Error::UnknownPath(path))
        }
    }
}

/// One client's control stream.
struct ControlConnection {
    sink: SplitSink<WsStream, Message>,
    stream: futures_util::stream::SplitStream<WsStream>,
    peer_addr: SocketAddr,
    state: ServerState,
    /// Set by the handshake.
    session_id: Option<String>,
}

impl ControlConnection {
    fn new(ws: WsStream, peer_addr: SocketAddr, state: ServerState) -> Self {
        let (sink, stream) = ws.split();
        ControlConnection {
            sink,
            stream,
            peer_addr,
            state,
            session_id: None,
        }
    }

    async fn serve(mut self) -> Result<()> {
        let result = self.serve_inner().await;
        if let Some(session_id) = &self.session_id {
            info!(session_id = %session_id, "control stream closed");
            self.state.end_session(session_id).await?;
        }
        result
    }

    async fn serve_inner(&mut self) -> Result<()> {
        // Subscribe before the handshake so nothing stored during catch-up is missed.
        let mut broadcast_rx = self.state.subscribe();

        loop {
            tokio::select! {
                msg = self.stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_message(&text).await?,
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", self.peer_addr);
                            return Ok(());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }

                notification = broadcast_rx.recv() => {
                    match notification {
                        Ok(notification) => self.notify(notification).await?,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Client {} lagged by {} notifications", self.peer_addr, n);
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, text: &str) -> Result<()> {
        let msg = ControlMessage::from_json(text).map_err(drift_core::Error::from)?;

        let Some(session_id) = self.session_id.clone() else {
            return match msg.kind {
                ControlType::Ready => self.handshake(msg.session_id).await,
                kind => Err(unexpected(kind)),
            };
        };
        if msg.session_id != session_id {
            return Err(Error::SessionMismatch {
                expected: session_id,
                got: msg.session_id,
            });
        }

        match msg.kind {
            ControlType::Pause | ControlType::Resume => {
                let paused = msg.kind == ControlType::Pause;
                self.state.sessions().set_paused(&session_id, paused).await;
                info!(session_id = %session_id, paused, "notifications toggled");
                Ok(())
            }
            ControlType::StartTransfer => {
                info!(
                    session_id = %session_id,
                    "incoming transfer of {}",
                    msg.filename.as_deref().unwrap_or("<unnamed>")
                );
                Ok(())
            }
            ControlType::Ready => {
                debug!(session_id = %session_id, "ignoring repeated handshake");
                Ok(())
            }
            ControlType::Ping => self.send(&ControlMessage::pong(&session_id)).await,
            kind @ (ControlType::NewFile | ControlType::Pong) => Err(unexpected(kind)),
        }
    }

    /// Acknowledges READY, then replays versions newer than the session cursor.
    async fn handshake(&mut self, session_id: String) -> Result<()> {
        self.state.sessions().register(&session_id).await;
        self.session_id = Some(session_id.clone());
        let connected = self.state.sessions().count().await;
        info!(
            session_id = %session_id,
            "session ready from {} ({} connected)",
            self.peer_addr,
            connected
        );

        self.send(&ControlMessage::ready(&session_id)).await?;

        let versions = self.state.catch_up(&session_id)?;
        for version in &versions {
            self.send(&ControlMessage::new_file(&session_id, &version.location))
                .await?;
        }
        self.state.finish_catch_up(&session_id)?;
        debug!(session_id = %session_id, "caught up {} files", versions.len());
        Ok(())
    }

    async fn notify(&mut self, notification: Notification) -> Result<()> {
        let Some(session_id) = self.session_id.clone() else {
            return Ok(());
        };
        if notification.origin == session_id
            || self.state.sessions().is_paused(&session_id).await
        {
            return Ok(());
        }
        self.send(&ControlMessage::new_file(&session_id, notification.filename))
            .await
    }

    async fn send(&mut self, msg: &ControlMessage) -> Result<()> {
        let json = msg.to_json().map_err(drift_core::Error::from)?;
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

fn unexpected(kind: ControlType) -> Error {
    drift_core::Error::InvalidMessageType(format!("{:?}", kind)).into()
}

/// Receives one upload: chunks in order, then a commit frame.
///
/// Nothing is persisted unless the commit arrives.
async fn handle_upload(ws: WsStream, peer_addr: SocketAddr, state: ServerState) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    let mut assembler = UploadAssembler::new();

    let response = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                debug!(
                    "upload from {} ended after {} chunks without commit",
                    peer_addr,
                    assembler.chunks()
                );
                return Ok(());
            }
            Some(Ok(Message::Ping(data))) => {
                sink.send(Message::Pong(data)).await?;
                continue;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        let received = UploadMessage::from_json(&text)
            .map_err(drift_core::Error::from)
            .and_then(|msg| match msg {
                UploadMessage::Chunk(chunk) => assembler.push(chunk).map(|()| false),
                UploadMessage::Commit => Ok(true),
            });
        match received {
            Ok(false) => {}
            Ok(true) => break commit(assembler, &state),
            Err(e) => {
                warn!("rejecting upload from {}: {}", peer_addr, e);
                break ActionResponse::failed(e.to_string());
            }
        }
    };

    let json = response.to_json().map_err(drift_core::Error::from)?;
    sink.send(Message::Text(json.into())).await?;
    let _ = sink.close().await;
    Ok(())
}

fn commit(assembler: UploadAssembler, state: &ServerState) -> ActionResponse {
    let stored = assembler
        .finish()
        .and_then(|version| Ok((state.store_upload(&version)?, version)));
    match stored {
        Ok((true, version)) => {
            info!(
                location = %version.location,
                version = %version.id,
                "stored version from {}",
                version.client
            );
            ActionResponse::ok("stored")
        }
        Ok((false, version)) => {
            debug!(version = %version.id, "duplicate upload");
            ActionResponse::ok("already stored")
        }
        Err(e) => {
            warn!("upload not stored: {}", e);
            ActionResponse::failed(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
