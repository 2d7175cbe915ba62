// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for WebSocket communication.
//!
//! Provides trait-based transports for the two logical streams:
//! - [`Transport`]: the long-lived control stream
//! - [`UploadTransport`]: the one-shot upload stream
//!
//! Real WebSocket implementations are used in production, mocks in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use drift_core::protocol::{ActionResponse, ControlMessage, UploadMessage};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Creates a fresh, unconnected transport for each attempt.
pub type TransportFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Transport for the control stream.
///
/// This trait abstracts over the actual transport mechanism, allowing
/// for easy testing with mock implementations.
pub trait Transport: Send + Sync {
    /// Connect to a remote server.
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    /// Disconnect from the server.
    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    /// Send a control message to the server.
    fn send(&mut self, msg: ControlMessage) -> TransportFuture<'_, ()>;

    /// Receive a control message from the server.
    ///
    /// Returns `None` if the connection is closed.
    fn recv(&mut self) -> TransportFuture<'_, Option<ControlMessage>>;
}

/// Transport for a one-shot upload stream.
pub trait UploadTransport: Send + Sync {
    /// Open the upload stream.
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    /// Send one upload frame.
    fn send(&mut self, msg: UploadMessage) -> TransportFuture<'_, ()>;

    /// Wait for the terminal acknowledgment.
    ///
    /// Returns `None` if the server closed without answering.
    fn recv(&mut self) -> TransportFuture<'_, Option<ActionResponse>>;

    /// Close the stream.
    fn disconnect(&mut self) -> TransportFuture<'_, ()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

/// JSON-over-WebSocket plumbing shared by both transports.
#[derive(Default)]
struct JsonSocket {
    /// The WebSocket connection, if connected.
    ws: Option<WebSocketConnection>,
}

impl JsonSocket {
    async fn connect(&mut self, url: &str) -> TransportResult<()> {
        use futures_util::StreamExt;

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        self.ws = Some(WebSocketConnection { sink, stream });
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        use futures_util::SinkExt;

        if let Some(mut ws) = self.ws.take() {
            let _ = ws.sink.close().await;
        }
        Ok(())
    }

    async fn send<T: Serialize>(&mut self, msg: &T) -> TransportResult<()> {
        use futures_util::SinkExt;

        let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

        let json = serde_json::to_string(msg)
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;

        if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
            // Connection is broken, clear it
            self.ws = None;
            return Err(TransportError::SendFailed(e.to_string()));
        }

        // Flush to ensure the data is actually sent and we detect connection failures
        if let Err(e) = ws.sink.flush().await {
            self.ws = None;
            return Err(TransportError::SendFailed(e.to_string()));
        }

        Ok(())
    }

    async fn recv<T: DeserializeOwned>(&mut self) -> TransportResult<Option<T>> {
        use futures_util::StreamExt;

        let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

        loop {
            match ws.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: T = serde_json::from_str(&text)
                        .map_err(|e| TransportError::SerializationError(e.to_string()))?;
                    return Ok(Some(msg));
                }
                Some(Ok(Message::Close(_))) | None => {
                    // Connection closed, clear it
                    self.ws = None;
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Ignore ping/pong and binary frames
                    continue;
                }
                Some(Err(e)) => {
                    // Connection is broken, clear it
                    self.ws = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }
}

/// Control stream transport using tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketTransport {
    socket: JsonSocket,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move { self.socket.connect(&url).await })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(self.socket.disconnect())
    }

    fn send(&mut self, msg: ControlMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.socket.send(&msg).await })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ControlMessage>> {
        Box::pin(self.socket.recv())
    }
}

/// Upload stream transport using tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketUploadTransport {
    socket: JsonSocket,
}

impl WebSocketUploadTransport {
    /// Create a new upload transport.
    pub fn new() -> Self {
        Self::default()
    }
}

impl UploadTransport for WebSocketUploadTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move { self.socket.connect(&url).await })
    }

    fn send(&mut self, msg: UploadMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.socket.send(&msg).await })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ActionResponse>> {
        Box::pin(self.socket.recv())
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(self.socket.disconnect())
    }
}
