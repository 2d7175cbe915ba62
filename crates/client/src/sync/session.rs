// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Control session state machine.
//!
//! ```text
//! DISCONNECTED ──tick──► CONNECTING ──READY──► READY ◄──pause/resume──► PAUSED
//!       ▲                     │                  │                        │
//!       └─────────────────────┴──── stream error ┴────────────────────────┘
//! ```
//!
//! The state and the handle of the active control stream live behind one
//! [`RwLock`]. A single task ([`ControlSession::run`]) owns the transport:
//! it reconnects on a fixed interval while disconnected and, once
//! connected, multiplexes inbound messages with outbound messages queued by
//! [`ControlSession::send`].
//!
//! The same interval bounds silence from the remote. A stream that has not
//! answered READY within one interval, or has not been heard from for two
//! intervals once connected, is treated as failed. Connected streams are
//! pinged every interval.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drift_core::protocol::{ControlMessage, ControlType};

use super::transport::{Transport, TransportError, TransportFactory};
use crate::error::{Error, Result};

/// Lower bound for the reconnection interval; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// State of the control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No control stream.
    Disconnected,
    /// Stream open, handshake sent, waiting for READY.
    Connecting,
    /// Handshake acknowledged.
    Ready,
    /// Connected, with notifications withheld by the remote.
    Paused,
}

impl SessionState {
    /// Whether the handshake has completed on the current stream.
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Paused)
    }

    /// Returns the string representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Paused => "paused",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted to the owner of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake completed on a new stream.
    Ready,
    /// The remote has a newer version of this location.
    NewFile(String),
    /// A connected stream was lost.
    Disconnected,
}

struct Shared {
    state: SessionState,
    /// Queue into the active control stream, if any.
    outbound: Option<mpsc::UnboundedSender<ControlMessage>>,
    attempts: u32,
}

struct SessionInner {
    session_id: String,
    url: String,
    shared: RwLock<Shared>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Handle to the control session. Cheap to clone.
#[derive(Clone)]
pub struct ControlSession {
    inner: Arc<SessionInner>,
}

/// Outcome of one wait on the active stream.
enum Step {
    Shutdown,
    Outbound(ControlMessage),
    Inbound(Option<ControlMessage>),
    Keepalive,
}

impl ControlSession {
    /// Creates a disconnected session.
    ///
    /// Returns the session and the receiver for its events.
    pub fn new(
        session_id: impl Into<String>,
        url: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = ControlSession {
            inner: Arc::new(SessionInner {
                session_id: session_id.into(),
                url: url.into(),
                shared: RwLock::new(Shared {
                    state: SessionState::Disconnected,
                    outbound: None,
                    attempts: 0,
                }),
                events,
            }),
        };
        (session, events_rx)
    }

    /// The stable identity sent in every control message.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Current state.
    pub async fn state(&self) -> SessionState {
        self.inner.shared.read().await.state
    }

    /// Whether the handshake has completed on the current stream.
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// Number of connection attempts made so far.
    pub async fn attempts(&self) -> u32 {
        self.inner.shared.read().await.attempts
    }

    /// Queues a message on the active control stream.
    pub async fn send(&self, msg: ControlMessage) -> Result<()> {
        let shared = self.inner.shared.read().await;
        let outbound = shared.outbound.as_ref().ok_or(Error::NotConnected)?;
        outbound.send(msg).map_err(|_| Error::NotConnected)
    }

    /// Announces an upload of `filename`.
    pub async fn start_transfer(&self, filename: &str) -> Result<()> {
        self.send(ControlMessage::start_transfer(self.session_id(), filename))
            .await
    }

    /// Asks the remote to withhold notifications.
    pub async fn pause(&self) -> Result<()> {
        self.toggle(SessionState::Ready, SessionState::Paused).await
    }

    /// Asks the remote to resume notifications.
    pub async fn resume(&self) -> Result<()> {
        self.toggle(SessionState::Paused, SessionState::Ready).await
    }

    async fn toggle(&self, from: SessionState, to: SessionState) -> Result<()> {
        let mut shared = self.inner.shared.write().await;
        if shared.state == to {
            return Ok(());
        }
        if shared.state != from {
            return Err(Error::NotConnected);
        }

        let msg = match to {
            SessionState::Paused => ControlMessage::pause(self.session_id()),
            _ => ControlMessage::resume(self.session_id()),
        };
        let outbound = shared.outbound.as_ref().ok_or(Error::NotConnected)?;
        outbound.send(msg).map_err(|_| Error::NotConnected)?;

        shared.state = to;
        info!(session_id = %self.session_id(), "control session {}", to);
        Ok(())
    }

    /// Runs the reconnection loop until `cancel` fires.
    ///
    /// Each tick while disconnected opens a fresh transport from `connect`
    /// and keeps it until the stream fails. The first attempt is immediate.
    pub async fn run<T: Transport>(
        self,
        connect: TransportFactory<T>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut transport = connect();
            let result = self.attempt(&mut transport, interval.max(MIN_INTERVAL), &cancel).await;
            self.teardown().await;

            match result {
                Ok(()) => break,
                Err(e) => {
                    warn!(session_id = %self.session_id(), "control stream failed: {}", e);
                }
            }

            // Next attempt one full interval after this one ended.
            ticker.reset();
        }

        info!(session_id = %self.session_id(), "control session stopped");
    }

    /// Connects, handshakes and serves one control stream.
    ///
    /// Returns `Ok` only on cancellation.
    async fn attempt<T: Transport>(
        &self,
        transport: &mut T,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut shared = self.inner.shared.write().await;
            shared.state = SessionState::Connecting;
            shared.outbound = None;
            shared.attempts = shared.attempts.saturating_add(1);
            debug!(
                session_id = %self.session_id(),
                "connecting to {} (attempt {})",
                self.inner.url,
                shared.attempts
            );
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(interval, transport.connect(&self.inner.url)) => {
                result.map_err(|_| Error::RemoteSilent(interval))??
            }
        }
        transport
            .send(ControlMessage::ready(self.session_id()))
            .await?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        self.inner.shared.write().await.outbound = Some(outbound);

        let started = Instant::now();
        let mut last_heard = started;
        let mut keepalive = tokio::time::interval_at(started + interval, interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Shutdown,
                Some(msg) = outbound_rx.recv() => Step::Outbound(msg),
                received = transport.recv() => Step::Inbound(received?),
                _ = keepalive.tick() => Step::Keepalive,
            };

            match step {
                Step::Shutdown => {
                    let _ = transport.disconnect().await;
                    return Ok(());
                }
                Step::Outbound(msg) => transport.send(msg).await?,
                Step::Inbound(Some(msg)) => {
                    last_heard = Instant::now();
                    self.handle(msg).await?;
                }
                Step::Inbound(None) => return Err(TransportError::ConnectionClosed.into()),
                Step::Keepalive => {
                    // Still waiting for READY one interval after connecting.
                    if !self.state().await.is_connected() {
                        return Err(Error::RemoteSilent(started.elapsed()));
                    }
                    let silent = last_heard.elapsed();
                    if silent >= interval * 2 {
                        return Err(Error::RemoteSilent(silent));
                    }
                    transport
                        .send(ControlMessage::ping(self.session_id()))
                        .await?;
                }
            }
        }
    }

    async fn handle(&self, msg: ControlMessage) -> Result<()> {
        if msg.session_id != self.session_id() {
            return Err(Error::UnexpectedMessage(format!(
                "message for session {}",
                msg.session_id
            )));
        }

        match (msg.kind, msg.filename) {
            (ControlType::Ready, _) => {
                let mut shared = self.inner.shared.write().await;
                if shared.state == SessionState::Connecting {
                    shared.state = SessionState::Ready;
                    drop(shared);
                    info!(session_id = %self.session_id(), "control session ready");
                    self.emit(SessionEvent::Ready);
                } else {
                    debug!("ignoring repeated ready while {}", shared.state);
                }
                Ok(())
            }
            (ControlType::Pong, _) => Ok(()),
            (ControlType::NewFile, Some(filename)) => {
                info!(session_id = %self.session_id(), "remote has a newer version of {}", filename);
                self.emit(SessionEvent::NewFile(filename));
                Ok(())
            }
            (kind, _) => Err(Error::UnexpectedMessage(format!("{:?}", kind))),
        }
    }

    async fn teardown(&self) {
        let was_connected = {
            let mut shared = self.inner.shared.write().await;
            let was_connected = shared.state.is_connected();
            shared.state = SessionState::Disconnected;
            shared.outbound = None;
            was_connected
        };
        if was_connected {
            self.emit(SessionEvent::Disconnected);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may have stopped listening during shutdown.
        let _ = self.inner.events.send(event);
    }
}
