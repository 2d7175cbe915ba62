// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the control session state machine.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use drift_core::protocol::{ControlMessage, ControlType};

use super::session::{ControlSession, SessionEvent, SessionState};
use super::transport_tests::MockControlServer;
use crate::error::Error;

const INTERVAL: Duration = Duration::from_millis(50);
const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    session: ControlSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn spawn_session(server: &MockControlServer) -> Harness {
    let (session, events) = ControlSession::new("client-1", "ws://mock/control");
    let cancel = CancellationToken::new();
    let task = tokio::spawn(session.clone().run(server.factory(), INTERVAL, cancel.clone()));
    Harness {
        session,
        events,
        cancel,
        task,
    }
}

async fn wait_for_state(session: &ControlSession, want: SessionState) {
    tokio::time::timeout(TIMEOUT, async {
        while session.state().await != want {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session never reached {}", want));
}

async fn wait_for_connections(server: &MockControlServer, count: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while server.connections() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {} connections", count));
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_handshake_reaches_ready() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);

    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);
    assert_eq!(h.session.state().await, SessionState::Ready);
    assert!(h.session.is_connected().await);
    assert_eq!(server.received()[0], ControlMessage::ready("client-1"));

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_handshake_without_ready_times_out() {
    let server = MockControlServer::new();
    let h = spawn_session(&server);

    wait_for_state(&h.session, SessionState::Connecting).await;
    assert!(!h.session.is_connected().await);

    // Each silent attempt is abandoned and a fresh stream opened.
    wait_for_connections(&server, 3).await;
    assert!(h.session.attempts().await >= 3);
    assert!(!h.session.is_connected().await);
    assert_eq!(server.received_of(ControlType::Ping).len(), 0);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_pings_keep_idle_stream_open() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    tokio::time::sleep(INTERVAL * 6).await;
    assert_eq!(h.session.state().await, SessionState::Ready);
    assert_eq!(server.connections(), 1);
    assert!(server.received_of(ControlType::Ping).len() >= 2);
    assert_eq!(
        server.received_of(ControlType::Ping)[0],
        ControlMessage::ping("client-1")
    );

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_silent_remote_is_dropped() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    // The stream stays open but nothing answers any more.
    server.set_auto_ready(false);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Disconnected);
    wait_for_connections(&server, 2).await;

    // Once the remote answers again the session recovers.
    server.set_auto_ready(true);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_stream_closed() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    server.close_latest();
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Disconnected);

    // A new attempt within one interval (plus scheduling slack).
    tokio::time::timeout(INTERVAL * 10, next_event(&mut h.events))
        .await
        .map(|event| assert_eq!(event, SessionEvent::Ready))
        .expect("no reconnect within the interval");
    assert_eq!(server.connections(), 2);
    assert_eq!(server.received_of(ControlType::Ready).len(), 2);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_closed_mid_handshake_retries() {
    let server = MockControlServer::new();
    let h = spawn_session(&server);
    wait_for_connections(&server, 1).await;
    wait_for_state(&h.session, SessionState::Connecting).await;

    server.close_latest();
    wait_for_state(&h.session, SessionState::Disconnected).await;
    assert!(!h.session.is_connected().await);

    tokio::time::timeout(INTERVAL * 10, wait_for_connections(&server, 2))
        .await
        .expect("no reconnect within the interval");

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_refused_connections_keep_retrying() {
    let server = MockControlServer::new();
    server.set_refuse(true);
    let h = spawn_session(&server);

    tokio::time::timeout(TIMEOUT, async {
        while h.session.attempts().await < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(h.session.state().await, SessionState::Disconnected);
    assert_eq!(server.connections(), 0);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_pause_and_resume() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    h.session.pause().await.unwrap();
    assert_eq!(h.session.state().await, SessionState::Paused);
    assert!(h.session.is_connected().await);

    // Pausing twice is a no-op.
    h.session.pause().await.unwrap();

    h.session.resume().await.unwrap();
    assert_eq!(h.session.state().await, SessionState::Ready);

    tokio::time::timeout(TIMEOUT, async {
        while server.received_of(ControlType::Resume).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        server.received_of(ControlType::Pause),
        vec![ControlMessage::pause("client-1")]
    );

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_operations_require_connection() {
    let (session, _events) = ControlSession::new("client-1", "ws://mock/control");
    assert_eq!(session.state().await, SessionState::Disconnected);
    assert!(matches!(session.pause().await, Err(Error::NotConnected)));
    assert!(matches!(session.resume().await, Err(Error::NotConnected)));
    assert!(matches!(
        session.start_transfer("a.md").await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn test_start_transfer_is_sent_on_control_stream() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    h.session.start_transfer("notes/a.md").await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while server.received_of(ControlType::StartTransfer).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        server.received_of(ControlType::StartTransfer)[0],
        ControlMessage::start_transfer("client-1", "notes/a.md")
    );

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_new_file_is_surfaced() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    server.push(ControlMessage::new_file("client-1", "notes/b.md"));
    assert_eq!(
        next_event(&mut h.events).await,
        SessionEvent::NewFile("notes/b.md".to_string())
    );
    assert_eq!(h.session.state().await, SessionState::Ready);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_unexpected_message_fails_stream() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    server.push(ControlMessage::start_transfer("client-1", "a.md"));
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Disconnected);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);
    assert_eq!(server.connections(), 2);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_message_for_other_session_fails_stream() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    server.push(ControlMessage::new_file("someone-else", "a.md"));
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Disconnected);

    h.cancel.cancel();
    h.task.await.unwrap();
}

#[tokio::test]
async fn test_cancel_stops_run_and_disconnects() {
    let server = MockControlServer::auto_ready();
    let mut h = spawn_session(&server);
    assert_eq!(next_event(&mut h.events).await, SessionEvent::Ready);

    h.cancel.cancel();
    tokio::time::timeout(TIMEOUT, h.task)
        .await
        .expect("run did not observe cancellation")
        .unwrap();
    assert_eq!(h.session.state().await, SessionState::Disconnected);
    assert!(matches!(
        h.session.start_transfer("a.md").await,
        Err(Error::NotConnected)
    ));
}

#[test]
fn test_state_display() {
    assert_eq!(SessionState::Paused.to_string(), "paused");
    assert!(SessionState::Ready.is_connected());
    assert!(!SessionState::Connecting.is_connected());
}
