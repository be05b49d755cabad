#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the session client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] wired to a [`MockServer`] that
//! plays the broker side of the STOMP conversation, plus fixture builders for
//! snapshot and highscore payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use snake_session_client::allocation::SessionAllocator;
use snake_session_client::event::SessionEvent;
use snake_session_client::protocol::SessionId;
use snake_session_client::reconciler::StateView;
use snake_session_client::stomp::{self, Command, Frame};
use snake_session_client::{
    PubSubConfig, SessionConfig, SessionController, SessionError, Transport,
};
use tokio::sync::mpsc;

/// How long helpers wait for something that should happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long helpers wait before concluding that nothing will happen.
pub const QUIET: Duration = Duration::from_millis(100);

// ── MockTransport ───────────────────────────────────────────────────

/// Client end of an in-memory connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|_| SessionError::SendFailure("mock server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── MockServer ──────────────────────────────────────────────────────

/// Broker end of an in-memory connection.
///
/// Frames read from the client are decoded and their `SUBSCRIBE` ids
/// recorded, so [`publish`](MockServer::publish) can address messages the way
/// a real broker does.
pub struct MockServer {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
    buffered: VecDeque<Frame>,
    subscriptions: HashMap<String, String>,
    message_seq: u64,
    pub closed: Arc<AtomicBool>,
}

impl MockServer {
    /// A connected pair whose server side already queued `CONNECTED`.
    pub fn accepting() -> (MockTransport, MockServer) {
        let (transport, server) = Self::silent();
        server.push(
            Frame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("heart-beat", "0,0")
                .encode(),
        );
        (transport, server)
    }

    /// A connected pair whose server side never answers on its own.
    pub fn silent() -> (MockTransport, MockServer) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let transport = MockTransport {
            incoming,
            outgoing,
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            to_client: Some(to_client),
            from_client,
            buffered: VecDeque::new(),
            subscriptions: HashMap::new(),
            message_seq: 0,
            closed,
        };
        (transport, server)
    }

    /// Next frame written by the client, or `None` if nothing arrives in time.
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Frame> {
        loop {
            if let Some(frame) = self.buffered.pop_front() {
                self.track(&frame);
                return Some(frame);
            }
            let text = tokio::time::timeout(wait, self.from_client.recv())
                .await
                .ok()??;
            self.buffered.extend(stomp::decode(&text).unwrap());
        }
    }

    pub async fn next_frame(&mut self) -> Frame {
        self.try_next_frame(WAIT)
            .await
            .expect("client did not write a frame in time")
    }

    /// Next frame, asserting its command.
    pub async fn expect(&mut self, command: Command) -> Frame {
        let frame = self.next_frame().await;
        assert_eq!(frame.command, command, "unexpected frame: {frame:?}");
        frame
    }

    /// Next frame, asserting it is a `SEND` to `destination`. Returns the body.
    pub async fn expect_send(&mut self, destination: &str) -> String {
        let frame = self.expect(Command::Send).await;
        assert_eq!(frame.header("destination"), Some(destination));
        frame.body
    }

    /// Assert the client writes nothing for a short while.
    pub async fn expect_silence(&mut self) {
        if let Some(frame) = self.try_next_frame(QUIET).await {
            panic!("expected no frame, got {frame:?}");
        }
    }

    /// Consume the `CONNECT` frame of the handshake.
    pub async fn expect_connect(&mut self) -> Frame {
        let frame = self.expect(Command::Connect).await;
        assert_eq!(frame.header("accept-version"), Some("1.2"));
        frame
    }

    /// Consume a join: three `SUBSCRIBE`s for `id`, then `SEND /app/join`.
    pub async fn expect_join(&mut self, id: &str) {
        for destination in [
            format!("/topic/update/{id}"),
            "/topic/newHighscore".to_string(),
            "/user/queue/getIdx".to_string(),
        ] {
            let frame = self.expect(Command::Subscribe).await;
            assert_eq!(frame.header("destination"), Some(destination.as_str()));
        }
        assert_eq!(self.expect_send("/app/join").await, id);
    }

    pub fn is_subscribed(&self, destination: &str) -> bool {
        self.subscriptions.values().any(|d| d == destination)
    }

    /// Deliver a `MESSAGE` on `destination` as a broker would.
    pub fn publish(&mut self, destination: &str, body: &str) {
        self.message_seq += 1;
        let mut frame = Frame::new(Command::Message)
            .with_header("destination", destination)
            .with_header("message-id", format!("m-{}", self.message_seq))
            .with_header("content-type", "application/json")
            .with_body(body);
        if let Some(id) = self
            .subscriptions
            .iter()
            .find(|(_, d)| d.as_str() == destination)
            .map(|(id, _)| id.clone())
        {
            frame = frame.with_header("subscription", id);
        }
        self.push(frame.encode());
    }

    /// Deliver a STOMP `ERROR` frame.
    pub fn send_error(&mut self, message: &str) {
        let frame = Frame::new(Command::Error).with_header("message", message);
        self.push(frame.encode());
    }

    /// Deliver `text` as one transport message, exactly as given.
    pub fn send_raw(&self, text: &str) {
        self.push(text.to_string());
    }

    /// Drop the server side of the connection.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    fn push(&self, text: String) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text);
        }
    }

    fn track(&mut self, frame: &Frame) {
        match frame.command {
            Command::Subscribe => {
                if let (Some(id), Some(destination)) =
                    (frame.header("id"), frame.header("destination"))
                {
                    self.subscriptions
                        .insert(id.to_string(), destination.to_string());
                }
            }
            Command::Unsubscribe => {
                if let Some(id) = frame.header("id") {
                    self.subscriptions.remove(id);
                }
            }
            _ => {}
        }
    }
}

// ── Session helpers ─────────────────────────────────────────────────

/// A controller connected to a fresh [`MockServer`], handshake consumed.
pub async fn connected_session(
    config: SessionConfig,
) -> (SessionController, mpsc::Receiver<SessionEvent>, MockServer) {
    let (transport, mut server) = MockServer::accepting();
    let (session, events) =
        SessionController::connect(transport, PubSubConfig::new("localhost"), config)
            .await
            .unwrap();
    server.expect_connect().await;
    (session, events, server)
}

/// A controller joined to session `id`, join frames consumed.
pub async fn joined_session(
    id: &str,
    config: SessionConfig,
) -> (SessionController, mpsc::Receiver<SessionEvent>, MockServer) {
    let (mut session, mut events, mut server) = connected_session(config).await;
    session.start(Some(SessionId::new(id))).await.unwrap();
    server.expect_join(id).await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Joined {
            session_id: SessionId::new(id)
        }
    );
    (session, events, server)
}

pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("no session event in time")
        .expect("session event channel closed")
}

/// Wait until the session state satisfies `predicate`.
pub async fn wait_for_state(
    session: &SessionController,
    predicate: impl Fn(&StateView) -> bool,
) -> StateView {
    let mut rx = session.watch_state();
    let view = tokio::time::timeout(WAIT, rx.wait_for(|view| predicate(view)))
        .await
        .expect("state did not reach the expected value in time")
        .expect("state channel closed");
    view.clone()
}

// ── Allocators ──────────────────────────────────────────────────────

/// Allocator that always hands out the same id and records requested sizes.
pub struct FixedAllocator {
    id: String,
    pub requests: Arc<StdMutex<Vec<(u32, u32)>>>,
}

impl FixedAllocator {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            requests: Arc::new(StdMutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl SessionAllocator for FixedAllocator {
    async fn allocate(&self, width: u32, height: u32) -> Result<SessionId, SessionError> {
        self.requests.lock().unwrap().push((width, height));
        Ok(SessionId::new(self.id.clone()))
    }
}

/// Allocator whose server is always down.
pub struct FailingAllocator;

#[async_trait]
impl SessionAllocator for FailingAllocator {
    async fn allocate(&self, _width: u32, _height: u32) -> Result<SessionId, SessionError> {
        Err(SessionError::Allocation("connection refused".into()))
    }
}

// ── JSON fixtures ───────────────────────────────────────────────────

/// Snapshot of a 20×20 board with food at `(x, y)` and one snake.
pub fn snapshot_json(food: (i32, i32), paused: bool) -> String {
    serde_json::json!({
        "id": "abc",
        "width": 20,
        "height": 20,
        "food": { "x": food.0, "y": food.1 },
        "paused": paused,
        "gameOver": false,
        "snakes": [
            { "idx": 0, "name": "p1", "length": 3, "dead": false, "paused": paused }
        ]
    })
    .to_string()
}

pub fn highscores_json(entries: &[(&str, u32)]) -> String {
    let rows: Vec<_> = entries
        .iter()
        .map(|(name, score)| serde_json::json!({ "playerName": name, "score": score }))
        .collect();
    serde_json::Value::Array(rows).to_string()
}
