//! # Loopback Session Example
//!
//! Runs a whole session against an in-process fake game server:
//!
//! 1. Implement [`Transport`] over a pair of channels
//! 2. Play the broker side with the crate's own STOMP codec
//! 3. Join, steer, pause and watch the reconciled state change
//!
//! Useful as a template for testing game front-ends without a server.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_session
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use snake_session_client::protocol::{Direction, SessionId};
use snake_session_client::stomp::{self, Command, Frame};
use snake_session_client::{
    PubSubConfig, SessionConfig, SessionController, SessionError, SessionEvent, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.tx
            .send(message)
            .map_err(|_| SessionError::SendFailure("loopback server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        // `mpsc::UnboundedReceiver::recv` is cancel-safe.
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A fake game server
// ─────────────────────────────────────────────────────────────────────

/// Just enough game to show state flowing back: the food moves with every
/// move intent and pause intents flip the paused flag.
struct FakeGame {
    food: (i32, i32),
    paused: bool,
    subscriptions: HashMap<String, String>,
    tx: mpsc::UnboundedSender<String>,
}

impl FakeGame {
    fn publish(&self, destination: &str, body: String) {
        let mut frame = Frame::new(Command::Message)
            .with_header("destination", destination)
            .with_body(body);
        if let Some((id, _)) = self.subscriptions.iter().find(|(_, d)| *d == destination) {
            frame = frame.with_header("subscription", id.clone());
        }
        let _ = self.tx.send(frame.encode());
    }

    fn broadcast_snapshot(&self, session: &str) {
        let snapshot = serde_json::json!({
            "id": session,
            "width": 10,
            "height": 10,
            "food": { "x": self.food.0, "y": self.food.1 },
            "paused": self.paused,
            "snakes": [{ "idx": 0, "name": "loopback", "length": 3, "paused": self.paused }]
        });
        self.publish(&format!("/topic/update/{session}"), snapshot.to_string());
    }

    fn handle(&mut self, frame: Frame, session: &mut Option<String>) {
        let destination = frame.header("destination").unwrap_or_default().to_string();
        match frame.command {
            Command::Connect => {
                let _ = self
                    .tx
                    .send(Frame::new(Command::Connected).with_header("version", "1.2").encode());
            }
            Command::Subscribe => {
                if let Some(id) = frame.header("id") {
                    self.subscriptions.insert(id.to_string(), destination.clone());
                }
            }
            Command::Send => match destination.as_str() {
                "/app/join" => {
                    *session = Some(frame.body.clone());
                    self.publish("/user/queue/getIdx", "0".into());
                    self.broadcast_snapshot(&frame.body);
                }
                "/app/move" => {
                    self.food = ((self.food.0 + 1) % 10, self.food.1);
                    self.paused = false;
                }
                "/app/pause" => self.paused = true,
                "/app/unpause" => self.paused = false,
                _ => {}
            },
            _ => {}
        }
        if frame.command == Command::Send && destination != "/app/join" {
            if let Some(session) = session.as_deref() {
                self.broadcast_snapshot(session);
            }
        }
    }
}

async fn run_fake_server(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut game = FakeGame {
        food: (3, 4),
        paused: false,
        subscriptions: HashMap::new(),
        tx,
    };
    let mut session = None;
    while let Some(text) = rx.recv().await {
        let Ok(frames) = stomp::decode(&text) else {
            continue;
        };
        for frame in frames {
            if frame.command == Command::Disconnect {
                return;
            }
            game.handle(frame, &mut session);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a session
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_fake_server(server_rx, server_tx));

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
    };
    let (mut session, mut events) = SessionController::connect(
        transport,
        PubSubConfig::new("loopback"),
        SessionConfig::default(),
    )
    .await?;

    let id = session.start(Some(SessionId::new("loopback-1"))).await?;
    tracing::info!("joined {id}, share with {}", id.share_url("http://localhost:8080"));

    let mut state = session.watch_state();
    state.wait_for(|view| view.snapshot.is_some()).await?;

    for (step, direction) in Direction::ALL.into_iter().enumerate().take(3) {
        session.move_to(direction)?;
        state.changed().await?;
        let view = state.borrow_and_update().clone();
        if let Some(snapshot) = &view.snapshot {
            tracing::info!(
                "after move {step} ({direction}): food at ({}, {}), identity {}",
                snapshot.food.x,
                snapshot.food.y,
                view.identity
            );
        }
    }

    session.toggle_pause()?;
    state.wait_for(|view| view.is_paused()).await?;
    tracing::info!("paused");

    // Moving while paused resumes play first.
    session.move_to(Direction::Up)?;
    state.wait_for(|view| !view.is_paused()).await?;
    tracing::info!("resumed by moving");

    session.close().await;
    while let Some(event) = events.recv().await {
        tracing::info!("session event: {event:?}");
        if matches!(event, SessionEvent::Terminated { .. }) {
            break;
        }
    }
    Ok(())
}
