//! # Terminal Player Example
//!
//! Plays a live game from the terminal:
//!
//! 1. Connect to the game server's STOMP endpoint over WebSocket
//! 2. Allocate a fresh session over HTTP, or join the one in `SNAKE_SESSION_ID`
//! 3. Render every snapshot as text
//! 4. Steer with `w`/`a`/`s`/`d`, `p` to (un)pause, `r` to reset, `q` to quit
//!
//! With `SNAKE_AUTOPILOT=1` a greedy autopilot steers instead.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example terminal_player
//!
//! SNAKE_WS_URL=ws://my-server:8080/websocket \
//! SNAKE_API_URL=http://my-server:8080/api \
//! SNAKE_SESSION_ID=abc SNAKE_PLAYER_NAME=ferris \
//!     cargo run --example terminal_player
//! ```

use std::sync::Arc;
use std::time::Duration;

use snake_session_client::allocation::HttpSessionAllocator;
use snake_session_client::protocol::{Direction, GameSnapshot, SessionId};
use snake_session_client::reconciler::StateView;
use snake_session_client::{
    PubSubConfig, SessionConfig, SessionController, SessionEvent, WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_WS_URL: &str = "ws://localhost:8080/websocket";
const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const AUTOPILOT_TICK: Duration = Duration::from_millis(150);

/// Toy autopilot: heads for the quarter of the board the food is in.
fn greedy(snapshot: &GameSnapshot) -> Direction {
    let half_width = i64::from(snapshot.width.get() / 2);
    let half_height = i64::from(snapshot.height.get() / 2);
    let dx = i64::from(snapshot.food.x) - half_width;
    let dy = i64::from(snapshot.food.y) - half_height;
    match (dx.abs() >= dy.abs(), dx >= 0, dy >= 0) {
        (true, true, _) => Direction::Right,
        (true, false, _) => Direction::Left,
        (false, _, true) => Direction::Down,
        (false, _, false) => Direction::Up,
    }
}

fn key_code(line: &str) -> Option<&'static str> {
    match line.trim() {
        "w" => Some("KeyW"),
        "a" => Some("KeyA"),
        "s" => Some("KeyS"),
        "d" => Some("KeyD"),
        "p" => Some("KeyP"),
        "r" => Some("KeyR"),
        _ => None,
    }
}

fn render(view: &StateView) {
    let Some(snapshot) = &view.snapshot else {
        return;
    };
    let food = (i64::from(snapshot.food.x), i64::from(snapshot.food.y));
    let mut board = String::new();
    for y in 0..snapshot.height.get() {
        for x in 0..snapshot.width.get() {
            let here = food == (i64::from(x), i64::from(y));
            board.push(if here { '*' } else { '.' });
        }
        board.push('\n');
    }
    println!("{board}");
    for score in snapshot.scores() {
        let marker = if score.idx == view.identity.0 { ">" } else { " " };
        println!("{marker} {:<12} {}", score.name, score.score);
    }
    if snapshot.paused {
        println!("-- paused --");
    }
    if snapshot.game_over {
        println!("-- game over, press r --");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let ws_url = std::env::var("SNAKE_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
    let api_url = std::env::var("SNAKE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let session_id = std::env::var("SNAKE_SESSION_ID").ok().map(SessionId::new);
    let player_name = std::env::var("SNAKE_PLAYER_NAME").ok();
    let autopilot = std::env::var("SNAKE_AUTOPILOT").is_ok_and(|v| v == "1");

    let host = ws_url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split(['/', ':']).next())
        .unwrap_or("localhost")
        .to_string();

    // ── Connect and join ────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&ws_url).await?;
    let (session, mut events) =
        SessionController::connect(transport, PubSubConfig::new(host), SessionConfig::default())
            .await?;
    let mut session = session.with_allocator(Arc::new(HttpSessionAllocator::new(api_url)));

    let id = session.start(session_id).await?;
    println!("joined session {id}");
    if let Some(name) = player_name {
        session.set_name(name)?;
    }

    let mut state = session.watch_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(AUTOPILOT_TICK);

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&state.borrow_and_update());
            }

            event = events.recv() => {
                match event {
                    Some(SessionEvent::Terminated { reason }) => {
                        println!("session ended: {}", reason.unwrap_or_else(|| "server closed".into()));
                        break;
                    }
                    None => {
                        println!("session ended: server closed");
                        break;
                    }
                    Some(SessionEvent::DecodeFailed { topic, message }) => {
                        tracing::warn!("bad payload on {topic}: {message}");
                    }
                    Some(other) => tracing::info!("{other:?}"),
                }
            }

            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if line.trim() == "q" {
                    break;
                }
                if let Some(code) = key_code(&line) {
                    if let Err(e) = session.handle_key(code) {
                        tracing::warn!("{e}");
                    }
                }
            }

            _ = ticker.tick(), if autopilot => {
                if let Err(e) = session.autopilot_step(&greedy) {
                    tracing::warn!("{e}");
                }
            }
        }
    }

    session.close().await;
    Ok(())
}
