//! # Snake Session Client
//!
//! Client-side session layer for a multiplayer snake game served over STOMP.
//!
//! The server is authoritative: it broadcasts complete game snapshots on a
//! per-session topic and accepts intents (join, move, pause, ...) on
//! application destinations. This crate keeps the local view of one session
//! consistent with that stream and turns player input into intents.
//!
//! ## Layers
//!
//! - [`transport`]: any bidirectional text channel ([`Transport`])
//! - [`stomp`] and [`pubsub`]: STOMP 1.2 frames and a background adapter
//!   that multiplexes subscriptions over one connection
//! - [`router`]: per-topic fan-out of inbound frames
//! - [`reconciler`]: last-known-good snapshot, identity and highscores
//! - [`session`]: lifecycle, intents and teardown ([`SessionController`])
//! - [`allocation`], [`input`], [`autopilot`]: session creation, key mapping
//!   and the automated-player seam
//!
//! ## Features
//!
//! - `transport-websocket` (default): [`WebSocketTransport`] built on
//!   `tokio-tungstenite`
//! - `allocation-http` (default): [`HttpSessionAllocator`](allocation::HttpSessionAllocator)
//!   built on `reqwest`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use snake_session_client::allocation::HttpSessionAllocator;
//! use snake_session_client::{PubSubConfig, SessionConfig, SessionController, WebSocketTransport};
//!
//! let transport = WebSocketTransport::connect("ws://localhost:8080/snake").await?;
//! let (session, mut events) =
//!     SessionController::connect(transport, PubSubConfig::new("localhost"), SessionConfig::default()).await?;
//! let mut session = session.with_allocator(Arc::new(HttpSessionAllocator::new("http://localhost:8080/api")));
//!
//! let id = session.start(None).await?;
//! println!("share: {}", id.share_url("http://localhost:8080"));
//! session.handle_key("ArrowLeft")?;
//! session.close().await;
//! ```

pub mod allocation;
pub mod autopilot;
pub mod error;
pub mod event;
pub mod input;
pub mod protocol;
pub mod pubsub;
pub mod reconciler;
pub mod router;
pub mod session;
pub mod stomp;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use allocation::SessionAllocator;
pub use autopilot::Autopilot;
pub use error::SessionError;
pub use event::{SessionEvent, TransportEvent};
pub use protocol::{Direction, GameSnapshot, Intent, PlayerIdentity, SessionId, Topic};
pub use pubsub::{PubSubClient, PubSubConfig};
pub use reconciler::StateView;
pub use session::{SessionConfig, SessionController, SessionPhase};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
