//! Byte-level transport abstraction underneath the STOMP adapter.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the game server. STOMP frames are text, so each transport
//! message carries one or more encoded frames. Framing of the messages
//! themselves (WebSocket frames, length-prefixed TCP, ...) is up to the
//! implementation.
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait. Construct a connected transport
//! externally, then hand it to
//! [`PubSubClient::connect`](crate::pubsub::PubSubClient::connect), which
//! performs the STOMP handshake on top of it.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use snake_session_client::error::SessionError;
//! use snake_session_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SessionError> {
//!         // Write the encoded frame(s)
//!         # unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Return None when the connection is closed cleanly
//!         # unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         # unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete message and
/// each call to [`recv`](Transport::recv) yields one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the adapter loop
/// polls it inside `tokio::select!`. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SendFailure`] if the write was rejected, or
    /// [`SessionError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), SessionError>;

    /// Receive the next text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), SessionError>;
}
