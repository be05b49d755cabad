//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries STOMP frames in WebSocket text messages, the
//! way browser STOMP clients talk to the game server's `/websocket` endpoint.
//! Both `ws://` and `wss://` URLs are supported.
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), snake_session_client::SessionError> {
//! use snake_session_client::pubsub::{PubSubClient, PubSubConfig};
//! use snake_session_client::WebSocketTransport;
//!
//! let transport = WebSocketTransport::connect("ws://localhost:8080/websocket").await?;
//! let (client, events) = PubSubClient::connect(transport, PubSubConfig::new("localhost")).await?;
//! # drop((client, events));
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::SessionError;
use crate::transport::Transport;

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// Wraps a `tokio-tungstenite` [`WebSocketStream`](tokio_tungstenite::WebSocketStream).
/// Text messages pass through unchanged; binary messages are decoded as UTF-8
/// because some STOMP brokers send frames in binary messages.
///
/// For advanced use-cases (custom TLS, proxy, headers) construct the stream
/// yourself and use [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any messages,
/// making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// Supports both `ws://` and `wss://` schemes. TLS is handled automatically
    /// by `tokio-tungstenite` via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(format!("{url}: {e}")))?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    ///
    /// This is useful when you need custom TLS configuration, proxy headers, or
    /// any other connection setup that [`connect`](Self::connect) does not expose.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Establish a new WebSocket connection with a timeout.
    ///
    /// Behaves identically to [`connect`](Self::connect) but fails with
    /// [`SessionError::Timeout`] if the connection is not established within
    /// the given duration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, SessionError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SessionError::SendFailure(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        while let Some(next) = self.stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => return Some(Err(SessionError::TransportReceive(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Some(Ok(text.to_owned())),
                    Err(e) => tracing::warn!("skipping binary message that is not UTF-8: {e}"),
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "server closed the WebSocket");
                    return None;
                }
                // tungstenite answers pings itself; raw frames never reach a reader.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    tracing::trace!("skipping WebSocket control message");
                }
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SessionError::SendFailure(e.to_string()))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::stomp::{self, Command, Frame};
    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection on a local port and hand it to `script`.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            script(tokio_tungstenite::accept_async(tcp).await.unwrap()).await;
        });
        format!("ws://{addr}/websocket")
    }

    /// Drain the connection until the client goes away.
    async fn drain(mut ws: ServerStream) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn bad_urls_are_connection_errors() {
        for url in ["not-a-valid-url", "ws://127.0.0.1:1"] {
            let err = WebSocketTransport::connect(url).await.unwrap_err();
            assert!(matches!(err, SessionError::Connection(_)), "{url}: {err:?}");
        }
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        // TEST-NET-1 is never routable.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
    }

    #[tokio::test]
    async fn stomp_handshake_round_trips() {
        let url = serve_once(|mut ws| async move {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a text message");
            };
            let connect = stomp::decode(text.as_str()).unwrap().remove(0);
            assert_eq!(connect.command, Command::Connect);
            let reply = Frame::new(Command::Connected).with_header("version", "1.2");
            ws.send(Message::Text(reply.encode().into())).await.unwrap();
            drain(ws).await;
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(Frame::connect("localhost").encode())
            .await
            .unwrap();
        let reply = transport.recv().await.unwrap().unwrap();
        assert_eq!(stomp::decode(&reply).unwrap()[0].command, Command::Connected);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn binary_messages_are_read_as_text_when_utf8() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into())).await.unwrap();
            ws.send(Message::Binary(b"MESSAGE\ndestination:/topic/newHighscore\n\n[]\0".to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let text = transport.recv().await.unwrap().unwrap();
        assert_eq!(text, "MESSAGE\ndestination:/topic/newHighscore\n\n[]\0");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn from_stream_wraps_existing_connection() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text("\n".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(stream);
        // Heart-beats are passed through untouched.
        assert_eq!(transport.recv().await.unwrap().unwrap(), "\n");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let url = serve_once(drain).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send(Frame::disconnect().encode()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
        match transport.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(text)) => panic!("expected end of stream after close, got {text:?}"),
        }
    }
}
