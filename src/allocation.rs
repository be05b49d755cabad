//! Fresh-session allocation.
//!
//! Starting a session without an id first asks the server for a new game of a
//! given board size. This is a plain request/response exchange, outside the
//! STOMP connection.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::SessionId;

/// Allocates new game sessions.
#[async_trait]
pub trait SessionAllocator: Send + Sync {
    /// Create a game with a `width` × `height` board and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Allocation`](crate::SessionError::Allocation)
    /// when the server cannot be reached or answers with something unusable.
    async fn allocate(&self, width: u32, height: u32) -> Result<SessionId>;
}

#[cfg(feature = "allocation-http")]
pub use http::HttpSessionAllocator;

#[cfg(feature = "allocation-http")]
mod http {
    use async_trait::async_trait;
    use serde::Deserialize;
    use tracing::{debug, error};

    use super::SessionAllocator;
    use crate::error::{Result, SessionError};
    use crate::protocol::SessionId;

    /// The server answers with the whole new game; only the id matters here.
    #[derive(Deserialize)]
    struct AllocatedGame {
        id: SessionId,
    }

    /// Allocates sessions with `POST {base_url}/init/{width}/{height}`.
    ///
    /// ```
    /// use snake_session_client::allocation::HttpSessionAllocator;
    ///
    /// let allocator = HttpSessionAllocator::new("http://localhost:8080/api/");
    /// assert_eq!(allocator.init_url(20, 20), "http://localhost:8080/api/init/20/20");
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpSessionAllocator {
        http_client: reqwest::Client,
        base_url: String,
    }

    impl HttpSessionAllocator {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self::with_client(reqwest::Client::new(), base_url)
        }

        /// Use a preconfigured client (timeouts, proxies, TLS roots).
        pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
            let base_url = base_url.into().trim_end_matches('/').to_string();
            Self {
                http_client,
                base_url,
            }
        }

        pub fn init_url(&self, width: u32, height: u32) -> String {
            format!("{}/init/{width}/{height}", self.base_url)
        }
    }

    #[async_trait]
    impl SessionAllocator for HttpSessionAllocator {
        async fn allocate(&self, width: u32, height: u32) -> Result<SessionId> {
            let url = self.init_url(width, height);
            debug!(%url, "requesting new session");

            let response = self
                .http_client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .send()
                .await
                .map_err(|e| SessionError::Allocation(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                error!(%status, error = %error_text, "session allocation rejected");
                return Err(SessionError::Allocation(format!(
                    "server answered {status}: {error_text}"
                )));
            }

            let game: AllocatedGame = response.json().await.map_err(|e| {
                SessionError::Allocation(format!("failed to parse allocation response: {e}"))
            })?;
            debug!(session_id = %game.id, "session allocated");
            Ok(game.id)
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
    mod tests {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Answer one HTTP request with `status` and `body`, returning the
        /// request head.
        async fn one_shot_server(
            status: &'static str,
            body: &'static str,
        ) -> (String, tokio::task::JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let task = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
                request
            });
            (format!("http://{addr}/api"), task)
        }

        #[tokio::test]
        async fn posts_board_size_and_reads_id() {
            let (base, server) = one_shot_server(
                "200 OK",
                r#"{"id":"abc","width":20,"height":20,"snakes":[]}"#,
            )
            .await;

            let id = HttpSessionAllocator::new(base).allocate(20, 20).await.unwrap();
            assert_eq!(id, SessionId::new("abc"));

            let request = server.await.unwrap();
            assert!(request.starts_with("POST /api/init/20/20 HTTP/1.1"));
            assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        }

        #[tokio::test]
        async fn error_status_is_allocation_error() {
            let (base, _server) = one_shot_server("500 Internal Server Error", "{}").await;
            let err = HttpSessionAllocator::new(base).allocate(10, 10).await.unwrap_err();
            assert!(matches!(err, SessionError::Allocation(_)));
        }

        #[tokio::test]
        async fn missing_id_is_allocation_error() {
            let (base, _server) = one_shot_server("200 OK", r#"{"width":10}"#).await;
            let err = HttpSessionAllocator::new(base).allocate(10, 10).await.unwrap_err();
            assert!(matches!(err, SessionError::Allocation(_)));
        }

        #[tokio::test]
        async fn unreachable_server_is_allocation_error() {
            let err = HttpSessionAllocator::new("http://127.0.0.1:1/api")
                .allocate(10, 10)
                .await
                .unwrap_err();
            assert!(matches!(err, SessionError::Allocation(_)));
        }
    }
}
