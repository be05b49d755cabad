//! Error types for the snake session client.

use thiserror::Error;

use crate::session::SessionPhase;

/// Errors that can occur when using the session client.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not be established or the STOMP handshake failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// An intent or control frame could not be transmitted.
    ///
    /// The session stays joined; the caller may retry the same intent.
    #[error("send failure: {0}")]
    SendFailure(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// An inbound payload on `topic` could not be decoded.
    ///
    /// The previously stored state is left untouched.
    #[error("failed to decode payload on {topic}: {source}")]
    Decode {
        /// Topic the payload arrived on.
        topic: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An operation was attempted in a session phase that does not allow it.
    #[error("{operation} is not allowed while the session is {phase}")]
    ProtocolMisuse {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Phase the session was in at the time.
        phase: SessionPhase,
    },

    /// The session allocation request failed.
    #[error("session allocation failed: {0}")]
    Allocation(String),

    /// A STOMP frame could not be parsed.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl SessionError {
    /// Returns `true` if the error ends the connection rather than a single operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Connection(_) | SessionError::TransportClosed
        )
    }
}

/// A specialized [`Result`] type for session client operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn protocol_misuse_names_operation_and_phase() {
        let err = SessionError::ProtocolMisuse {
            operation: "move",
            phase: SessionPhase::Unjoined,
        };
        assert_eq!(
            err.to_string(),
            "move is not allowed while the session is unjoined"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn decode_error_keeps_source() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = SessionError::Decode {
            topic: "/topic/newHighscore".into(),
            source,
        };
        assert!(err.to_string().starts_with("failed to decode payload on /topic/newHighscore"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn connection_errors_are_fatal() {
        assert!(SessionError::Connection("refused".into()).is_fatal());
        assert!(SessionError::TransportClosed.is_fatal());
        assert!(!SessionError::SendFailure("x".into()).is_fatal());
    }
}
