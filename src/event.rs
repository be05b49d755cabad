//! Events flowing out of the adapter and the session controller.

use crate::protocol::SessionId;

/// A `MESSAGE` frame resolved to the topic it was subscribed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    pub body: String,
}

/// Events the [`PubSubClient`](crate::pubsub::PubSubClient) loop emits, in
/// wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived on a subscribed topic.
    Message(InboundFrame),
    /// A queued frame could not be written. The connection stays up.
    SendFailed { destination: String, reason: String },
    /// The server sent an `ERROR` frame.
    ServerError { message: String },
    /// The connection is gone. Always the last event.
    Disconnected { reason: Option<String> },
}

/// Events the [`SessionController`](crate::session::SessionController) emits
/// to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Subscriptions are in place and the join intent was sent.
    Joined { session_id: SessionId },
    /// An inbound payload was rejected; the previous state is kept.
    DecodeFailed { topic: String, message: String },
    /// An intent could not be written to the transport.
    SendFailed { destination: String, reason: String },
    /// The server reported an error.
    ServerError { message: String },
    /// The session ended. Always the last event.
    Terminated { reason: Option<String> },
}
