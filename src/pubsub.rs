//! STOMP publish/subscribe adapter over a [`Transport`].
//!
//! [`PubSubClient`] is a thin handle that talks to a background loop task over
//! an unbounded MPSC channel of encoded frames. The loop multiplexes outgoing
//! frames, inbound transport messages and a shutdown signal with
//! `tokio::select!`, and reports what happens on the connection as
//! [`TransportEvent`]s on a bounded channel returned from
//! [`PubSubClient::connect`].
//!
//! Inbound `MESSAGE` frames are resolved to the topic they were subscribed as
//! and forwarded in wire order. Frames for a subscription that has already
//! been removed are dropped inside the loop.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = connect_somehow().await;
//! let (client, mut events) = PubSubClient::connect(transport, PubSubConfig::new("localhost")).await?;
//!
//! let handle = client.subscribe("/topic/newHighscore")?;
//! client.send("/app/reset", "")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TransportEvent::Message(frame) => { /* … */ }
//!         TransportEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::event::{InboundFrame, TransportEvent};
use crate::stomp::{self, Command, Frame};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the STOMP handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`PubSubClient`] connection.
///
/// ```
/// use snake_session_client::pubsub::PubSubConfig;
/// use std::time::Duration;
///
/// let config = PubSubConfig::new("snake.example")
///     .with_credentials("guest", "guest")
///     .with_connect_timeout(Duration::from_secs(2));
/// assert_eq!(config.host, "snake.example");
/// ```
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Virtual host sent in the `CONNECT` frame.
    pub host: String,
    /// Optional `login` header.
    pub login: Option<String>,
    /// Optional `passcode` header.
    pub passcode: Option<String>,
    /// How long to wait for `CONNECTED` after sending `CONNECT`.
    ///
    /// Defaults to **5 seconds**.
    pub connect_timeout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// Inbound messages wait for space instead of being dropped, so a slow
    /// consumer applies backpressure to the transport. Defaults to **256**.
    /// Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the loop gets to send `DISCONNECT` and close the transport on
    /// [`PubSubClient::close`] before it is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl PubSubConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            login: None,
            passcode: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn connect_frame(&self) -> Frame {
        let mut frame = Frame::connect(&self.host);
        if let Some(login) = &self.login {
            frame = frame.with_header("login", login.as_str());
        }
        if let Some(passcode) = &self.passcode {
            frame = frame.with_header("passcode", passcode.as_str());
        }
        frame
    }
}

// ── Subscriptions ───────────────────────────────────────────────────

/// Handle for one active subscription, returned by [`PubSubClient::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: String,
    topic: String,
}

impl SubscriptionHandle {
    /// The STOMP subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The destination subscribed to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the loop.
struct AdapterState {
    connected: AtomicBool,
    /// Subscription id → topic.
    subscriptions: StdMutex<HashMap<String, String>>,
}

impl AdapterState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            subscriptions: StdMutex::new(HashMap::new()),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Topic an inbound `MESSAGE` belongs to, or `None` if nobody listens.
    fn resolve_topic(&self, frame: &Frame) -> Option<String> {
        let subscriptions = self.subscriptions();
        match frame.header("subscription") {
            Some(id) => subscriptions.get(id).cloned(),
            None => {
                let destination = frame.header("destination")?;
                subscriptions
                    .values()
                    .find(|topic| topic.as_str() == destination)
                    .cloned()
            }
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one STOMP connection.
///
/// All operations except [`close`](PubSubClient::close) only queue a frame for
/// the background loop and return immediately.
pub struct PubSubClient {
    cmd_tx: mpsc::UnboundedSender<Frame>,
    state: Arc<AdapterState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl PubSubClient {
    /// Perform the STOMP handshake on `transport` and start the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if `CONNECT` cannot be written,
    /// the server answers with `ERROR`, the transport closes, or `CONNECTED`
    /// does not arrive within [`PubSubConfig::connect_timeout`].
    pub async fn connect(
        mut transport: impl Transport,
        config: PubSubConfig,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let handshake =
            tokio::time::timeout(config.connect_timeout, handshake(&mut transport, &config)).await;
        let pending = match handshake {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                let _ = transport.close().await;
                return Err(e);
            }
            Err(_) => {
                let _ = transport.close().await;
                return Err(SessionError::Connection(
                    "timed out waiting for CONNECTED".into(),
                ));
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Frame>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(AdapterState::new());
        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
            pending,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((client, event_rx))
    }

    /// Publish `body` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SendFailure`] if the connection is gone.
    pub fn send(&self, destination: &str, body: impl Into<String>) -> Result<()> {
        self.queue(Frame::send(destination, body))
    }

    /// Subscribe to `topic`.
    ///
    /// The id → topic mapping is registered before `SUBSCRIBE` is queued so no
    /// early `MESSAGE` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SendFailure`] if the connection is gone.
    pub fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle {
            id: format!("sub-{}", Uuid::new_v4().simple()),
            topic: topic.to_string(),
        };
        self.state
            .subscriptions()
            .insert(handle.id.clone(), handle.topic.clone());

        if let Err(e) = self.queue(Frame::subscribe(&handle.id, &handle.topic)) {
            self.state.subscriptions().remove(&handle.id);
            return Err(e);
        }
        debug!(topic = %handle.topic, id = %handle.id, "subscribed");
        Ok(handle)
    }

    /// Remove a subscription.
    ///
    /// The mapping is dropped first, so frames for it still in flight are
    /// discarded by the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SendFailure`] if `UNSUBSCRIBE` cannot be queued.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.state.subscriptions().remove(&handle.id);
        debug!(topic = %handle.topic, id = %handle.id, "unsubscribed");
        self.queue(Frame::unsubscribe(&handle.id))
    }

    /// Send `DISCONNECT`, close the transport and stop the loop.
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        debug!("PubSubClient: close requested");

        if self.is_connected() {
            let _ = self.cmd_tx.send(Frame::disconnect());
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.state.subscriptions().clear();
    }

    /// Returns `true` while the connection is believed to be up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions().len()
    }

    fn queue(&self, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::SendFailure("not connected".into()));
        }
        self.cmd_tx
            .send(frame)
            .map_err(|_| SessionError::SendFailure("transport loop has stopped".into()))
    }
}

impl std::fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient")
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscription_count())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort the loop instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Handshake ───────────────────────────────────────────────────────

/// Send `CONNECT` and wait for `CONNECTED`. Frames that arrived in the same
/// transport message after `CONNECTED` are returned for the loop.
async fn handshake(transport: &mut impl Transport, config: &PubSubConfig) -> Result<Vec<Frame>> {
    transport
        .send(config.connect_frame().encode())
        .await
        .map_err(|e| SessionError::Connection(format!("failed to send CONNECT: {e}")))?;

    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(SessionError::Connection(e.to_string())),
            None => {
                return Err(SessionError::Connection(
                    "transport closed during handshake".into(),
                ))
            }
        };
        let frames = stomp::decode(&text)
            .map_err(|e| SessionError::Connection(format!("invalid handshake reply: {e}")))?;

        let mut frames = frames.into_iter();
        while let Some(frame) = frames.next() {
            match frame.command {
                Command::Connected => {
                    debug!(
                        version = frame.header("version").unwrap_or("1.0"),
                        server = frame.header("server").unwrap_or("unknown"),
                        "STOMP session established"
                    );
                    return Ok(frames.collect());
                }
                Command::Error => {
                    return Err(SessionError::Connection(error_message(&frame)));
                }
                other => debug!("ignoring {other} frame before CONNECTED"),
            }
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop. Exits when the handle asks it to, the handle is dropped,
/// or the transport ends.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Frame>,
    event_tx: mpsc::Sender<TransportEvent>,
    state: Arc<AdapterState>,
    mut shutdown_rx: oneshot::Receiver<()>,
    pending: Vec<Frame>,
) {
    debug!("transport loop started");

    for frame in pending {
        handle_inbound(frame, &state, &event_tx).await;
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(frame) => write_frame(&mut transport, &frame, &event_tx).await,
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                // Flush what was queued before the signal (UNSUBSCRIBE, DISCONNECT).
                while let Ok(frame) = cmd_rx.try_recv() {
                    write_frame(&mut transport, &frame, &event_tx).await;
                }
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        for frame in stomp::frames(&text) {
                            match frame {
                                Ok(frame) => handle_inbound(frame, &state, &event_tx).await,
                                Err(e) => {
                                    warn!("dropping rest of transport message: {e}");
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Write one frame. A failed write is reported but does not end the loop.
async fn write_frame(
    transport: &mut impl Transport,
    frame: &Frame,
    event_tx: &mpsc::Sender<TransportEvent>,
) {
    trace!(command = %frame.command, destination = ?frame.header("destination"), "writing frame");
    if let Err(e) = transport.send(frame.encode()).await {
        warn!(command = %frame.command, "transport send error: {e}");
        let destination = frame
            .header("destination")
            .unwrap_or(frame.command.as_str())
            .to_string();
        emit_event(
            event_tx,
            TransportEvent::SendFailed {
                destination,
                reason: e.to_string(),
            },
        );
    }
}

async fn handle_inbound(frame: Frame, state: &AdapterState, event_tx: &mpsc::Sender<TransportEvent>) {
    match frame.command {
        Command::Message => {
            let Some(topic) = state.resolve_topic(&frame) else {
                trace!(
                    destination = ?frame.header("destination"),
                    "dropping MESSAGE for inactive subscription"
                );
                return;
            };
            let event = TransportEvent::Message(InboundFrame {
                topic,
                body: frame.body,
            });
            // Wait for room rather than drop: state frames must arrive in order.
            if event_tx.send(event).await.is_err() {
                debug!("event channel closed, receiver dropped");
            }
        }
        Command::Error => {
            let message = error_message(&frame);
            error!("server sent ERROR frame: {message}");
            emit_event(event_tx, TransportEvent::ServerError { message });
        }
        Command::Receipt => {
            debug!(receipt = ?frame.header("receipt-id"), "receipt");
        }
        other => warn!("ignoring unexpected {other} frame"),
    }
}

fn error_message(frame: &Frame) -> String {
    match frame.header("message") {
        Some(message) if !message.is_empty() => message.to_string(),
        _ if !frame.body.is_empty() => frame.body.clone(),
        _ => "server sent ERROR without details".to_string(),
    }
}

/// Emit an event without blocking. If the channel is full, log and drop it.
fn emit_event(event_tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Mark the connection down and deliver the final `Disconnected` event.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<TransportEvent>,
    state: &AdapterState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    if event_tx
        .send(TransportEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
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
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Replays scripted replies and records what was written.
    struct ScriptedTransport {
        incoming: VecDeque<Option<std::result::Result<String, SessionError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail_sends: bool,
    }

    impl ScriptedTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, SessionError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
                fail_sends: false,
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SessionError> {
            let is_connect = message.starts_with("CONNECT\n");
            if self.fail_sends && !is_connect {
                return Err(SessionError::SendFailure("write rejected".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SessionError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SessionError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn connected() -> Option<std::result::Result<String, SessionError>> {
        Some(Ok("CONNECTED\nversion:1.2\n\n\0".to_string()))
    }

    fn message(subscription: &str, destination: &str, body: &str) -> String {
        Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("destination", destination)
            .with_body(body)
            .encode()
    }

    #[tokio::test]
    async fn connect_sends_connect_frame() {
        let (transport, sent, _closed) = ScriptedTransport::new(vec![connected()]);
        let config = PubSubConfig::new("snake.example").with_credentials("u", "p");
        let (mut client, _events) = PubSubClient::connect(transport, config).await.unwrap();

        let first = sent.lock().unwrap()[0].clone();
        let frame = stomp::decode(&first).unwrap().remove(0);
        assert_eq!(frame.command, Command::Connect);
        assert_eq!(frame.header("host"), Some("snake.example"));
        assert_eq!(frame.header("accept-version"), Some("1.2"));
        assert_eq!(frame.header("login"), Some("u"));
        assert_eq!(frame.header("passcode"), Some("p"));
        assert!(client.is_connected());

        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn error_reply_fails_handshake() {
        let (transport, _sent, closed) = ScriptedTransport::new(vec![Some(Ok(
            "ERROR\nmessage:bad credentials\n\n\0".to_string(),
        ))]);
        let err = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap_err();
        match err {
            SessionError::Connection(reason) => assert_eq!(reason, "bad credentials"),
            other => panic!("expected Connection, got {other:?}"),
        }
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn closed_transport_fails_handshake() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![None]);
        let err = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![]);
        let config = PubSubConfig::new("h").with_connect_timeout(Duration::from_millis(20));
        let err = PubSubClient::connect(transport, config).await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }

    #[tokio::test]
    async fn frames_after_connected_in_same_message_are_delivered() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![Some(Ok(format!(
            "CONNECTED\nversion:1.2\n\n\0{}",
            Frame::new(Command::Error).with_body("late").encode()
        )))]);
        let (mut client, mut events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::ServerError {
                message: "late".into()
            }
        );
        client.close().await;
    }

    #[tokio::test]
    async fn messages_resolve_to_subscribed_topic() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![connected()]);
        let (client, _events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();
        let handle = client.subscribe("/topic/newHighscore").unwrap();

        let by_id = stomp::decode(&message(handle.id(), "/ignored", "[]")).unwrap();
        assert_eq!(
            client.state.resolve_topic(&by_id[0]).as_deref(),
            Some("/topic/newHighscore")
        );

        let by_destination = Frame::new(Command::Message)
            .with_header("destination", "/topic/newHighscore");
        assert_eq!(
            client.state.resolve_topic(&by_destination).as_deref(),
            Some("/topic/newHighscore")
        );

        client.unsubscribe(&handle).unwrap();
        assert!(client.state.resolve_topic(&by_id[0]).is_none());
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unknown_subscription_is_dropped() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![
            connected(),
            Some(Ok(message("sub-unknown", "/topic/x", "1"))),
            None,
        ]);
        let (_client, mut events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected { reason: None }
        );
    }

    #[tokio::test]
    async fn write_failure_is_reported_and_loop_survives() {
        let (mut transport, _sent, _closed) = ScriptedTransport::new(vec![connected()]);
        transport.fail_sends = true;
        let (mut client, mut events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();

        client.send("/app/reset", "").unwrap();
        match events.recv().await.unwrap() {
            TransportEvent::SendFailed { destination, .. } => assert_eq!(destination, "/app/reset"),
            other => panic!("expected SendFailed, got {other:?}"),
        }
        assert!(client.is_connected());
        client.close().await;
    }

    #[tokio::test]
    async fn close_flushes_disconnect_and_reports() {
        let (transport, sent, closed) = ScriptedTransport::new(vec![connected()]);
        let (mut client, mut events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();
        client.send("/app/pause", "").unwrap();
        client.close().await;

        assert!(closed.load(Ordering::Relaxed));
        let sent = sent.lock().unwrap();
        assert!(sent.iter().any(|m| m.starts_with("SEND\ndestination:/app/pause")));
        assert!(sent.last().unwrap().starts_with("DISCONNECT"));
        drop(sent);

        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected {
                reason: Some("client shut down".into())
            }
        );
        assert!(matches!(
            client.send("/app/pause", ""),
            Err(SessionError::SendFailure(_))
        ));
    }

    #[tokio::test]
    async fn double_close_does_not_panic() {
        let (transport, _sent, _closed) = ScriptedTransport::new(vec![connected()]);
        let (mut client, _events) = PubSubClient::connect(transport, PubSubConfig::new("h"))
            .await
            .unwrap();
        client.close().await;
        client.close().await;
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = PubSubConfig::new("h").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
