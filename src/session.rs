//! Session lifecycle and intents.
//!
//! [`SessionController`] owns one [`PubSubClient`], the [`TopicRouter`] that
//! demultiplexes its frames and the [`StateReconciler`] they feed. A dispatch
//! task drains the adapter's event channel and routes frames one at a time,
//! so per-topic order is the wire order.
//!
//! The lifecycle is `Unjoined → Joining → Joined → Terminated`. Intents are
//! only accepted while joined; anywhere else they fail with
//! [`SessionError::ProtocolMisuse`] and nothing is queued. A controller is
//! never rejoined: after termination, build a new one (possibly passing the
//! same [`SessionId`] to [`start`](SessionController::start)).
//!
//! # Example
//!
//! ```rust,ignore
//! let (pubsub, transport_events) = PubSubClient::connect(transport, PubSubConfig::new("localhost")).await?;
//! let (session, mut events) = SessionController::new(pubsub, transport_events, SessionConfig::default());
//! let mut session = session.with_allocator(Arc::new(HttpSessionAllocator::new("http://localhost:8080/api")));
//!
//! let id = session.start(None).await?;
//! session.handle_key("ArrowUp")?;
//!
//! let mut state = session.watch_state();
//! while state.changed().await.is_ok() {
//!     render(&state.borrow());
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::allocation::SessionAllocator;
use crate::autopilot::Autopilot;
use crate::error::{Result, SessionError};
use crate::event::{SessionEvent, TransportEvent};
use crate::input::{map_key, InputAction};
use crate::protocol::{Direction, Intent, SessionId, Topic};
use crate::pubsub::{PubSubClient, PubSubConfig, SubscriptionHandle};
use crate::reconciler::{StateReconciler, StateView};
use crate::router::{FrameHandler, TopicRouter};
use crate::transport::Transport;

/// Board size requested for fresh sessions unless configured otherwise.
const DEFAULT_BOARD_SIZE: u32 = 20;

/// Default capacity of the bounded session event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default time [`SessionController::close`] waits for the dispatch task.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Phase ───────────────────────────────────────────────────────────

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Unjoined,
    Joining,
    Joined,
    Terminated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Unjoined => "unjoined",
            SessionPhase::Joining => "joining",
            SessionPhase::Joined => "joined",
            SessionPhase::Terminated => "terminated",
        })
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionController`].
///
/// ```
/// use snake_session_client::session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_board_size(30, 15)
///     .with_always_send_pause_intents(true);
/// assert_eq!((config.board_width, config.board_height), (30, 15));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Board width requested when allocating a fresh session.
    pub board_width: u32,
    /// Board height requested when allocating a fresh session.
    pub board_height: u32,
    /// Send pause/unpause even when the local paused flag says it is redundant.
    ///
    /// The local flag only changes when a snapshot arrives, so it can lag
    /// behind another player's pause. Off by default.
    pub always_send_pause_intents: bool,
    /// Capacity of the session event channel. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`SessionController::close`] waits for the dispatch task.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board_width: DEFAULT_BOARD_SIZE,
            board_height: DEFAULT_BOARD_SIZE,
            always_send_pause_intents: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Zero dimensions are raised to 1.
    #[must_use]
    pub fn with_board_size(mut self, width: u32, height: u32) -> Self {
        self.board_width = width.max(1);
        self.board_height = height.max(1);
        self
    }

    #[must_use]
    pub fn with_always_send_pause_intents(mut self, always: bool) -> Self {
        self.always_send_pause_intents = always;
        self
    }

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
}

// ── Controller ──────────────────────────────────────────────────────

type Applier = fn(&StateReconciler, &str, &str) -> Result<()>;

/// One client's view of one game session.
pub struct SessionController {
    pubsub: PubSubClient,
    router: Arc<TopicRouter>,
    reconciler: Arc<StateReconciler>,
    phase: Arc<StdMutex<SessionPhase>>,
    allocator: Option<Arc<dyn SessionAllocator>>,
    config: SessionConfig,
    session_id: Option<SessionId>,
    subscriptions: Vec<SubscriptionHandle>,
    event_tx: mpsc::Sender<SessionEvent>,
    dispatch: Option<tokio::task::JoinHandle<()>>,
}

impl SessionController {
    /// Wrap a connected adapter and start dispatching its events.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "the event receiver must be used to receive session events"]
    pub fn new(
        pubsub: PubSubClient,
        transport_events: mpsc::Receiver<TransportEvent>,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);

        let router = Arc::new(TopicRouter::new());
        let phase = Arc::new(StdMutex::new(SessionPhase::Unjoined));
        let dispatch = tokio::spawn(dispatch_loop(
            transport_events,
            Arc::clone(&router),
            Arc::clone(&phase),
            event_tx.clone(),
        ));

        let controller = Self {
            pubsub,
            router,
            reconciler: Arc::new(StateReconciler::new()),
            phase,
            allocator: None,
            config,
            session_id: None,
            subscriptions: Vec::new(),
            event_tx,
            dispatch: Some(dispatch),
        };
        (controller, event_rx)
    }

    /// Connect `transport` and wrap it in a controller.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the handshake fails.
    pub async fn connect(
        transport: impl Transport,
        pubsub_config: PubSubConfig,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let (pubsub, transport_events) = PubSubClient::connect(transport, pubsub_config).await?;
        Ok(Self::new(pubsub, transport_events, config))
    }

    /// Use `allocator` when [`start`](Self::start) is called without an id.
    #[must_use]
    pub fn with_allocator(mut self, allocator: Arc<dyn SessionAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Join `existing`, or a freshly allocated session when `None`.
    ///
    /// Subscribes to the session's update topic, the highscore topic and the
    /// identity queue, then sends the join intent. The session counts as
    /// joined as soon as that intent is queued.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ProtocolMisuse`] unless the session is unjoined
    /// - [`SessionError::Allocation`] if a fresh session cannot be allocated
    /// - [`SessionError::SendFailure`] / [`SessionError::Connection`] if the
    ///   connection is lost while joining
    ///
    /// On failure the session returns to unjoined, or stays terminated if the
    /// connection went away.
    pub async fn start(&mut self, existing: Option<SessionId>) -> Result<SessionId> {
        self.transition(SessionPhase::Unjoined, SessionPhase::Joining, "start")?;
        match self.join(existing).await {
            Ok(session_id) => Ok(session_id),
            Err(e) => {
                warn!("join failed: {e}");
                self.abandon_join();
                Err(e)
            }
        }
    }

    async fn join(&mut self, existing: Option<SessionId>) -> Result<SessionId> {
        let session_id = match existing {
            Some(session_id) => session_id,
            None => self.allocate().await?,
        };
        info!(%session_id, "joining session");
        self.reconciler.reset_identity();

        let appliers: [Applier; 3] = [
            StateReconciler::on_snapshot,
            StateReconciler::on_highscores,
            StateReconciler::on_identity,
        ];
        for (topic, apply) in Topic::for_session(&session_id).into_iter().zip(appliers) {
            let destination = topic.destination();
            // Handler first, so a frame racing the SUBSCRIBE is not lost.
            self.router
                .register(destination.clone(), self.state_handler(apply));
            self.subscriptions.push(self.pubsub.subscribe(&destination)?);
        }

        let join = Intent::Join(session_id.clone());
        self.pubsub.send(join.destination(), join.payload())?;

        {
            let mut phase = self.lock_phase();
            if *phase != SessionPhase::Joining {
                return Err(SessionError::Connection(
                    "connection lost while joining".into(),
                ));
            }
            *phase = SessionPhase::Joined;
        }
        self.session_id = Some(session_id.clone());
        info!(%session_id, "session joined");
        emit_event(
            &self.event_tx,
            SessionEvent::Joined {
                session_id: session_id.clone(),
            },
        );
        Ok(session_id)
    }

    async fn allocate(&self) -> Result<SessionId> {
        let allocator = self
            .allocator
            .as_ref()
            .ok_or_else(|| SessionError::Allocation("no session allocator configured".into()))?;
        allocator
            .allocate(self.config.board_width, self.config.board_height)
            .await
    }

    fn abandon_join(&mut self) {
        self.router.clear();
        for handle in self.subscriptions.drain(..) {
            if let Err(e) = self.pubsub.unsubscribe(&handle) {
                debug!(topic = handle.topic(), "unsubscribe during rollback failed: {e}");
            }
        }
        let mut phase = self.lock_phase();
        if *phase == SessionPhase::Joining {
            *phase = SessionPhase::Unjoined;
        }
    }

    /// Tear the session down.
    ///
    /// Once this returns no handler of this session runs again, even for
    /// frames that were already in flight. Safe to call more than once.
    pub async fn close(&mut self) {
        let previous = self.set_phase(SessionPhase::Terminated);
        debug!(%previous, "session close requested");

        self.router.clear();
        for handle in self.subscriptions.drain(..) {
            if let Err(e) = self.pubsub.unsubscribe(&handle) {
                debug!(topic = handle.topic(), "unsubscribe during close failed: {e}");
            }
        }
        self.pubsub.close().await;

        if let Some(mut task) = self.dispatch.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("dispatch task terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("dispatch task did not exit within timeout; aborting task");
                    task.abort();
                }
            }
            info!(session_id = ?self.session_id, "session closed");
        }
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Steer. When the game is locally paused, an unpause intent goes out
    /// first: moving always resumes play.
    ///
    /// # Errors
    ///
    /// [`SessionError::ProtocolMisuse`] unless joined,
    /// [`SessionError::SendFailure`] if the connection is gone.
    pub fn move_to(&self, direction: Direction) -> Result<()> {
        self.ensure_joined("move")?;
        if self.reconciler.is_paused() {
            self.send_intent(Intent::Unpause)?;
        }
        self.send_intent(Intent::Move(direction))
    }

    /// Pause, unless the game is already locally paused.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn pause(&self) -> Result<()> {
        self.ensure_joined("pause")?;
        if self.reconciler.is_paused() && !self.config.always_send_pause_intents {
            debug!("already paused, pause intent skipped");
            return Ok(());
        }
        self.send_intent(Intent::Pause)
    }

    /// Resume, unless the game is already locally running.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn unpause(&self) -> Result<()> {
        self.ensure_joined("unpause")?;
        if !self.reconciler.is_paused() && !self.config.always_send_pause_intents {
            debug!("not paused, unpause intent skipped");
            return Ok(());
        }
        self.send_intent(Intent::Unpause)
    }

    /// Pause when running, resume when paused.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn toggle_pause(&self) -> Result<()> {
        if self.reconciler.is_paused() {
            self.unpause()
        } else {
            self.pause()
        }
    }

    /// Restart the game.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn reset(&self) -> Result<()> {
        self.ensure_joined("reset")?;
        self.send_intent(Intent::Reset)
    }

    /// Rename the local player's snake.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        self.ensure_joined("set_name")?;
        self.send_intent(Intent::SetName(name.into()))
    }

    /// Map a key code and act on it. Unbound keys do nothing and return `None`.
    ///
    /// # Errors
    ///
    /// As for the intent the key maps to.
    pub fn handle_key(&self, code: &str) -> Result<Option<InputAction>> {
        let Some(action) = map_key(code) else {
            return Ok(None);
        };
        match action {
            InputAction::Move(direction) => self.move_to(direction)?,
            InputAction::TogglePause => self.toggle_pause()?,
            InputAction::Reset => self.reset()?,
        }
        Ok(Some(action))
    }

    /// Let `autopilot` steer once, based on the latest snapshot.
    ///
    /// Returns `None` without sending anything before the first snapshot.
    ///
    /// # Errors
    ///
    /// As for [`move_to`](Self::move_to).
    pub fn autopilot_step(&self, autopilot: &dyn Autopilot) -> Result<Option<Direction>> {
        self.ensure_joined("autopilot_step")?;
        let Some(snapshot) = self.reconciler.snapshot() else {
            return Ok(None);
        };
        let direction = autopilot.decide(&snapshot);
        self.move_to(direction)?;
        Ok(Some(direction))
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.lock_phase()
    }

    /// Id of the joined session, once known.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Whether the pub/sub connection is still up.
    pub fn is_connected(&self) -> bool {
        self.pubsub.is_connected()
    }

    /// Consistent copy of snapshot, identity and highscores.
    pub fn current_state(&self) -> StateView {
        self.reconciler.current_state()
    }

    /// Receiver notified whenever the state changes.
    pub fn watch_state(&self) -> watch::Receiver<StateView> {
        self.reconciler.subscribe()
    }

    /// State owner, for feeding payloads or reading fields directly.
    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send_intent(&self, intent: Intent) -> Result<()> {
        debug!(intent = intent.name(), "sending intent");
        self.pubsub.send(intent.destination(), intent.payload())
    }

    fn ensure_joined(&self, operation: &'static str) -> Result<()> {
        let phase = self.phase();
        if phase == SessionPhase::Joined {
            Ok(())
        } else {
            Err(SessionError::ProtocolMisuse { operation, phase })
        }
    }

    fn transition(
        &self,
        from: SessionPhase,
        to: SessionPhase,
        operation: &'static str,
    ) -> Result<()> {
        let mut phase = self.lock_phase();
        if *phase != from {
            return Err(SessionError::ProtocolMisuse {
                operation,
                phase: *phase,
            });
        }
        *phase = to;
        Ok(())
    }

    fn set_phase(&self, to: SessionPhase) -> SessionPhase {
        std::mem::replace(&mut *self.lock_phase(), to)
    }

    fn lock_phase(&self) -> MutexGuard<'_, SessionPhase> {
        lock(&self.phase)
    }

    /// Handler feeding one reconciler update; decode failures become events.
    fn state_handler(&self, apply: Applier) -> impl FrameHandler + 'static {
        let reconciler = Arc::clone(&self.reconciler);
        let event_tx = self.event_tx.clone();
        move |topic: &str, body: &str| {
            if let Err(e) = apply(&*reconciler, topic, body) {
                emit_event(
                    &event_tx,
                    SessionEvent::DecodeFailed {
                        topic: topic.to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("session_id", &self.session_id)
            .field("subscriptions", &self.subscriptions.len())
            .field("pubsub", &self.pubsub)
            .finish()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.router.clear();
        if let Some(task) = self.dispatch.take() {
            task.abort();
        }
    }
}

// ── Dispatch loop ───────────────────────────────────────────────────

/// Drains adapter events in order. Ends after `Disconnected`.
async fn dispatch_loop(
    mut transport_events: mpsc::Receiver<TransportEvent>,
    router: Arc<TopicRouter>,
    phase: Arc<StdMutex<SessionPhase>>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    debug!("dispatch loop started");
    while let Some(event) = transport_events.recv().await {
        match event {
            TransportEvent::Message(frame) => {
                router.route(&frame.topic, &frame.body);
            }
            TransportEvent::SendFailed {
                destination,
                reason,
            } => emit_event(
                &event_tx,
                SessionEvent::SendFailed {
                    destination,
                    reason,
                },
            ),
            TransportEvent::ServerError { message } => {
                emit_event(&event_tx, SessionEvent::ServerError { message });
            }
            TransportEvent::Disconnected { reason } => {
                router.clear();
                let previous = std::mem::replace(&mut *lock(&phase), SessionPhase::Terminated);
                if previous != SessionPhase::Terminated {
                    warn!(?reason, "connection lost, session terminated");
                }
                if event_tx
                    .send(SessionEvent::Terminated { reason })
                    .await
                    .is_err()
                {
                    debug!("session event channel closed, receiver dropped");
                }
                break;
            }
        }
    }
    debug!("dispatch loop exited");
}

fn lock(phase: &StdMutex<SessionPhase>) -> MutexGuard<'_, SessionPhase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emit an event without blocking. If the channel is full, log and drop it.
fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("session event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("session event channel closed, receiver dropped");
        }
    }
}
