//! Last-known-good game state.
//!
//! The reconciler keeps the latest snapshot, the local player's identity and
//! the highscore table in a single [`StateView`] published through a
//! `tokio::sync::watch` channel. Every update decodes the payload first and
//! only then swaps in the new value, so readers see either the old or the new
//! field, never a mix, and a payload that fails to decode changes nothing.
//!
//! Snapshots carry no sequence numbers. The transport delivers each topic in
//! order, so the latest delivered snapshot is the current one.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::protocol::{GameSnapshot, HighscoreEntry, PlayerIdentity};

/// Read-only view of everything the reconciler holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView {
    /// `None` until the first snapshot arrives.
    pub snapshot: Option<Arc<GameSnapshot>>,
    pub identity: PlayerIdentity,
    pub highscores: Arc<Vec<HighscoreEntry>>,
}

impl StateView {
    /// Paused flag of the current snapshot; `false` before the first one.
    pub fn is_paused(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|snapshot| snapshot.paused)
    }
}

/// The identity queue sends a bare number; some brokers wrap it in quotes.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentity {
    Number(i32),
    Text(String),
}

/// Owner of the authoritative client-side state.
#[derive(Debug)]
pub struct StateReconciler {
    state: watch::Sender<StateView>,
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl StateReconciler {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StateView::default());
        Self { state }
    }

    /// Replace the snapshot with the one decoded from `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if `raw` is not a valid snapshot; the
    /// stored snapshot is kept.
    pub fn on_snapshot(&self, topic: &str, raw: &str) -> Result<()> {
        let snapshot: GameSnapshot = decode(topic, raw)?;
        debug!(
            topic,
            snakes = snapshot.snakes.len(),
            paused = snapshot.paused,
            "snapshot applied"
        );
        let snapshot = Arc::new(snapshot);
        self.state.send_modify(|view| view.snapshot = Some(snapshot));
        Ok(())
    }

    /// Replace the highscore table with the one decoded from `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if `raw` is not a list of entries.
    pub fn on_highscores(&self, topic: &str, raw: &str) -> Result<()> {
        let highscores: Vec<HighscoreEntry> = decode(topic, raw)?;
        debug!(topic, entries = highscores.len(), "highscores applied");
        let highscores = Arc::new(highscores);
        self.state.send_modify(|view| view.highscores = highscores);
        Ok(())
    }

    /// Store the identity decoded from `raw`.
    ///
    /// The first identity of a session sticks until [`reset_identity`]; a
    /// different one arriving later is logged and ignored.
    ///
    /// [`reset_identity`]: StateReconciler::reset_identity
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if `raw` is neither an integer nor a
    /// string holding one.
    pub fn on_identity(&self, topic: &str, raw: &str) -> Result<()> {
        let identity = match decode::<RawIdentity>(topic, raw)? {
            RawIdentity::Number(idx) => idx,
            RawIdentity::Text(text) => decode::<i32>(topic, text.trim())?,
        };
        let identity = PlayerIdentity(identity);

        let previous = self.state.borrow().identity;
        if previous.is_known() {
            if previous != identity {
                warn!(%previous, %identity, "ignoring identity reassignment");
            }
            return Ok(());
        }
        debug!(topic, %identity, "identity assigned");
        self.state.send_modify(|view| view.identity = identity);
        Ok(())
    }

    /// Forget the identity before (re)joining a session.
    pub fn reset_identity(&self) {
        self.state
            .send_modify(|view| view.identity = PlayerIdentity::UNKNOWN);
    }

    /// Consistent copy of the current state.
    pub fn current_state(&self) -> StateView {
        self.state.borrow().clone()
    }

    /// Current snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<GameSnapshot>> {
        self.state.borrow().snapshot.clone()
    }

    /// Local player's identity; [`PlayerIdentity::UNKNOWN`] until assigned.
    pub fn identity(&self) -> PlayerIdentity {
        self.state.borrow().identity
    }

    /// See [`StateView::is_paused`].
    pub fn is_paused(&self) -> bool {
        self.state.borrow().is_paused()
    }

    /// Receiver notified after every successful update.
    pub fn subscribe(&self) -> watch::Receiver<StateView> {
        self.state.subscribe()
    }
}

fn decode<T: serde::de::DeserializeOwned>(topic: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| {
        warn!(topic, "discarding undecodable payload: {source}");
        SessionError::Decode {
            topic: topic.to_string(),
            source,
        }
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::Coordinate;

    const TOPIC: &str = "/topic/update/abc";

    fn snapshot_json(food_x: i32, paused: bool) -> String {
        format!(
            r#"{{"width":20,"height":20,"food":{{"x":{food_x},"y":4}},"paused":{paused},
               "snakes":[{{"idx":0,"name":"p1","length":3,"paused":false}}]}}"#
        )
    }

    #[test]
    fn starts_empty() {
        let reconciler = StateReconciler::new();
        let state = reconciler.current_state();
        assert!(state.snapshot.is_none());
        assert_eq!(state.identity, PlayerIdentity::UNKNOWN);
        assert!(state.highscores.is_empty());
        assert!(!state.is_paused());
    }

    #[test]
    fn latest_snapshot_replaces_previous() {
        let reconciler = StateReconciler::new();
        reconciler.on_snapshot(TOPIC, &snapshot_json(1, true)).unwrap();
        reconciler
            .on_snapshot(
                TOPIC,
                r#"{"width":20,"height":20,"food":{"x":9,"y":9},"snakes":[]}"#,
            )
            .unwrap();

        let snapshot = reconciler.snapshot().unwrap();
        assert_eq!(snapshot.food, Coordinate { x: 9, y: 9 });
        // Nothing from the first snapshot survives.
        assert!(snapshot.snakes.is_empty());
        assert!(!snapshot.paused);
    }

    #[test]
    fn decode_failure_keeps_state() {
        let reconciler = StateReconciler::new();
        reconciler.on_snapshot(TOPIC, &snapshot_json(3, false)).unwrap();
        reconciler
            .on_highscores("/topic/newHighscore", r#"[{"playerName":"a","score":5}]"#)
            .unwrap();
        reconciler.on_identity("/user/queue/getIdx", "0").unwrap();
        let before = reconciler.current_state();

        assert!(matches!(
            reconciler.on_snapshot(TOPIC, "{not json"),
            Err(SessionError::Decode { .. })
        ));
        assert!(reconciler
            .on_snapshot(TOPIC, r#"{"width":0,"height":20,"food":{"x":0,"y":0}}"#)
            .is_err());
        assert!(reconciler.on_highscores("/topic/newHighscore", "{}").is_err());
        assert!(reconciler.on_identity("/user/queue/getIdx", "\"zero\"").is_err());

        assert_eq!(reconciler.current_state(), before);
    }

    #[test]
    fn identity_accepts_number_or_string() {
        let reconciler = StateReconciler::new();
        reconciler.on_identity("/user/queue/getIdx", "2").unwrap();
        assert_eq!(reconciler.identity(), PlayerIdentity(2));
        reconciler.reset_identity();
        assert!(!reconciler.identity().is_known());
        reconciler.on_identity("/user/queue/getIdx", "\" 5 \"").unwrap();
        assert_eq!(reconciler.identity(), PlayerIdentity(5));
    }

    #[test]
    fn identity_is_kept_until_reset() {
        let reconciler = StateReconciler::new();
        let mut rx = reconciler.subscribe();
        reconciler.on_identity("/user/queue/getIdx", "1").unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        reconciler.on_identity("/user/queue/getIdx", "3").unwrap();
        reconciler.on_identity("/user/queue/getIdx", "1").unwrap();
        assert_eq!(reconciler.identity(), PlayerIdentity(1));
        assert!(!rx.has_changed().unwrap());

        reconciler.reset_identity();
        reconciler.on_identity("/user/queue/getIdx", "3").unwrap();
        assert_eq!(reconciler.identity(), PlayerIdentity(3));
    }

    #[test]
    fn paused_flag_follows_snapshot() {
        let reconciler = StateReconciler::new();
        reconciler.on_snapshot(TOPIC, &snapshot_json(0, true)).unwrap();
        assert!(reconciler.is_paused());
        reconciler.on_snapshot(TOPIC, &snapshot_json(0, false)).unwrap();
        assert!(!reconciler.is_paused());
    }

    #[tokio::test]
    async fn subscribers_see_each_update() {
        let reconciler = StateReconciler::new();
        let mut rx = reconciler.subscribe();
        reconciler.on_snapshot(TOPIC, &snapshot_json(7, false)).unwrap();
        rx.changed().await.unwrap();
        let food = rx.borrow().snapshot.as_ref().map(|s| s.food);
        assert_eq!(food, Some(Coordinate { x: 7, y: 4 }));
    }

    #[test]
    fn watchers_wake_only_on_accepted_updates() {
        let reconciler = StateReconciler::new();
        let mut rx = reconciler.subscribe();
        let mut changed = tokio_test::task::spawn(async move { rx.changed().await });
        tokio_test::assert_pending!(changed.poll());

        reconciler.on_snapshot(TOPIC, "{broken").unwrap_err();
        assert!(!changed.is_woken());
        tokio_test::assert_pending!(changed.poll());

        reconciler.on_snapshot(TOPIC, &snapshot_json(1, false)).unwrap();
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
    }

    #[test]
    fn held_view_is_not_mutated_by_later_updates() {
        let reconciler = StateReconciler::new();
        reconciler.on_snapshot(TOPIC, &snapshot_json(1, false)).unwrap();
        let held = reconciler.current_state();
        reconciler.on_snapshot(TOPIC, &snapshot_json(2, false)).unwrap();
        assert_eq!(held.snapshot.unwrap().food.x, 1);
    }
}
