//! Seam for automated players.
//!
//! An autopilot replaces keyboard input: it looks at the latest snapshot and
//! picks a direction, which the session controller then sends like any other
//! move (see [`SessionController::autopilot_step`](crate::session::SessionController::autopilot_step)).
//! How the decision is made is up to the implementation.

use crate::protocol::{Direction, GameSnapshot};

pub trait Autopilot: Send + Sync {
    fn decide(&self, snapshot: &GameSnapshot) -> Direction;
}

impl<F> Autopilot for F
where
    F: Fn(&GameSnapshot) -> Direction + Send + Sync,
{
    fn decide(&self, snapshot: &GameSnapshot) -> Direction {
        self(snapshot)
    }
}
