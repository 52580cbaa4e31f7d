//! Fault handling on the player side.
//!
//! The conductor only tells a player *what* to do to its links; how a throttle
//! or a disconnect is realised depends on the system under test. Players
//! plug that in through [`FaultHandler`].

use crate::error::PlayerError;
use async_trait::async_trait;
use conductor_core::LinkFaults;
use conductor_types::{Address, Direction, ShutdownOrExit};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Applies fault commands received from the conductor.
///
/// A command is acknowledged with `Done` only after the method returns `Ok`.
/// An error is reported to the conductor as `CommandFailed`, which fails
/// the command there.
#[async_trait]
pub trait FaultHandler: Send + Sync {
    /// Limit traffic to `target` in `direction` to `rate_mbit` megabits per
    /// second. Zero blocks the link; a negative rate lifts the limit.
    async fn throttle(
        &self,
        target: &Address,
        direction: Direction,
        rate_mbit: f32,
    ) -> Result<(), PlayerError>;

    /// Drop the connection to `target`, abruptly if `abort` is set.
    async fn disconnect(&self, target: &Address, abort: bool) -> Result<(), PlayerError>;

    /// Stop this node. Called after `Done` has been sent.
    async fn terminate(&self, mode: ShutdownOrExit);
}

/// A [`FaultHandler`] that only records what it was asked to do.
///
/// Useful for tests and as the default for nodes whose transport has no
/// fault hooks.
#[derive(Debug, Default)]
pub struct RecordingFaultHandler {
    links: Mutex<LinkFaults>,
    terminated: Mutex<Option<ShutdownOrExit>>,
}

impl RecordingFaultHandler {
    /// Create a handler with no faults applied.
    pub fn new() -> Self {
        Self::default()
    }

    fn links(&self) -> MutexGuard<'_, LinkFaults> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the link faults applied so far.
    pub fn faults(&self) -> LinkFaults {
        self.links().clone()
    }

    /// Current rate limit towards `target` in `direction`.
    pub fn rate(&self, target: &Address, direction: Direction) -> Option<f32> {
        self.links().rate(target, direction)
    }

    /// Whether `target` was disconnected.
    pub fn is_disconnected(&self, target: &Address) -> bool {
        self.links().is_disconnected(target)
    }

    /// How the node was told to terminate, if it was.
    pub fn terminated(&self) -> Option<ShutdownOrExit> {
        *self
            .terminated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FaultHandler for RecordingFaultHandler {
    async fn throttle(
        &self,
        target: &Address,
        direction: Direction,
        rate_mbit: f32,
    ) -> Result<(), PlayerError> {
        tracing::info!(
            "Throttling {} ({:?}) to {} Mbit/s",
            target,
            direction,
            rate_mbit
        );
        self.links().apply_throttle(target, direction, rate_mbit);
        Ok(())
    }

    async fn disconnect(&self, target: &Address, abort: bool) -> Result<(), PlayerError> {
        tracing::info!("Disconnecting {} (abort: {})", target, abort);
        self.links().apply_disconnect(target, abort);
        Ok(())
    }

    async fn terminate(&self, mode: ShutdownOrExit) {
        tracing::info!("Terminating: {:?}", mode);
        *self
            .terminated
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(mode);
    }
}
