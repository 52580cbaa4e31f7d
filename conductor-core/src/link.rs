//! Per-link fault table kept by a player.
//!
//! A player applies throttle and disconnect commands to its own links only.
//! Faults are keyed by the remote address, so a throttle towards one target
//! never affects traffic to another.

use std::collections::HashMap;

use conductor_types::{Address, Direction};

/// Current fault state of one player's links.
#[derive(Debug, Default, Clone)]
pub struct LinkFaults {
    throttles: HashMap<(Address, Direction), f32>,
    disconnected: HashMap<Address, bool>,
}

impl LinkFaults {
    /// Empty table: every link healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Throttle traffic to `target`. `Both` sets each direction.
    ///
    /// A negative rate lifts the throttle.
    pub fn apply_throttle(&mut self, target: &Address, direction: Direction, rate_mbit: f32) {
        for dir in [Direction::Send, Direction::Receive] {
            if !direction.includes(dir) {
                continue;
            }
            let key = (target.clone(), dir);
            if rate_mbit < 0.0 {
                self.throttles.remove(&key);
            } else {
                self.throttles.insert(key, rate_mbit);
            }
        }
    }

    /// Throttle rate towards `target` in `direction`, if throttled.
    ///
    /// For `Both`, the lower of the two directions is reported.
    pub fn rate(&self, target: &Address, direction: Direction) -> Option<f32> {
        let send = self.throttles.get(&(target.clone(), Direction::Send)).copied();
        let recv = self
            .throttles
            .get(&(target.clone(), Direction::Receive))
            .copied();
        match direction {
            Direction::Send => send,
            Direction::Receive => recv,
            Direction::Both => match (send, recv) {
                (Some(s), Some(r)) => Some(s.min(r)),
                (s, r) => s.or(r),
            },
        }
    }

    /// Whether traffic towards `target` is blackholed in `direction`.
    pub fn is_blackholed(&self, target: &Address, direction: Direction) -> bool {
        self.rate(target, direction) == Some(0.0)
    }

    /// Drop the link to `target`.
    pub fn apply_disconnect(&mut self, target: &Address, abort: bool) {
        self.disconnected.insert(target.clone(), abort);
    }

    /// Whether the link to `target` was dropped.
    pub fn is_disconnected(&self, target: &Address) -> bool {
        self.disconnected.contains_key(target)
    }

    /// Whether the link to `target` was aborted rather than closed.
    pub fn was_aborted(&self, target: &Address) -> bool {
        self.disconnected.get(target).copied().unwrap_or(false)
    }

    /// Forget every fault.
    pub fn clear(&mut self) {
        self.throttles.clear();
        self.disconnected.clear();
    }

    /// Number of faulted links.
    pub fn len(&self) -> usize {
        self.throttles.len() + self.disconnected.len()
    }

    /// Whether every link is healthy.
    pub fn is_empty(&self) -> bool {
        self.throttles.is_empty() && self.disconnected.is_empty()
    }
}
