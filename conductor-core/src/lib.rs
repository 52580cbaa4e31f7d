//! # conductor-core
//!
//! Pure logic for the multi-node test conductor (no I/O, instant tests).
//!
//! This crate implements the rendezvous state machine, the role registry and
//! the bookkeeping for outstanding fault commands without any network or
//! timer I/O.
//!
//! ## Design Philosophy
//!
//! Every module here is **pure**: operations take input and return either a
//! value or a list of [`Action`]s. The conductor server interprets the actions
//! (sending results, arming timers) while holding its coordinator lock, which
//! keeps each transition atomic without this crate knowing about locks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod link;
pub mod pending;
pub mod registry;

pub use barrier::{
    Action, ActiveBarrier, BarrierCoordinator, BarrierEpoch, BarrierError, BarrierOutcome,
    FailureReason,
};
pub use link::LinkFaults;
pub use pending::{Pending, PendingCommands, PendingError};
pub use registry::{RegistryError, RoleEntry, RoleRegistry};
