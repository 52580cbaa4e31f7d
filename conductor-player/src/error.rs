//! Player errors.

use crate::transport::TransportError;
use conductor_types::WireError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Player`](crate::Player) operations.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding or decoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The conductor sent something out of order.
    #[error("protocol violation: expected {expected}, got {actual}")]
    ProtocolViolation {
        /// What the player was waiting for.
        expected: &'static str,
        /// Message type actually received.
        actual: &'static str,
    },

    /// The conductor did not answer Hello in time.
    #[error("no handshake reply within {0:?}")]
    HandshakeTimeout(Duration),

    /// The barrier resolved as failed.
    #[error("barrier {name} failed")]
    BarrierFailed {
        /// Barrier name.
        name: String,
    },

    /// No barrier result arrived within the local deadline.
    #[error("barrier {name} not resolved within {after:?}")]
    BarrierTimeout {
        /// Barrier name.
        name: String,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// This player is already waiting on a barrier.
    #[error("already waiting on barrier {active}")]
    BarrierInFlight {
        /// Barrier being waited on.
        active: String,
    },

    /// The connection to the conductor is gone.
    #[error("not connected")]
    NotConnected,

    /// The fault handler could not apply a command.
    #[error("fault handler failed: {0}")]
    Fault(String),
}
