//! Error types for the conductor.

use conductor_core::{BarrierError, RegistryError};
use conductor_types::{CommandKind, Role, WireError};
use std::time::Duration;

/// Main error type for conductor operations.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Protocol error on one session.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Barrier usage error.
    #[error("barrier error: {0}")]
    Barrier(#[from] BarrierError),

    /// Fault command error.
    #[error("fault error: {0}")]
    Fault(#[from] FaultError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while serving one player connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The player sent a message that is not allowed in the current state.
    #[error("protocol violation: expected {expected}, got {actual}")]
    ProtocolViolation {
        /// What the session was waiting for.
        expected: &'static str,
        /// Message type actually received.
        actual: &'static str,
    },

    /// No Hello arrived in time.
    #[error("no Hello within {0:?}")]
    HelloTimeout(Duration),

    /// A barrier message claimed a role other than the session's own.
    #[error("role mismatch: session is {session}, message claims {claimed}")]
    RoleMismatch {
        /// Role bound at handshake.
        session: Role,
        /// Role named in the message.
        claimed: Role,
    },

    /// Registration failed (duplicate role).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Barrier usage error (stale, unexpected role).
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// An acknowledgement arrived with no command waiting for it.
    #[error("unsolicited {ack} from {role}")]
    UnsolicitedAck {
        /// Sender.
        role: Role,
        /// Acknowledgement type.
        ack: &'static str,
    },

    /// The conductor is shutting down and accepts no new players.
    #[error("conductor is shutting down")]
    ShuttingDown,

    /// Framing or codec error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl ProtocolError {
    /// Whether the session must be closed.
    ///
    /// Usage errors are logged and counted but leave the session open.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::RoleMismatch { .. }
                | ProtocolError::Barrier(_)
                | ProtocolError::UnsolicitedAck { .. }
        )
    }
}

/// Fault command errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    /// The node or link target is not registered.
    #[error("unknown role: {0}")]
    UnknownRole(Role),

    /// A command of the same kind is still outstanding for the node.
    #[error("{kind} already pending for {node}")]
    CommandPending {
        /// Target node.
        node: Role,
        /// Command kind.
        kind: CommandKind,
    },

    /// The node's session went away before acknowledging.
    #[error("session of {0} lost before ack")]
    SessionLost(Role),

    /// No ack within the deadline.
    #[error("{kind} to {node} not acknowledged within {after:?}")]
    Timeout {
        /// Target node.
        node: Role,
        /// Command kind.
        kind: CommandKind,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The node could not apply the command.
    #[error("{kind} to {node} rejected: {reason}")]
    Rejected {
        /// Target node.
        node: Role,
        /// Command kind.
        kind: CommandKind,
        /// Reason reported by the node.
        reason: String,
    },

    /// The command could not be queued on the node's connection.
    #[error("failed to send {kind} to {node}")]
    Send {
        /// Target node.
        node: Role,
        /// Command kind.
        kind: CommandKind,
    },
}

/// Result type alias for conductor operations.
pub type Result<T> = std::result::Result<T, ConductorError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_keep_session_open() {
        let stale = ProtocolError::Barrier(BarrierError::StaleBarrier {
            name: "b".into(),
            active: None,
        });
        assert!(!stale.is_fatal());
        assert!(!ProtocolError::RoleMismatch {
            session: Role::new("a"),
            claimed: Role::new("b")
        }
        .is_fatal());
    }

    #[test]
    fn violations_close_session() {
        assert!(ProtocolError::ProtocolViolation {
            expected: "Hello",
            actual: "Done"
        }
        .is_fatal());
        assert!(ProtocolError::HelloTimeout(Duration::from_secs(1)).is_fatal());
        assert!(ProtocolError::Registry(RegistryError::DuplicateRole(Role::new("a"))).is_fatal());
        assert!(ProtocolError::Wire(WireError::ConnectionClosed).is_fatal());
    }

    #[test]
    fn fault_error_messages() {
        let err = FaultError::CommandPending {
            node: Role::new("a"),
            kind: CommandKind::Throttle,
        };
        assert_eq!(err.to_string(), "throttle already pending for a");
        assert_eq!(
            FaultError::SessionLost(Role::new("b")).to_string(),
            "session of b lost before ack"
        );
    }
}
