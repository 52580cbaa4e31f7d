//! Fault injection: issuing commands to players and tracking their acks.
//!
//! A command is translated to its wire form, recorded in the pending table
//! and queued on the target node's session, all under the coordinator lock,
//! so a concurrent disconnect either sees the pending entry and fails it or
//! happens before the command is issued.

use crate::error::{FaultError, ProtocolError, ProtocolResult};
use crate::server::{Conductor, CoordinatorState};
use conductor_core::{FailureReason, PendingError};
use conductor_types::{
    AckKind, Address, AddressReply, CommandKind, Direction, FaultCommand, Role, ShutdownOrExit,
};
use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;

/// Completion slot of one pending command.
pub(crate) type AckSender = oneshot::Sender<Result<CommandAck, FaultError>>;

/// Successful completion of a fault command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAck {
    /// The player applied the command.
    Done,
    /// The player reported its address.
    Address(Address),
}

/// Acknowledgement received from a player.
#[derive(Debug, Clone)]
pub(crate) enum InboundAck {
    Done,
    Failed(String),
    Address(AddressReply),
}

/// Handle to an issued command.
#[derive(Debug)]
pub struct CommandHandle {
    node: Role,
    kind: CommandKind,
    id: u64,
    rx: Option<oneshot::Receiver<Result<CommandAck, FaultError>>>,
    conductor: Weak<Conductor>,
}

impl CommandHandle {
    /// Handle for a command that completed locally.
    fn completed(node: Role, kind: CommandKind) -> Self {
        Self {
            node,
            kind,
            id: 0,
            rx: None,
            conductor: Weak::new(),
        }
    }

    /// Target node.
    pub fn node(&self) -> &Role {
        &self.node
    }

    /// Command kind.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Wait for the player's acknowledgement.
    pub async fn wait(self) -> Result<CommandAck, FaultError> {
        match self.rx {
            None => Ok(CommandAck::Done),
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(FaultError::SessionLost(self.node))),
        }
    }

    /// Wait at most `after` for the acknowledgement.
    ///
    /// On timeout the pending entry is dropped, so a late ack is ignored and
    /// the same kind of command can be issued again.
    pub async fn wait_timeout(mut self, after: Duration) -> Result<CommandAck, FaultError> {
        let Some(rx) = self.rx.take() else {
            return Ok(CommandAck::Done);
        };

        match tokio::time::timeout(after, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FaultError::SessionLost(self.node)),
            Err(_) => {
                if let Some(conductor) = self.conductor.upgrade() {
                    conductor.cancel_command(&self.node, self.id);
                }
                tracing::warn!(
                    "{} to {} not acknowledged within {:?}",
                    self.kind,
                    self.node,
                    after
                );
                Err(FaultError::Timeout {
                    node: self.node,
                    kind: self.kind,
                    after,
                })
            }
        }
    }
}

impl Conductor {
    /// Send `command` to its node.
    ///
    /// `Remove` completes locally and never reaches the player.
    pub fn issue(&self, command: FaultCommand) -> Result<CommandHandle, FaultError> {
        let node = command.node().clone();
        let kind = command.kind();

        if kind == CommandKind::Remove {
            self.remove(&node);
            return Ok(CommandHandle::completed(node, kind));
        }

        let mut guard = self.lock();
        let state = &mut *guard;

        let session = state
            .registry
            .lookup(&node)
            .map_err(|_| FaultError::UnknownRole(node.clone()))?
            .handle
            .clone();
        let registry = &state.registry;
        let wire = command.to_wire(|target| {
            registry
                .address_of(target)
                .cloned()
                .ok_or_else(|| FaultError::UnknownRole(target.clone()))
        })?;
        let Some(wire) = wire else {
            return Ok(CommandHandle::completed(node, kind));
        };

        let (tx, rx) = oneshot::channel();
        let id = state
            .pending
            .insert(node.clone(), kind, tx)
            .map_err(|e| match e {
                PendingError::AlreadyPending { node, kind } => {
                    FaultError::CommandPending { node, kind }
                }
                PendingError::Unconfirmed(kind) => FaultError::Send {
                    node: node.clone(),
                    kind,
                },
            })?;

        if !session.send(wire) {
            state.pending.cancel(&node, id);
            return Err(FaultError::Send { node, kind });
        }
        drop(guard);

        self.metrics()
            .commands_issued_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Issued {} to {}", kind, node);

        Ok(CommandHandle {
            node,
            kind,
            id,
            rx: Some(rx),
            conductor: self.weak(),
        })
    }

    /// Throttle the link from `node` to `target` and wait for the ack.
    pub async fn throttle(
        &self,
        node: &Role,
        target: &Role,
        direction: Direction,
        rate_mbit: f32,
    ) -> Result<(), FaultError> {
        self.issue_and_wait(FaultCommand::Throttle {
            node: node.clone(),
            target: target.clone(),
            direction,
            rate_mbit,
        })
        .await
        .map(|_| ())
    }

    /// Drop the link from `node` to `target` and wait for the ack.
    pub async fn disconnect(
        &self,
        node: &Role,
        target: &Role,
        abort: bool,
    ) -> Result<(), FaultError> {
        self.issue_and_wait(FaultCommand::Disconnect {
            node: node.clone(),
            target: target.clone(),
            abort,
        })
        .await
        .map(|_| ())
    }

    /// Shut down or exit `node` and wait for the ack.
    pub async fn terminate(
        &self,
        node: &Role,
        shutdown_or_exit: ShutdownOrExit,
    ) -> Result<(), FaultError> {
        self.issue_and_wait(FaultCommand::Terminate {
            node: node.clone(),
            shutdown_or_exit,
        })
        .await
        .map(|_| ())
    }

    /// Ask `node` for its own address.
    pub async fn get_address(&self, node: &Role) -> Result<Address, FaultError> {
        match self
            .issue_and_wait(FaultCommand::GetAddress { node: node.clone() })
            .await?
        {
            CommandAck::Address(address) => Ok(address),
            CommandAck::Done => Err(FaultError::SessionLost(node.clone())),
        }
    }

    /// Forget `node`: unregister it, fail what waits on it and close its
    /// session. Unknown roles are ignored.
    pub fn remove(&self, node: &Role) {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(entry) = state.registry.remove(node) else {
            tracing::debug!("Remove of unknown role {}", node);
            return;
        };

        let actions = state
            .barrier
            .role_departed(node, FailureReason::Removed(node.clone()));
        self.execute(state, actions);
        self.fail_pending(state, node);
        entry.handle.close();

        tracing::info!("Removed {}", node);
    }

    async fn issue_and_wait(&self, command: FaultCommand) -> Result<CommandAck, FaultError> {
        let timeout = self.config().faults.command_timeout();
        self.issue(command)?.wait_timeout(timeout).await
    }

    /// Complete the pending command an ack belongs to.
    pub(crate) fn acknowledge(&self, role: &Role, ack: InboundAck) -> ProtocolResult<()> {
        let (kind, value, name) = match ack {
            InboundAck::Done => (AckKind::Done, Ok(CommandAck::Done), "Done"),
            InboundAck::Failed(reason) => (AckKind::Done, Err(reason), "CommandFailed"),
            InboundAck::Address(reply) => {
                if &reply.node != role {
                    return Err(ProtocolError::RoleMismatch {
                        session: role.clone(),
                        claimed: reply.node,
                    });
                }
                (
                    AckKind::AddressReply,
                    Ok(CommandAck::Address(reply.address)),
                    "AddressReply",
                )
            }
        };

        let completed = self.lock().pending.complete(role, kind);
        let Some(pending) = completed else {
            return Err(ProtocolError::UnsolicitedAck {
                role: role.clone(),
                ack: name,
            });
        };

        // A failure reply takes the place of `Done`
        let result = match value {
            Ok(value) => {
                self.metrics()
                    .commands_acked_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!("{} acknowledged {}", role, pending.kind);
                Ok(value)
            }
            Err(reason) => {
                self.metrics()
                    .commands_failed_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{} rejected {}: {}", role, pending.kind, reason);
                Err(FaultError::Rejected {
                    node: role.clone(),
                    kind: pending.kind,
                    reason,
                })
            }
        };
        let _ = pending.token.send(result);
        Ok(())
    }

    /// Fail every command still waiting on `node`.
    pub(crate) fn fail_pending(&self, state: &mut CoordinatorState, node: &Role) {
        for pending in state.pending.drain_node(node) {
            self.metrics()
                .commands_failed_total
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!("{} to {} failed: session lost", pending.kind, node);
            let _ = pending.token.send(Err(FaultError::SessionLost(node.clone())));
        }
    }

    pub(crate) fn fail_all_pending(&self, state: &mut CoordinatorState) {
        for (node, pending) in state.pending.drain_all() {
            self.metrics()
                .commands_failed_total
                .fetch_add(1, Ordering::Relaxed);
            let _ = pending.token.send(Err(FaultError::SessionLost(node)));
        }
    }

    fn cancel_command(&self, node: &Role, id: u64) {
        if self.lock().pending.cancel(node, id).is_some() {
            self.metrics()
                .commands_failed_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}
