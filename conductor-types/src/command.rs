//! Local fault commands issued by the test driver.
//!
//! A [`FaultCommand`] names roles, which only the conductor can resolve.
//! It has no serde implementation; [`FaultCommand::to_wire`] is the single
//! mapping from a command to the [`ToPlayer`] message actually transmitted.

use crate::{
    Address, Direction, DisconnectMsg, GetAddress, Role, ShutdownOrExit, TerminateMsg,
    ThrottleMsg, ToPlayer,
};

/// A fault-injection command addressed to exactly one node.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultCommand {
    /// Throttle traffic between `node` and `target`.
    Throttle {
        /// Node whose link is throttled
        node: Role,
        /// Other end of the link
        target: Role,
        /// Which way traffic is throttled
        direction: Direction,
        /// Rate in Mbit/s
        rate_mbit: f32,
    },
    /// Drop the link between `node` and `target`.
    Disconnect {
        /// Node that drops the link
        node: Role,
        /// Other end of the link
        target: Role,
        /// Abort instead of closing gracefully
        abort: bool,
    },
    /// Shut down or exit `node`.
    Terminate {
        /// Node to terminate
        node: Role,
        /// Shutdown mode
        shutdown_or_exit: ShutdownOrExit,
    },
    /// Forget `node` locally. Fire-and-forget, never acknowledged.
    Remove {
        /// Node to remove
        node: Role,
    },
    /// Ask `node` to report its own address.
    GetAddress {
        /// Node to query
        node: Role,
    },
}

/// Command discriminator, used as part of the pending-completion key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    /// [`FaultCommand::Throttle`]
    Throttle,
    /// [`FaultCommand::Disconnect`]
    Disconnect,
    /// [`FaultCommand::Terminate`]
    Terminate,
    /// [`FaultCommand::Remove`]
    Remove,
    /// [`FaultCommand::GetAddress`]
    GetAddress,
}

/// Acknowledgement a confirmed command waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    /// Generic `Done`
    Done,
    /// `AddressReply`
    AddressReply,
}

impl CommandKind {
    /// The acknowledgement this kind of command completes on, if any.
    pub fn expected_ack(self) -> Option<AckKind> {
        match self {
            CommandKind::Throttle | CommandKind::Disconnect | CommandKind::Terminate => {
                Some(AckKind::Done)
            }
            CommandKind::GetAddress => Some(AckKind::AddressReply),
            CommandKind::Remove => None,
        }
    }

    /// Lowercase name for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Throttle => "throttle",
            CommandKind::Disconnect => "disconnect",
            CommandKind::Terminate => "terminate",
            CommandKind::Remove => "remove",
            CommandKind::GetAddress => "get_address",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FaultCommand {
    /// The node the command is delivered to.
    pub fn node(&self) -> &Role {
        match self {
            FaultCommand::Throttle { node, .. }
            | FaultCommand::Disconnect { node, .. }
            | FaultCommand::Terminate { node, .. }
            | FaultCommand::Remove { node }
            | FaultCommand::GetAddress { node } => node,
        }
    }

    /// The other end of the link, for link-scoped commands.
    pub fn target(&self) -> Option<&Role> {
        match self {
            FaultCommand::Throttle { target, .. } | FaultCommand::Disconnect { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// The command discriminator.
    pub fn kind(&self) -> CommandKind {
        match self {
            FaultCommand::Throttle { .. } => CommandKind::Throttle,
            FaultCommand::Disconnect { .. } => CommandKind::Disconnect,
            FaultCommand::Terminate { .. } => CommandKind::Terminate,
            FaultCommand::Remove { .. } => CommandKind::Remove,
            FaultCommand::GetAddress { .. } => CommandKind::GetAddress,
        }
    }

    /// Translate into the wire message sent to [`node`](Self::node).
    ///
    /// `resolve` maps the target role to its registered address; it is only
    /// called for link-scoped commands. `Remove` has no wire form and yields
    /// `Ok(None)`.
    pub fn to_wire<E>(
        &self,
        resolve: impl FnOnce(&Role) -> Result<Address, E>,
    ) -> Result<Option<ToPlayer>, E> {
        let msg = match self {
            FaultCommand::Throttle {
                target,
                direction,
                rate_mbit,
                ..
            } => ToPlayer::Throttle(ThrottleMsg {
                target: resolve(target)?,
                direction: *direction,
                rate_mbit: *rate_mbit,
            }),
            FaultCommand::Disconnect { target, abort, .. } => ToPlayer::Disconnect(DisconnectMsg {
                target: resolve(target)?,
                abort: *abort,
            }),
            FaultCommand::Terminate {
                shutdown_or_exit, ..
            } => ToPlayer::Terminate(TerminateMsg {
                shutdown_or_exit: *shutdown_or_exit,
            }),
            FaultCommand::GetAddress { node } => ToPlayer::GetAddress(GetAddress {
                node: node.clone(),
            }),
            FaultCommand::Remove { .. } => return Ok(None),
        };
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_b(role: &Role) -> Result<Address, String> {
        if role.name() == "b" {
            Ok(Address::new("akka.tcp", "Sys", "10.0.0.2", 2552))
        } else {
            Err(format!("unknown {}", role))
        }
    }

    #[test]
    fn throttle_carries_resolved_address_not_role() {
        let cmd = FaultCommand::Throttle {
            node: Role::new("a"),
            target: Role::new("b"),
            direction: Direction::Send,
            rate_mbit: 1.0,
        };

        let wire = cmd.to_wire(resolve_b).unwrap();
        assert_eq!(
            wire,
            Some(ToPlayer::Throttle(ThrottleMsg {
                target: Address::new("akka.tcp", "Sys", "10.0.0.2", 2552),
                direction: Direction::Send,
                rate_mbit: 1.0,
            }))
        );
    }

    #[test]
    fn unresolvable_target_propagates_error() {
        let cmd = FaultCommand::Disconnect {
            node: Role::new("a"),
            target: Role::new("zzz"),
            abort: false,
        };
        assert_eq!(cmd.to_wire(resolve_b), Err("unknown zzz".to_string()));
    }

    #[test]
    fn terminate_does_not_resolve() {
        let cmd = FaultCommand::Terminate {
            node: Role::new("a"),
            shutdown_or_exit: ShutdownOrExit::Exit(1),
        };
        let wire = cmd
            .to_wire(|_| -> Result<Address, String> { panic!("resolver must not run") })
            .unwrap();
        assert!(matches!(wire, Some(ToPlayer::Terminate(_))));
    }

    #[test]
    fn remove_has_no_wire_form() {
        let cmd = FaultCommand::Remove {
            node: Role::new("a"),
        };
        assert_eq!(cmd.to_wire(resolve_b), Ok(None));
        assert_eq!(cmd.kind().expected_ack(), None);
    }

    #[test]
    fn every_wire_form_is_a_confirmed_message() {
        let commands = [
            FaultCommand::Throttle {
                node: Role::new("a"),
                target: Role::new("b"),
                direction: Direction::Both,
                rate_mbit: 0.0,
            },
            FaultCommand::Disconnect {
                node: Role::new("a"),
                target: Role::new("b"),
                abort: true,
            },
            FaultCommand::Terminate {
                node: Role::new("a"),
                shutdown_or_exit: ShutdownOrExit::Graceful,
            },
            FaultCommand::GetAddress {
                node: Role::new("a"),
            },
        ];

        for cmd in commands {
            let wire = cmd.to_wire(resolve_b).unwrap().unwrap();
            assert!(wire.is_confirmed());
            assert!(cmd.kind().expected_ack().is_some());
            assert_eq!(cmd.node(), &Role::new("a"));
        }
    }
}
