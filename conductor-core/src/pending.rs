//! Outstanding confirmed fault commands.
//!
//! Commands sent to a node are acknowledged in send order on that node's
//! connection, so completions are matched FIFO per node: an ack completes the
//! oldest pending command waiting for that kind of ack. At most one command of
//! each [`CommandKind`] may be outstanding per node.

use std::collections::{HashMap, VecDeque};

use conductor_types::{AckKind, CommandKind, Role};
use thiserror::Error;

/// Pending-table errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingError {
    /// A command of the same kind is already outstanding for the node.
    #[error("{kind} already pending for {node}")]
    AlreadyPending {
        /// Target node
        node: Role,
        /// Command kind
        kind: CommandKind,
    },

    /// The command kind is never acknowledged.
    #[error("{0} is not a confirmed command")]
    Unconfirmed(CommandKind),
}

/// One outstanding command.
#[derive(Debug)]
pub struct Pending<T> {
    /// Command kind
    pub kind: CommandKind,
    /// Unique id, used to cancel a single entry
    pub id: u64,
    /// Caller-owned completion token (e.g. a oneshot sender)
    pub token: T,
}

/// Per-node FIFO of outstanding commands.
#[derive(Debug)]
pub struct PendingCommands<T> {
    by_node: HashMap<Role, VecDeque<Pending<T>>>,
    next_id: u64,
}

impl<T> Default for PendingCommands<T> {
    fn default() -> Self {
        Self {
            by_node: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> PendingCommands<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command sent to `node`. Returns its id.
    pub fn insert(&mut self, node: Role, kind: CommandKind, token: T) -> Result<u64, PendingError> {
        if kind.expected_ack().is_none() {
            return Err(PendingError::Unconfirmed(kind));
        }

        let queue = self.by_node.entry(node.clone()).or_default();
        if queue.iter().any(|p| p.kind == kind) {
            return Err(PendingError::AlreadyPending { node, kind });
        }

        let id = self.next_id;
        self.next_id += 1;
        queue.push_back(Pending { kind, id, token });
        Ok(id)
    }

    /// Complete the oldest command of `node` that waits for `ack`.
    ///
    /// Returns `None` for an unsolicited ack.
    pub fn complete(&mut self, node: &Role, ack: AckKind) -> Option<Pending<T>> {
        let queue = self.by_node.get_mut(node)?;
        let pos = queue
            .iter()
            .position(|p| p.kind.expected_ack() == Some(ack))?;
        let done = queue.remove(pos);
        if queue.is_empty() {
            self.by_node.remove(node);
        }
        done
    }

    /// Remove a single entry, e.g. after its caller stopped waiting.
    pub fn cancel(&mut self, node: &Role, id: u64) -> Option<Pending<T>> {
        let queue = self.by_node.get_mut(node)?;
        let pos = queue.iter().position(|p| p.id == id)?;
        let cancelled = queue.remove(pos);
        if queue.is_empty() {
            self.by_node.remove(node);
        }
        cancelled
    }

    /// Take every outstanding command for `node`, oldest first.
    pub fn drain_node(&mut self, node: &Role) -> Vec<Pending<T>> {
        self.by_node
            .remove(node)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Take every outstanding command.
    pub fn drain_all(&mut self) -> Vec<(Role, Pending<T>)> {
        self.by_node
            .drain()
            .flat_map(|(node, queue)| queue.into_iter().map(move |p| (node.clone(), p)))
            .collect()
    }

    /// Number of outstanding commands for `node`.
    pub fn pending_for(&self, node: &Role) -> usize {
        self.by_node.get(node).map_or(0, VecDeque::len)
    }

    /// Number of outstanding commands.
    pub fn len(&self) -> usize {
        self.by_node.values().map(VecDeque::len).sum()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Role {
        Role::new("a")
    }

    #[test]
    fn done_completes_oldest_done_command() {
        let mut table = PendingCommands::new();
        table.insert(a(), CommandKind::Throttle, "throttle").unwrap();
        table.insert(a(), CommandKind::GetAddress, "addr").unwrap();
        table.insert(a(), CommandKind::Disconnect, "disconnect").unwrap();

        let first = table.complete(&a(), AckKind::Done).unwrap();
        assert_eq!(first.token, "throttle");
        let second = table.complete(&a(), AckKind::Done).unwrap();
        assert_eq!(second.token, "disconnect");
        assert!(table.complete(&a(), AckKind::Done).is_none());

        let reply = table.complete(&a(), AckKind::AddressReply).unwrap();
        assert_eq!(reply.token, "addr");
        assert!(table.is_empty());
    }

    #[test]
    fn same_kind_twice_is_rejected() {
        let mut table = PendingCommands::new();
        table.insert(a(), CommandKind::Throttle, 1).unwrap();

        let err = table.insert(a(), CommandKind::Throttle, 2).unwrap_err();
        assert_eq!(
            err,
            PendingError::AlreadyPending {
                node: a(),
                kind: CommandKind::Throttle
            }
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_kind_on_other_node_is_fine() {
        let mut table = PendingCommands::new();
        table.insert(a(), CommandKind::Terminate, 1).unwrap();
        table.insert(Role::new("b"), CommandKind::Terminate, 2).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.pending_for(&a()), 1);
    }

    #[test]
    fn remove_is_never_pending() {
        let mut table: PendingCommands<()> = PendingCommands::new();
        assert_eq!(
            table.insert(a(), CommandKind::Remove, ()),
            Err(PendingError::Unconfirmed(CommandKind::Remove))
        );
    }

    #[test]
    fn unsolicited_ack_is_ignored() {
        let mut table: PendingCommands<()> = PendingCommands::new();
        assert!(table.complete(&a(), AckKind::Done).is_none());
        assert!(table.complete(&a(), AckKind::AddressReply).is_none());
    }

    #[test]
    fn cancel_only_removes_matching_id() {
        let mut table = PendingCommands::new();
        let throttle = table.insert(a(), CommandKind::Throttle, "t").unwrap();
        table.insert(a(), CommandKind::Terminate, "x").unwrap();

        assert!(table.cancel(&a(), throttle + 100).is_none());
        assert_eq!(table.cancel(&a(), throttle).unwrap().token, "t");
        assert_eq!(table.complete(&a(), AckKind::Done).unwrap().token, "x");
    }

    #[test]
    fn drain_node_leaves_others() {
        let mut table = PendingCommands::new();
        table.insert(a(), CommandKind::Throttle, 1).unwrap();
        table.insert(a(), CommandKind::GetAddress, 2).unwrap();
        table.insert(Role::new("b"), CommandKind::Throttle, 3).unwrap();

        let drained: Vec<_> = table.drain_node(&a()).into_iter().map(|p| p.token).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(table.len(), 1);

        // Slot is free again after draining
        table.insert(a(), CommandKind::Throttle, 4).unwrap();
    }

    #[test]
    fn drain_all_empties_table() {
        let mut table = PendingCommands::new();
        table.insert(a(), CommandKind::Throttle, 1).unwrap();
        table.insert(Role::new("b"), CommandKind::Disconnect, 2).unwrap();

        let mut drained: Vec<_> = table
            .drain_all()
            .into_iter()
            .map(|(r, p)| (r, p.token))
            .collect();
        drained.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(drained, vec![(a(), 1), (Role::new("b"), 2)]);
        assert!(table.is_empty());
    }
}
