//! Barrier rendezvous state machine.
//!
//! At most one barrier is awaited at a time. Operations never block; they
//! return [`Action`]s for the caller to execute:
//!
//! ```text
//!            open                 last enter
//!   Idle ───────────► Awaiting ─────────────────► Publish(success) ─► Idle
//!                        │
//!                        │ fail / timeout / member lost before arriving
//!                        └──────────────────────► Publish(failure) ─► Idle
//! ```
//!
//! Each opened barrier gets a fresh [`BarrierEpoch`]. Timer expiries carry the
//! epoch they were armed for, so a timer that fires after its barrier resolved
//! (or after the same name was reopened) is a no-op.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use conductor_types::Role;
use thiserror::Error;

/// Identity of one opened barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarrierEpoch(u64);

impl BarrierEpoch {
    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BarrierEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a barrier failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The deadline elapsed before every role arrived.
    Timeout,
    /// A member reported failure explicitly.
    Failed(Role),
    /// A member's session disconnected before it arrived.
    SessionLost(Role),
    /// A member was removed by the test driver before it arrived.
    Removed(Role),
    /// The conductor is shutting down.
    Shutdown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Failed(role) => write!(f, "failed by {}", role),
            FailureReason::SessionLost(role) => write!(f, "session of {} lost", role),
            FailureReason::Removed(role) => write!(f, "{} removed", role),
            FailureReason::Shutdown => f.write_str("conductor shutdown"),
        }
    }
}

/// Final outcome of one barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierOutcome {
    /// Barrier name.
    pub name: String,
    /// Barrier identity.
    pub epoch: BarrierEpoch,
    /// `None` on success.
    pub failure: Option<FailureReason>,
    /// Every role that was expected, in name order.
    pub recipients: Vec<Role>,
}

impl BarrierOutcome {
    /// Whether every expected role arrived.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Tell every expected role that the barrier is open.
    Announce {
        /// Barrier name.
        name: String,
        /// Deadline relative to open, if any.
        timeout: Option<Duration>,
        /// Expected roles.
        recipients: Vec<Role>,
    },
    /// Arm the deadline timer for `epoch`.
    StartTimer {
        /// Barrier the timer belongs to.
        epoch: BarrierEpoch,
        /// Delay until expiry.
        timeout: Duration,
    },
    /// Disarm the deadline timer for `epoch`.
    CancelTimer {
        /// Barrier the timer belongs to.
        epoch: BarrierEpoch,
    },
    /// Tell the other members that `failed_by` gave up.
    RelayFailure {
        /// Barrier name.
        name: String,
        /// Role that reported the failure.
        failed_by: Role,
        /// Members other than `failed_by`.
        recipients: Vec<Role>,
    },
    /// Deliver the outcome to every recipient.
    Publish(BarrierOutcome),
}

/// Usage and consistency errors. None of them changes the state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarrierError {
    /// Another barrier is still awaited.
    #[error("barrier busy: {active} is still awaited")]
    BarrierBusy {
        /// Name of the active barrier.
        active: String,
    },

    /// A barrier needs at least one member.
    #[error("barrier {name} has no expected roles")]
    EmptyBarrier {
        /// Requested barrier name.
        name: String,
    },

    /// An expected role is not registered.
    #[error("unknown role {role} for barrier {name}")]
    UnknownRole {
        /// The unregistered role.
        role: Role,
        /// Requested barrier name.
        name: String,
    },

    /// The role is not a member of the active barrier.
    #[error("role {role} is not expected in barrier {name}")]
    UnexpectedRole {
        /// Offending role.
        role: Role,
        /// Active barrier name.
        name: String,
    },

    /// The message refers to a barrier that is not the active one.
    #[error("stale barrier {name} (active: {})", active.as_deref().unwrap_or("none"))]
    StaleBarrier {
        /// Name given in the message.
        name: String,
        /// Name of the active barrier, if any.
        active: Option<String>,
    },
}

/// The barrier currently awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBarrier {
    /// Barrier name.
    pub name: String,
    /// Barrier identity.
    pub epoch: BarrierEpoch,
    /// Roles that must arrive, fixed at open.
    pub expected: BTreeSet<Role>,
    /// Roles that have arrived so far.
    pub arrived: BTreeSet<Role>,
    /// Deadline relative to open.
    pub timeout: Option<Duration>,
}

impl ActiveBarrier {
    /// Expected roles that have not arrived yet.
    pub fn missing(&self) -> impl Iterator<Item = &Role> {
        self.expected.difference(&self.arrived)
    }

    fn outcome(self, failure: Option<FailureReason>) -> BarrierOutcome {
        BarrierOutcome {
            name: self.name,
            epoch: self.epoch,
            failure,
            recipients: self.expected.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BarrierState {
    Idle,
    Awaiting(ActiveBarrier),
}

/// The rendezvous state machine.
#[derive(Debug)]
pub struct BarrierCoordinator {
    state: BarrierState,
    next_epoch: u64,
}

impl Default for BarrierCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierCoordinator {
    /// Create an idle coordinator.
    pub fn new() -> Self {
        Self {
            state: BarrierState::Idle,
            next_epoch: 1,
        }
    }

    /// Whether no barrier is awaited.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, BarrierState::Idle)
    }

    /// The awaited barrier, if any.
    pub fn active(&self) -> Option<&ActiveBarrier> {
        match &self.state {
            BarrierState::Awaiting(active) => Some(active),
            BarrierState::Idle => None,
        }
    }

    /// Open a barrier over `expected` roles.
    ///
    /// `is_registered` is consulted for every expected role.
    pub fn open(
        &mut self,
        name: impl Into<String>,
        expected: impl IntoIterator<Item = Role>,
        timeout: Option<Duration>,
        is_registered: impl Fn(&Role) -> bool,
    ) -> Result<(BarrierEpoch, Vec<Action>), BarrierError> {
        let name = name.into();

        if let BarrierState::Awaiting(active) = &self.state {
            return Err(BarrierError::BarrierBusy {
                active: active.name.clone(),
            });
        }

        let expected: BTreeSet<Role> = expected.into_iter().collect();
        if expected.is_empty() {
            return Err(BarrierError::EmptyBarrier { name });
        }
        if let Some(role) = expected.iter().find(|r| !is_registered(r)) {
            return Err(BarrierError::UnknownRole {
                role: role.clone(),
                name,
            });
        }

        let epoch = BarrierEpoch(self.next_epoch);
        self.next_epoch += 1;

        let mut actions = vec![Action::Announce {
            name: name.clone(),
            timeout,
            recipients: expected.iter().cloned().collect(),
        }];
        if let Some(timeout) = timeout {
            actions.push(Action::StartTimer { epoch, timeout });
        }

        tracing::debug!(
            "Barrier {} {} opened for {} roles (timeout: {:?})",
            name,
            epoch,
            expected.len(),
            timeout
        );

        self.state = BarrierState::Awaiting(ActiveBarrier {
            name,
            epoch,
            expected,
            arrived: BTreeSet::new(),
            timeout,
        });

        Ok((epoch, actions))
    }

    /// Record the arrival of `role` at barrier `name`.
    ///
    /// Re-entry by a role that already arrived is ignored.
    pub fn enter(&mut self, role: &Role, name: &str) -> Result<Vec<Action>, BarrierError> {
        let active = self.awaiting_mut(name)?;

        if !active.expected.contains(role) {
            return Err(BarrierError::UnexpectedRole {
                role: role.clone(),
                name: name.to_string(),
            });
        }

        if !active.arrived.insert(role.clone()) {
            return Ok(vec![]);
        }

        if active.arrived.len() < active.expected.len() {
            return Ok(vec![]);
        }

        Ok(self.resolve(None))
    }

    /// Fail barrier `name` on behalf of member `role`.
    pub fn fail(&mut self, role: &Role, name: &str) -> Result<Vec<Action>, BarrierError> {
        let active = self.awaiting_mut(name)?;

        if !active.expected.contains(role) {
            return Err(BarrierError::UnexpectedRole {
                role: role.clone(),
                name: name.to_string(),
            });
        }

        let relay = Action::RelayFailure {
            name: active.name.clone(),
            failed_by: role.clone(),
            recipients: active.expected.iter().filter(|r| *r != role).cloned().collect(),
        };

        let mut actions = vec![relay];
        actions.extend(self.resolve(Some(FailureReason::Failed(role.clone()))));
        Ok(actions)
    }

    /// Deadline expiry for the barrier identified by `epoch`.
    ///
    /// A no-op when that barrier already resolved.
    pub fn timeout(&mut self, epoch: BarrierEpoch) -> Vec<Action> {
        match &self.state {
            BarrierState::Awaiting(active) if active.epoch == epoch => {
                self.resolve(Some(FailureReason::Timeout))
            }
            _ => vec![],
        }
    }

    /// A member left (session lost or removed).
    ///
    /// Fails the barrier whenever the role was expected, arrived or not: a
    /// departed member could not receive its result.
    pub fn role_departed(&mut self, role: &Role, reason: FailureReason) -> Vec<Action> {
        match &self.state {
            BarrierState::Awaiting(active) if active.expected.contains(role) => {
                self.resolve(Some(reason))
            }
            _ => vec![],
        }
    }

    /// Fail whatever barrier is awaited, e.g. on shutdown.
    pub fn abort(&mut self, reason: FailureReason) -> Vec<Action> {
        if self.is_idle() {
            return vec![];
        }
        self.resolve(Some(reason))
    }

    fn awaiting_mut(&mut self, name: &str) -> Result<&mut ActiveBarrier, BarrierError> {
        let active_name = match &self.state {
            BarrierState::Awaiting(active) if active.name == name => None,
            BarrierState::Awaiting(active) => Some(active.name.clone()),
            BarrierState::Idle => None,
        };

        match &mut self.state {
            BarrierState::Awaiting(active) if active_name.is_none() => Ok(active),
            _ => Err(BarrierError::StaleBarrier {
                name: name.to_string(),
                active: active_name,
            }),
        }
    }

    /// Terminal transition back to `Idle`.
    fn resolve(&mut self, failure: Option<FailureReason>) -> Vec<Action> {
        let BarrierState::Awaiting(active) = std::mem::replace(&mut self.state, BarrierState::Idle)
        else {
            return vec![];
        };

        match &failure {
            None => tracing::debug!("Barrier {} {} released", active.name, active.epoch),
            Some(reason) => tracing::debug!(
                "Barrier {} {} failed: {}",
                active.name,
                active.epoch,
                reason
            ),
        }

        let mut actions = Vec::with_capacity(2);
        if active.timeout.is_some() {
            actions.push(Action::CancelTimer {
                epoch: active.epoch,
            });
        }
        actions.push(Action::Publish(active.outcome(failure)));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<Role> {
        names.iter().map(|n| Role::new(*n)).collect()
    }

    fn all_registered(_: &Role) -> bool {
        true
    }

    fn published(actions: &[Action]) -> Option<&BarrierOutcome> {
        actions.iter().find_map(|a| match a {
            Action::Publish(outcome) => Some(outcome),
            _ => None,
        })
    }

    fn open_abc(coord: &mut BarrierCoordinator, timeout: Option<Duration>) -> BarrierEpoch {
        let (epoch, _) = coord
            .open("checkpoint-1", roles(&["a", "b", "c"]), timeout, all_registered)
            .unwrap();
        epoch
    }

    // ===========================================
    // Open
    // ===========================================

    #[test]
    fn open_announces_and_arms_timer() {
        let mut coord = BarrierCoordinator::new();
        let (epoch, actions) = coord
            .open(
                "b1",
                roles(&["a", "b"]),
                Some(Duration::from_secs(5)),
                all_registered,
            )
            .unwrap();

        assert_eq!(
            actions,
            vec![
                Action::Announce {
                    name: "b1".into(),
                    timeout: Some(Duration::from_secs(5)),
                    recipients: roles(&["a", "b"]),
                },
                Action::StartTimer {
                    epoch,
                    timeout: Duration::from_secs(5)
                },
            ]
        );
        let active = coord.active().unwrap();
        assert!(active.arrived.is_empty());
        assert_eq!(active.missing().count(), 2);
    }

    #[test]
    fn open_without_timeout_has_no_timer() {
        let mut coord = BarrierCoordinator::new();
        let (_, actions) = coord
            .open("b1", roles(&["a"]), None, all_registered)
            .unwrap();
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { .. })));
    }

    #[test]
    fn open_while_awaiting_is_busy() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);

        let err = coord
            .open("other", roles(&["a"]), None, all_registered)
            .unwrap_err();
        assert_eq!(
            err,
            BarrierError::BarrierBusy {
                active: "checkpoint-1".into()
            }
        );
        assert_eq!(coord.active().unwrap().name, "checkpoint-1");
    }

    #[test]
    fn open_rejects_unregistered_role() {
        let mut coord = BarrierCoordinator::new();
        let err = coord
            .open("b1", roles(&["a", "ghost"]), None, |r| r.name() != "ghost")
            .unwrap_err();
        assert!(matches!(err, BarrierError::UnknownRole { role, .. } if role.name() == "ghost"));
        assert!(coord.is_idle());
    }

    #[test]
    fn open_rejects_empty_membership() {
        let mut coord = BarrierCoordinator::new();
        let err = coord
            .open("b1", Vec::new(), None, all_registered)
            .unwrap_err();
        assert!(matches!(err, BarrierError::EmptyBarrier { .. }));
    }

    #[test]
    fn epochs_are_unique_per_open() {
        let mut coord = BarrierCoordinator::new();
        let (e1, _) = coord.open("b", roles(&["a"]), None, all_registered).unwrap();
        coord.enter(&Role::new("a"), "b").unwrap();
        let (e2, _) = coord.open("b", roles(&["a"]), None, all_registered).unwrap();
        assert_ne!(e1, e2);
        assert!(e2 > e1);
    }

    // ===========================================
    // Enter
    // ===========================================

    #[test]
    fn releases_when_all_arrive_in_any_order() {
        let orders = [
            ["a", "b", "c"],
            ["a", "c", "b"],
            ["b", "a", "c"],
            ["b", "c", "a"],
            ["c", "a", "b"],
            ["c", "b", "a"],
        ];

        for order in orders {
            let mut coord = BarrierCoordinator::new();
            open_abc(&mut coord, Some(Duration::from_secs(5)));

            let mut outcomes = Vec::new();
            for name in order {
                let actions = coord.enter(&Role::new(name), "checkpoint-1").unwrap();
                outcomes.extend(published(&actions).cloned());
            }

            assert_eq!(outcomes.len(), 1, "order {:?}", order);
            let outcome = &outcomes[0];
            assert!(outcome.is_success());
            assert_eq!(outcome.recipients, roles(&["a", "b", "c"]));
            assert!(coord.is_idle());
        }
    }

    #[test]
    fn release_cancels_timer() {
        let mut coord = BarrierCoordinator::new();
        let epoch = open_abc(&mut coord, Some(Duration::from_secs(5)));
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();
        coord.enter(&Role::new("b"), "checkpoint-1").unwrap();
        let actions = coord.enter(&Role::new("c"), "checkpoint-1").unwrap();

        assert_eq!(actions[0], Action::CancelTimer { epoch });
        assert!(matches!(actions[1], Action::Publish(_)));
    }

    #[test]
    fn reentry_is_idempotent() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);

        assert!(coord.enter(&Role::new("a"), "checkpoint-1").unwrap().is_empty());
        assert!(coord.enter(&Role::new("a"), "checkpoint-1").unwrap().is_empty());
        assert!(coord.enter(&Role::new("a"), "checkpoint-1").unwrap().is_empty());

        let active = coord.active().unwrap();
        assert_eq!(active.arrived.len(), 1);
        assert_eq!(active.missing().count(), 2);
    }

    #[test]
    fn enter_from_non_member_is_unexpected() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);

        let err = coord.enter(&Role::new("z"), "checkpoint-1").unwrap_err();
        assert!(matches!(err, BarrierError::UnexpectedRole { .. }));
        assert!(coord.active().unwrap().arrived.is_empty());
    }

    #[test]
    fn stale_enter_does_not_touch_active_barrier() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();
        let before = coord.active().cloned();

        let err = coord.enter(&Role::new("b"), "checkpoint-0").unwrap_err();
        assert_eq!(
            err,
            BarrierError::StaleBarrier {
                name: "checkpoint-0".into(),
                active: Some("checkpoint-1".into())
            }
        );
        assert_eq!(coord.active().cloned(), before);
    }

    #[test]
    fn enter_while_idle_is_stale() {
        let mut coord = BarrierCoordinator::new();
        let err = coord.enter(&Role::new("a"), "late").unwrap_err();
        assert!(matches!(err, BarrierError::StaleBarrier { active: None, .. }));
    }

    #[test]
    fn late_arrival_after_release_is_stale() {
        let mut coord = BarrierCoordinator::new();
        coord.open("b", roles(&["a"]), None, all_registered).unwrap();
        coord.enter(&Role::new("a"), "b").unwrap();

        assert!(matches!(
            coord.enter(&Role::new("a"), "b"),
            Err(BarrierError::StaleBarrier { .. })
        ));
    }

    // ===========================================
    // Fail / timeout / departure
    // ===========================================

    #[test]
    fn explicit_fail_reaches_arrived_members_too() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();

        let actions = coord.fail(&Role::new("b"), "checkpoint-1").unwrap();

        assert_eq!(
            actions[0],
            Action::RelayFailure {
                name: "checkpoint-1".into(),
                failed_by: Role::new("b"),
                recipients: roles(&["a", "c"]),
            }
        );
        let outcome = published(&actions).unwrap();
        assert_eq!(outcome.failure, Some(FailureReason::Failed(Role::new("b"))));
        assert_eq!(outcome.recipients, roles(&["a", "b", "c"]));
        assert!(coord.is_idle());
    }

    #[test]
    fn fail_after_resolution_is_stale() {
        let mut coord = BarrierCoordinator::new();
        coord.open("b", roles(&["a"]), None, all_registered).unwrap();
        coord.fail(&Role::new("a"), "b").unwrap();

        assert!(matches!(
            coord.fail(&Role::new("a"), "b"),
            Err(BarrierError::StaleBarrier { .. })
        ));
    }

    #[test]
    fn timeout_fails_everyone() {
        let mut coord = BarrierCoordinator::new();
        let epoch = open_abc(&mut coord, Some(Duration::from_secs(5)));
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();
        coord.enter(&Role::new("b"), "checkpoint-1").unwrap();

        let actions = coord.timeout(epoch);
        let outcome = published(&actions).unwrap();
        assert_eq!(outcome.failure, Some(FailureReason::Timeout));
        assert_eq!(outcome.recipients, roles(&["a", "b", "c"]));
        assert!(coord.is_idle());
    }

    #[test]
    fn timer_losing_the_race_is_noop() {
        let mut coord = BarrierCoordinator::new();
        let epoch = open_abc(&mut coord, Some(Duration::from_secs(5)));
        for r in ["a", "b", "c"] {
            coord.enter(&Role::new(r), "checkpoint-1").unwrap();
        }

        assert!(coord.timeout(epoch).is_empty());
    }

    #[test]
    fn old_timer_does_not_fail_reopened_barrier() {
        let mut coord = BarrierCoordinator::new();
        let old = open_abc(&mut coord, Some(Duration::from_secs(5)));
        coord.fail(&Role::new("a"), "checkpoint-1").unwrap();
        let new = open_abc(&mut coord, Some(Duration::from_secs(5)));

        assert!(coord.timeout(old).is_empty());
        assert_eq!(coord.active().unwrap().epoch, new);
    }

    #[test]
    fn departure_before_arrival_fails_immediately() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, Some(Duration::from_secs(5)));
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();
        coord.enter(&Role::new("b"), "checkpoint-1").unwrap();

        let actions =
            coord.role_departed(&Role::new("c"), FailureReason::SessionLost(Role::new("c")));
        let outcome = published(&actions).unwrap();
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.failure,
            Some(FailureReason::SessionLost(Role::new("c")))
        );
    }

    #[test]
    fn departure_after_arrival_fails_too() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);
        coord.enter(&Role::new("a"), "checkpoint-1").unwrap();

        let actions =
            coord.role_departed(&Role::new("a"), FailureReason::SessionLost(Role::new("a")));
        let outcome = published(&actions).unwrap();
        assert_eq!(
            outcome.failure,
            Some(FailureReason::SessionLost(Role::new("a")))
        );
        assert!(coord.is_idle());

        // The remaining members cannot release it any more
        assert!(matches!(
            coord.enter(&Role::new("b"), "checkpoint-1"),
            Err(BarrierError::StaleBarrier { .. })
        ));
    }

    #[test]
    fn removal_of_arrived_member_fails() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);
        coord.enter(&Role::new("b"), "checkpoint-1").unwrap();

        let actions =
            coord.role_departed(&Role::new("b"), FailureReason::Removed(Role::new("b")));
        assert_eq!(
            published(&actions).unwrap().failure,
            Some(FailureReason::Removed(Role::new("b")))
        );
    }

    #[test]
    fn departure_of_non_member_is_ignored() {
        let mut coord = BarrierCoordinator::new();
        open_abc(&mut coord, None);
        assert!(coord
            .role_departed(&Role::new("x"), FailureReason::Removed(Role::new("x")))
            .is_empty());
        assert!(!coord.is_idle());
    }

    #[test]
    fn abort_when_idle_is_noop() {
        let mut coord = BarrierCoordinator::new();
        assert!(coord.abort(FailureReason::Shutdown).is_empty());

        open_abc(&mut coord, None);
        let actions = coord.abort(FailureReason::Shutdown);
        assert_eq!(
            published(&actions).unwrap().failure,
            Some(FailureReason::Shutdown)
        );
    }

    #[test]
    fn exactly_one_outcome_under_interleaved_events() {
        // After the first terminal transition every further event is a no-op
        // or a stale error, never a second Publish.
        let mut coord = BarrierCoordinator::new();
        let epoch = open_abc(&mut coord, Some(Duration::from_secs(1)));
        let mut publishes = 0;

        let mut count = |actions: Vec<Action>| {
            publishes += actions
                .iter()
                .filter(|a| matches!(a, Action::Publish(_)))
                .count();
        };

        count(coord.enter(&Role::new("a"), "checkpoint-1").unwrap());
        count(coord.role_departed(&Role::new("b"), FailureReason::SessionLost(Role::new("b"))));
        count(coord.timeout(epoch));
        count(coord.enter(&Role::new("c"), "checkpoint-1").unwrap_or_default());
        count(coord.fail(&Role::new("a"), "checkpoint-1").unwrap_or_default());
        count(coord.role_departed(&Role::new("c"), FailureReason::SessionLost(Role::new("c"))));

        assert_eq!(publishes, 1);
    }
}
