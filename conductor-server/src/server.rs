//! Main Conductor coordination.
//!
//! The Conductor owns the role registry, the barrier state machine, the
//! outstanding fault commands and the barrier timer behind a single lock.
//! Sessions and the test driver reach it through an `Arc<Conductor>`.

use crate::config::Config;
use crate::error::{ProtocolError, ProtocolResult};
use crate::fault::AckSender;
use conductor_core::{
    Action, BarrierCoordinator, BarrierEpoch, BarrierError, BarrierOutcome, FailureReason,
    PendingCommands, RoleRegistry,
};
use conductor_types::{
    Address, AddressReply, BarrierResult, EnterBarrier, FailBarrier, Hello, Role, ToPlayer,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Identity of one accepted connection.
pub type SessionId = Uuid;

/// Instruction queued for a session's writer.
#[derive(Debug)]
pub enum Outbound {
    /// Write a message to the player.
    Send(ToPlayer),
    /// Close the connection.
    Close,
}

/// Cloneable handle to a session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    /// Create a handle with a fresh session id.
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a message. Returns `false` if the session is gone.
    pub fn send(&self, message: ToPlayer) -> bool {
        self.tx.send(Outbound::Send(message)).is_ok()
    }

    /// Ask the session to close its connection.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Operational metrics for monitoring conductor activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct ConductorMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Connections refused because `max_players` was reached.
    pub connections_rejected: AtomicU64,
    /// Successful handshakes.
    pub handshakes_total: AtomicU64,
    /// Protocol and usage errors (stale barriers, violations, ...).
    pub protocol_errors_total: AtomicU64,
    /// Barriers opened.
    pub barriers_opened_total: AtomicU64,
    /// Barriers released with every role arrived.
    pub barriers_succeeded_total: AtomicU64,
    /// Barriers failed (timeout, explicit failure, member lost).
    pub barriers_failed_total: AtomicU64,
    /// Fault commands sent to players.
    pub commands_issued_total: AtomicU64,
    /// Fault commands acknowledged.
    pub commands_acked_total: AtomicU64,
    /// Fault commands that timed out or lost their session.
    pub commands_failed_total: AtomicU64,
}

/// Everything guarded by the coordinator lock.
#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    pub(crate) registry: RoleRegistry<SessionHandle>,
    pub(crate) barrier: BarrierCoordinator,
    pub(crate) pending: PendingCommands<AckSender>,
    waiters: HashMap<BarrierEpoch, oneshot::Sender<BarrierOutcome>>,
    timer: Option<(BarrierEpoch, JoinHandle<()>)>,
    shutting_down: bool,
}

/// Handle returned by [`Conductor::open_barrier`].
#[derive(Debug)]
pub struct BarrierHandle {
    name: String,
    epoch: BarrierEpoch,
    rx: oneshot::Receiver<BarrierOutcome>,
}

impl BarrierHandle {
    /// Barrier name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Barrier identity.
    pub fn epoch(&self) -> BarrierEpoch {
        self.epoch
    }

    /// Wait for the barrier to resolve.
    pub async fn outcome(self) -> BarrierOutcome {
        let BarrierHandle { name, epoch, rx } = self;
        rx.await.unwrap_or_else(|_| BarrierOutcome {
            name,
            epoch,
            failure: Some(FailureReason::Shutdown),
            recipients: Vec::new(),
        })
    }
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConductorStatus {
    /// Registered players in role order.
    pub players: Vec<PlayerStatus>,
    /// Barrier currently awaited.
    pub barrier: Option<BarrierStatus>,
    /// Open connections, including those still in handshake.
    pub connections: usize,
    /// Fault commands waiting for an ack.
    pub pending_commands: usize,
    /// Address requests parked until their role registers.
    pub parked_address_requests: usize,
}

/// One registered player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    /// Role name.
    pub role: Role,
    /// Address announced at handshake.
    pub address: Address,
}

/// The awaited barrier.
#[derive(Debug, Clone, Serialize)]
pub struct BarrierStatus {
    /// Barrier name.
    pub name: String,
    /// Barrier identity.
    pub epoch: u64,
    /// Expected roles.
    pub expected: Vec<Role>,
    /// Roles that arrived so far.
    pub arrived: Vec<Role>,
    /// Deadline in milliseconds, if any.
    pub timeout_ms: Option<u64>,
}

/// The conductor.
pub struct Conductor {
    config: Config,
    this: Weak<Conductor>,
    state: Mutex<CoordinatorState>,
    /// Every accepted connection, registered or not.
    connections: DashMap<SessionId, SessionHandle>,
    metrics: ConductorMetrics,
    started: Instant,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl Conductor {
    /// Create a conductor.
    pub fn new(config: Config) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            state: Mutex::new(CoordinatorState::default()),
            connections: DashMap::new(),
            metrics: ConductorMetrics::default(),
            started: Instant::now(),
            shutdown_tx,
        })
    }

    /// Get the conductor configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &ConductorMetrics {
        &self.metrics
    }

    /// Time since the conductor was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn weak(&self) -> Weak<Conductor> {
        self.this.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===========================================
    // Connections
    // ===========================================

    pub(crate) fn attach(&self, handle: SessionHandle) {
        self.connections.insert(handle.id(), handle);
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Registered roles in name order.
    pub fn roles(&self) -> Vec<Role> {
        self.lock().registry.roles().cloned().collect()
    }

    /// Number of registered players.
    pub fn player_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Address a role announced at handshake.
    pub fn address_of(&self, role: &Role) -> Option<Address> {
        self.lock().registry.address_of(role).cloned()
    }

    /// Bind a role after a valid Hello.
    ///
    /// Queues `Done` for the new player and answers every parked address
    /// request for its role.
    pub(crate) fn handshake(&self, hello: Hello, handle: &SessionHandle) -> ProtocolResult<Role> {
        if hello.name.is_empty() {
            return Err(ProtocolError::ProtocolViolation {
                expected: "non-empty role name",
                actual: "Hello",
            });
        }
        let role = Role::new(hello.name);
        let address = hello.address;

        let mut state = self.lock();
        if state.shutting_down {
            return Err(ProtocolError::ShuttingDown);
        }
        let waiting = state
            .registry
            .register(role.clone(), address.clone(), handle.clone())?;

        handle.send(ToPlayer::Done);
        for requester in &waiting {
            requester.send(ToPlayer::AddressReply(AddressReply {
                node: role.clone(),
                address: address.clone(),
            }));
        }
        let players = state.registry.len();
        drop(state);

        self.metrics.handshakes_total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Player {} registered at {} (players: {}, parked replies: {})",
            role,
            address,
            players,
            waiting.len()
        );
        Ok(role)
    }

    /// Release everything a closed session held.
    ///
    /// Fails the active barrier if the role is one of its members and fails
    /// every command still waiting on the role.
    pub(crate) fn session_closed(&self, id: SessionId, role: Option<&Role>) {
        self.connections.remove(&id);

        let mut guard = self.lock();
        let state = &mut *guard;
        state.registry.drop_interest(|h| h.id() == id);

        let Some(role) = role else {
            return;
        };
        // A removed role, or one re-bound by a newer session, is not ours to release
        if state.registry.unregister(role, |h| h.id() == id).is_none() {
            return;
        }

        tracing::info!("Player {} disconnected", role);
        let actions = state
            .barrier
            .role_departed(role, FailureReason::SessionLost(role.clone()));
        self.execute(state, actions);
        self.fail_pending(state, role);
    }

    // ===========================================
    // Barriers
    // ===========================================

    /// Open a barrier over `roles`.
    ///
    /// Without a `timeout` the configured default applies. Must be called
    /// from within a Tokio runtime when a deadline is armed.
    pub fn open_barrier(
        &self,
        name: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
        timeout: Option<Duration>,
    ) -> Result<BarrierHandle, BarrierError> {
        let name = name.into();
        let timeout = timeout.or_else(|| self.config.barrier.default_timeout());

        let mut guard = self.lock();
        let state = &mut *guard;
        let registry = &state.registry;
        let (epoch, actions) =
            state
                .barrier
                .open(name.clone(), roles, timeout, |r| registry.is_registered(r))?;

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(epoch, tx);
        self.metrics
            .barriers_opened_total
            .fetch_add(1, Ordering::Relaxed);
        self.execute(state, actions);

        tracing::info!("Opened barrier {} {} (timeout: {:?})", name, epoch, timeout);
        Ok(BarrierHandle { name, epoch, rx })
    }

    pub(crate) fn enter_barrier(&self, role: &Role, msg: EnterBarrier) -> ProtocolResult<()> {
        check_claim(role, msg.role.as_ref())?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let actions = state.barrier.enter(role, &msg.name)?;
        tracing::debug!("{} entered barrier {}", role, msg.name);
        self.execute(state, actions);
        Ok(())
    }

    pub(crate) fn fail_barrier(&self, role: &Role, msg: FailBarrier) -> ProtocolResult<()> {
        check_claim(role, Some(&msg.role))?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let actions = state.barrier.fail(role, &msg.name)?;
        self.execute(state, actions);
        Ok(())
    }

    fn barrier_timeout(&self, epoch: BarrierEpoch) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if matches!(&state.timer, Some((armed, _)) if *armed == epoch) {
            // This task is the timer; dropping its handle detaches it
            state.timer = None;
        }
        let actions = state.barrier.timeout(epoch);
        if !actions.is_empty() {
            tracing::warn!("Barrier {} timed out", epoch);
        }
        self.execute(state, actions);
    }

    // ===========================================
    // Address lookup
    // ===========================================

    /// Answer a player's address query, or park it until the role registers.
    pub(crate) fn request_address(&self, requester: &SessionHandle, node: Role) {
        let mut state = self.lock();
        match state.registry.address_of(&node).cloned() {
            Some(address) => {
                requester.send(ToPlayer::AddressReply(AddressReply { node, address }));
            }
            None => {
                tracing::debug!("Parking address request for {} until it registers", node);
                state.registry.park_interest(node, requester.clone());
            }
        }
    }

    // ===========================================
    // Action execution
    // ===========================================

    /// Carry out barrier actions while the lock is held.
    ///
    /// Nothing here blocks: messages go to unbounded session queues and
    /// timers are spawned.
    pub(crate) fn execute(&self, state: &mut CoordinatorState, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Announce {
                    name,
                    timeout,
                    recipients,
                } => {
                    for role in recipients {
                        if let Ok(entry) = state.registry.lookup(&role) {
                            entry.handle.send(ToPlayer::EnterBarrier(EnterBarrier {
                                name: name.clone(),
                                timeout,
                                role: Some(role.clone()),
                            }));
                        }
                    }
                }
                Action::StartTimer { epoch, timeout } => {
                    let conductor = self.weak();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        if let Some(conductor) = conductor.upgrade() {
                            conductor.barrier_timeout(epoch);
                        }
                    });
                    if let Some((_, previous)) = state.timer.replace((epoch, task)) {
                        previous.abort();
                    }
                }
                Action::CancelTimer { epoch } => {
                    if matches!(&state.timer, Some((armed, _)) if *armed == epoch) {
                        if let Some((_, task)) = state.timer.take() {
                            task.abort();
                        }
                    }
                }
                Action::RelayFailure {
                    name,
                    failed_by,
                    recipients,
                } => {
                    tracing::info!("{} failed barrier {}", failed_by, name);
                    for role in recipients {
                        if let Ok(entry) = state.registry.lookup(&role) {
                            entry.handle.send(ToPlayer::FailBarrier(FailBarrier {
                                name: name.clone(),
                                role: failed_by.clone(),
                            }));
                        }
                    }
                }
                Action::Publish(outcome) => self.publish(state, outcome),
            }
        }
    }

    /// Deliver a barrier outcome to every expected role still connected.
    fn publish(&self, state: &mut CoordinatorState, outcome: BarrierOutcome) {
        let result = BarrierResult {
            name: outcome.name.clone(),
            success: outcome.is_success(),
        };

        let mut delivered = 0;
        for role in &outcome.recipients {
            match state.registry.lookup(role) {
                Ok(entry) if entry.handle.send(ToPlayer::BarrierResult(result.clone())) => {
                    delivered += 1;
                }
                _ => tracing::debug!("Skipping result of {} for departed {}", result.name, role),
            }
        }

        match &outcome.failure {
            None => {
                self.metrics
                    .barriers_succeeded_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Barrier {} {} released ({}/{} notified)",
                    outcome.name,
                    outcome.epoch,
                    delivered,
                    outcome.recipients.len()
                );
            }
            Some(reason) => {
                self.metrics
                    .barriers_failed_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Barrier {} {} failed: {} ({}/{} notified)",
                    outcome.name,
                    outcome.epoch,
                    reason,
                    delivered,
                    outcome.recipients.len()
                );
            }
        }

        if let Some(waiter) = state.waiters.remove(&outcome.epoch) {
            let _ = waiter.send(outcome);
        }
    }

    // ===========================================
    // Status & lifecycle
    // ===========================================

    /// Snapshot of players, the awaited barrier and outstanding commands.
    pub fn status(&self) -> ConductorStatus {
        let state = self.lock();
        let players = state
            .registry
            .iter()
            .map(|(role, entry)| PlayerStatus {
                role: role.clone(),
                address: entry.address.clone(),
            })
            .collect();
        let barrier = state.barrier.active().map(|active| BarrierStatus {
            name: active.name.clone(),
            epoch: active.epoch.get(),
            expected: active.expected.iter().cloned().collect(),
            arrived: active.arrived.iter().cloned().collect(),
            timeout_ms: active.timeout.map(|t| t.as_millis() as u64),
        });

        ConductorStatus {
            players,
            barrier,
            connections: self.connections.len(),
            pending_commands: state.pending.len(),
            parked_address_requests: state.registry.interest_count(),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Tear down: fail the awaited barrier and every pending command, forget
    /// all roles and close every connection. Idempotent.
    pub fn shutdown(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;

        let actions = state.barrier.abort(FailureReason::Shutdown);
        self.execute(state, actions);
        if let Some((_, timer)) = state.timer.take() {
            timer.abort();
        }
        self.fail_all_pending(state);
        let players = state.registry.drain().len();
        drop(guard);

        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.shutdown_tx.send_replace(true);
        tracing::info!("Conductor shut down ({} players released)", players);
    }
}

/// A barrier message may only speak for the session's own role.
fn check_claim(session: &Role, claimed: Option<&Role>) -> ProtocolResult<()> {
    match claimed {
        Some(claimed) if claimed != session => Err(ProtocolError::RoleMismatch {
            session: session.clone(),
            claimed: claimed.clone(),
        }),
        _ => Ok(()),
    }
}
