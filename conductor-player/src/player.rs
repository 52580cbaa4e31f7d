//! Player - a node's connection to the conductor.
//!
//! # Architecture
//!
//! After the handshake a background task owns the receiving side of the
//! transport and dispatches every message from the conductor:
//!
//! ```text
//! Conductor → Transport → read loop ─┬→ barrier waiter  (BarrierResult)
//!                                    ├→ address waiters (AddressReply)
//!                                    ├→ FaultHandler    (link faults) → Done
//!                                    └→ own address     (GetAddress) → AddressReply
//! ```
//!
//! Barrier and address requests are sent from the caller's task and wait on
//! a oneshot channel filled in by the read loop.

use crate::error::PlayerError;
use crate::handler::FaultHandler;
use crate::transport::{TcpTransport, Transport};
use conductor_types::{
    Address, AddressReply, BarrierResult, CommandFailed, EnterBarrier, FailBarrier, GetAddress,
    Hello, Role, ToConductor, ToPlayer, WireMessage,
};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long to wait for the conductor to answer Hello.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`Player`].
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Conductor address (`host:port` for TCP).
    pub conductor: String,
    /// Role this player registers as.
    pub role: Role,
    /// Actor-system address other players reach this node at.
    pub address: Address,
    /// Deadline for the handshake reply.
    pub handshake_timeout: Duration,
}

impl PlayerConfig {
    /// Create a configuration with the default handshake timeout.
    pub fn new(conductor: impl Into<String>, role: impl Into<Role>, address: Address) -> Self {
        Self {
            conductor: conductor.into(),
            role: role.into(),
            address,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

struct BarrierWaiter {
    name: String,
    tx: oneshot::Sender<bool>,
}

#[derive(Default)]
struct PlayerState {
    connected: bool,
    barrier: Option<BarrierWaiter>,
    address_waiters: HashMap<Role, Vec<oneshot::Sender<Address>>>,
    results: Vec<BarrierResult>,
}

struct Shared<T> {
    role: Role,
    address: Address,
    transport: T,
    handler: Arc<dyn FaultHandler>,
    state: Mutex<PlayerState>,
}

/// A registered player.
///
/// Dropping the player stops its read loop; call [`Player::close`] to also
/// close the connection cleanly.
pub struct Player<T: Transport + 'static = TcpTransport> {
    shared: Arc<Shared<T>>,
    reader: JoinHandle<()>,
}

impl Player<TcpTransport> {
    /// Connect over TCP and register.
    pub async fn connect_tcp(
        config: PlayerConfig,
        handler: Arc<dyn FaultHandler>,
    ) -> Result<Self, PlayerError> {
        Self::connect(config, TcpTransport::new(), handler).await
    }
}

impl<T: Transport + 'static> Player<T> {
    /// Connect to the conductor over `transport` and register the role.
    ///
    /// Sends Hello and waits for the conductor's `Done`. A conductor that
    /// rejects the role (for example because it is taken) closes the
    /// connection instead, which surfaces as a transport error.
    pub async fn connect(
        config: PlayerConfig,
        transport: T,
        handler: Arc<dyn FaultHandler>,
    ) -> Result<Self, PlayerError> {
        transport.connect(&config.conductor).await?;

        let hello = ToConductor::Hello(Hello {
            name: config.role.name().to_string(),
            address: config.address.clone(),
        });
        transport.send(&hello.to_bytes()?).await?;

        let reply = tokio::time::timeout(config.handshake_timeout, transport.recv())
            .await
            .map_err(|_| PlayerError::HandshakeTimeout(config.handshake_timeout))??;
        match ToPlayer::from_bytes(&reply)? {
            ToPlayer::Done => {}
            other => {
                let _ = transport.close().await;
                return Err(PlayerError::ProtocolViolation {
                    expected: "Done",
                    actual: other.kind_name(),
                });
            }
        }
        tracing::info!(
            "Registered as {} with conductor at {}",
            config.role,
            config.conductor
        );

        let shared = Arc::new(Shared {
            role: config.role,
            address: config.address,
            transport,
            handler,
            state: Mutex::new(PlayerState {
                connected: true,
                ..PlayerState::default()
            }),
        });
        let reader = tokio::spawn(read_loop(shared.clone()));

        Ok(Self { shared, reader })
    }

    /// Role this player registered as.
    pub fn role(&self) -> &Role {
        &self.shared.role
    }

    /// Address announced in Hello.
    pub fn address(&self) -> &Address {
        &self.shared.address
    }

    /// Whether the connection to the conductor is still up.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected && self.shared.transport.is_connected()
    }

    /// Every barrier result received so far, oldest first.
    ///
    /// Includes results for barriers this player never entered.
    pub fn barrier_results(&self) -> Vec<BarrierResult> {
        self.shared.lock().results.clone()
    }

    /// Enter barrier `name` and wait until it resolves.
    ///
    /// Returns `Ok(())` when every expected role arrived and
    /// [`PlayerError::BarrierFailed`] otherwise. `timeout` bounds the local
    /// wait and is passed along to the conductor for information only.
    pub async fn enter_barrier(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<(), PlayerError> {
        let rx = {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(PlayerError::NotConnected);
            }
            if let Some(active) = &state.barrier {
                return Err(PlayerError::BarrierInFlight {
                    active: active.name.clone(),
                });
            }
            let (tx, rx) = oneshot::channel();
            state.barrier = Some(BarrierWaiter {
                name: name.to_string(),
                tx,
            });
            rx
        };

        tracing::debug!("{} entering barrier {}", self.shared.role, name);
        let enter = ToConductor::EnterBarrier(EnterBarrier {
            name: name.to_string(),
            timeout,
            role: Some(self.shared.role.clone()),
        });
        if let Err(e) = self.shared.send(&enter).await {
            self.shared.clear_barrier(name);
            return Err(e);
        }

        let resolved = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(resolved) => resolved,
                Err(_) => {
                    self.shared.clear_barrier(name);
                    return Err(PlayerError::BarrierTimeout {
                        name: name.to_string(),
                        after,
                    });
                }
            },
            None => rx.await,
        };

        match resolved {
            Ok(true) => Ok(()),
            Ok(false) => Err(PlayerError::BarrierFailed {
                name: name.to_string(),
            }),
            Err(_) => Err(PlayerError::NotConnected),
        }
    }

    /// Declare barrier `name` failed for everyone.
    ///
    /// A concurrent [`enter_barrier`](Self::enter_barrier) on the same
    /// barrier then returns [`PlayerError::BarrierFailed`].
    pub async fn fail_barrier(&self, name: &str) -> Result<(), PlayerError> {
        tracing::info!("{} failing barrier {}", self.shared.role, name);
        self.shared
            .send(&ToConductor::FailBarrier(FailBarrier {
                name: name.to_string(),
                role: self.shared.role.clone(),
            }))
            .await
    }

    /// Look up the address of `node`.
    ///
    /// Waits until `node` has registered if it has not yet.
    pub async fn get_address(&self, node: &Role) -> Result<Address, PlayerError> {
        let rx = {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(PlayerError::NotConnected);
            }
            let (tx, rx) = oneshot::channel();
            state
                .address_waiters
                .entry(node.clone())
                .or_default()
                .push(tx);
            rx
        };

        self.shared
            .send(&ToConductor::GetAddress(GetAddress { node: node.clone() }))
            .await?;
        rx.await.map_err(|_| PlayerError::NotConnected)
    }

    /// Close the connection to the conductor.
    ///
    /// The conductor treats this like any disconnect: the role is released
    /// and an open barrier that still expected it fails.
    pub async fn close(self) -> Result<(), PlayerError> {
        tracing::info!("{} leaving", self.shared.role);
        let result = self.shared.transport.close().await;
        self.reader.abort();
        self.shared.disconnected();
        result.map_err(PlayerError::from)
    }
}

impl<T: Transport + 'static> Drop for Player<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl<T: Transport> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, msg: &ToConductor) -> Result<(), PlayerError> {
        let bytes = msg.to_bytes()?;
        self.transport.send(&bytes).await?;
        Ok(())
    }

    fn clear_barrier(&self, name: &str) {
        let mut state = self.lock();
        if state.barrier.as_ref().is_some_and(|w| w.name == name) {
            state.barrier = None;
        }
    }

    /// Drop every waiter; their receivers see the connection as gone.
    fn disconnected(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.barrier = None;
        state.address_waiters.clear();
    }

    async fn dispatch(&self, msg: ToPlayer) -> ControlFlow<()> {
        tracing::debug!("{} <- {}", self.role, msg.kind_name());
        match msg {
            ToPlayer::Done => {
                tracing::warn!("{}: unexpected Done from conductor", self.role);
            }
            ToPlayer::EnterBarrier(open) => {
                tracing::debug!("{}: barrier {} is open", self.role, open.name);
            }
            ToPlayer::FailBarrier(failed) => {
                tracing::info!("{}: {} failed barrier {}", self.role, failed.role, failed.name);
            }
            ToPlayer::BarrierResult(result) => self.barrier_resolved(result),
            ToPlayer::AddressReply(reply) => self.address_resolved(reply),
            ToPlayer::GetAddress(query) => {
                if query.node != self.role {
                    tracing::warn!("{}: address query for {}", self.role, query.node);
                }
                let reply = ToConductor::AddressReply(AddressReply {
                    node: self.role.clone(),
                    address: self.address.clone(),
                });
                return self.reply(&reply).await;
            }
            ToPlayer::Throttle(throttle) => {
                let applied = self
                    .handler
                    .throttle(&throttle.target, throttle.direction, throttle.rate_mbit)
                    .await;
                return self.ack(applied, "Throttle").await;
            }
            ToPlayer::Disconnect(disconnect) => {
                let applied = self
                    .handler
                    .disconnect(&disconnect.target, disconnect.abort)
                    .await;
                return self.ack(applied, "Disconnect").await;
            }
            ToPlayer::Terminate(terminate) => {
                // Acknowledge first; the node may not survive termination
                let _ = self.reply(&ToConductor::Done).await;
                self.handler.terminate(terminate.shutdown_or_exit).await;
                if let Err(e) = self.transport.close().await {
                    tracing::debug!("{}: close after terminate failed: {}", self.role, e);
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn barrier_resolved(&self, result: BarrierResult) {
        let mut state = self.lock();
        if state
            .barrier
            .as_ref()
            .is_some_and(|w| w.name == result.name)
        {
            if let Some(waiter) = state.barrier.take() {
                let _ = waiter.tx.send(result.success);
            }
        } else {
            tracing::debug!(
                "{}: result for barrier {} without a waiter",
                self.role,
                result.name
            );
        }
        state.results.push(result);
    }

    fn address_resolved(&self, reply: AddressReply) {
        let waiters = self.lock().address_waiters.remove(&reply.node);
        for tx in waiters.into_iter().flatten() {
            let _ = tx.send(reply.address.clone());
        }
    }

    async fn ack(&self, applied: Result<(), PlayerError>, kind: &str) -> ControlFlow<()> {
        match applied {
            Ok(()) => self.reply(&ToConductor::Done).await,
            Err(e) => {
                tracing::warn!("{}: could not apply {}: {}", self.role, kind, e);
                let failed = CommandFailed {
                    reason: e.to_string(),
                };
                self.reply(&ToConductor::CommandFailed(failed)).await
            }
        }
    }

    async fn reply(&self, msg: &ToConductor) -> ControlFlow<()> {
        match self.send(msg).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                tracing::warn!("{}: failed to send {}: {}", self.role, msg.kind_name(), e);
                ControlFlow::Break(())
            }
        }
    }
}

/// Receive and dispatch until the connection ends.
async fn read_loop<T: Transport + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let bytes = match shared.transport.recv().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("{}: connection ended: {}", shared.role, e);
                break;
            }
        };
        let msg = match ToPlayer::from_bytes(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("{}: undecodable message from conductor: {}", shared.role, e);
                break;
            }
        };
        if shared.dispatch(msg).await.is_break() {
            break;
        }
    }
    shared.disconnected();
}
