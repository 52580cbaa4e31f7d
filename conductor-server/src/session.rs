//! Per-connection session management.
//!
//! Each player connection gets a Session that owns the connection, performs
//! the handshake and dispatches inbound messages to the conductor. Inbound
//! frames are decoded by a reader task; the session loop multiplexes them
//! with its outbound queue and is the only writer of the connection.

use crate::error::{ConductorError, ProtocolError};
use crate::fault::InboundAck;
use crate::server::{Conductor, Outbound, SessionHandle, SessionId};
use conductor_types::{read_message, write_message, Address, Role, ToConductor, WireError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Decoded inbound frames buffered ahead of the session loop.
const INBOUND_BUFFER: usize = 64;

/// Session state machine states.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Waiting for Hello.
    AwaitingHello,
    /// Handshake done, role bound.
    Active {
        /// Role from Hello.
        role: Role,
        /// Address from Hello.
        address: Address,
    },
    /// Session is closing.
    Closing,
}

/// A per-connection session.
pub struct Session<S> {
    conductor: Arc<Conductor>,
    peer: String,
    handle: SessionHandle,
    state: SessionState,
    writer: WriteHalf<S>,
    inbound: mpsc::Receiver<Result<ToConductor, WireError>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    reader: JoinHandle<()>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a session for an accepted connection.
    ///
    /// The connection counts toward the conductor's open connections from
    /// here on.
    pub fn new(conductor: Arc<Conductor>, stream: S, peer: impl Into<String>) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_BUFFER);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();

        let max_frame = conductor.config().limits.max_frame_size;
        let reader = tokio::spawn(read_loop(read_half, max_frame, inbound_tx));

        let handle = SessionHandle::new(outbound_tx);
        conductor.attach(handle.clone());

        Self {
            conductor,
            peer: peer.into(),
            handle,
            state: SessionState::AwaitingHello,
            writer,
            inbound,
            outbound,
            reader,
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    /// Run the session until the connection ends.
    ///
    /// Whatever the exit path, the role is released and everything counted
    /// toward it fails.
    pub async fn run(mut self) -> Result<(), ConductorError> {
        tracing::info!("New connection from {} (session {})", self.peer, self.id());

        let result = self.drive().await;
        if let Err(e) = &result {
            self.conductor
                .metrics()
                .protocol_errors_total
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Closing session with {}: {}", self.peer, e);
        }

        let role = match std::mem::replace(&mut self.state, SessionState::Closing) {
            SessionState::Active { role, .. } => Some(role),
            _ => None,
        };
        let _ = self.writer.shutdown().await;
        self.conductor.session_closed(self.id(), role.as_ref());

        result.map_err(ConductorError::from)
    }

    async fn drive(&mut self) -> Result<(), ProtocolError> {
        if !self.await_hello().await? {
            return Ok(());
        }

        loop {
            tokio::select! {
                inbound = self.inbound.recv() => match inbound {
                    Some(Ok(msg)) => self.handle_message(msg)?,
                    Some(Err(WireError::ConnectionClosed)) | None => {
                        tracing::debug!("{} closed the connection", self.peer);
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(e.into()),
                },
                outbound = self.outbound.recv() => match outbound {
                    Some(Outbound::Send(msg)) => {
                        tracing::debug!("-> {}: {}", self.peer, msg.kind_name());
                        write_message(&mut self.writer, &msg).await?;
                    }
                    Some(Outbound::Close) | None => {
                        tracing::debug!("Closing connection to {} on request", self.peer);
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Wait for Hello and register the role.
    ///
    /// Returns `false` if the peer went away or the conductor closed the
    /// session first.
    async fn await_hello(&mut self) -> Result<bool, ProtocolError> {
        let timeout = self.conductor.config().limits.hello_timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let first = loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!("Hello timeout ({:?}) for {}", timeout, self.peer);
                    return Err(ProtocolError::HelloTimeout(timeout));
                }
                inbound = self.inbound.recv() => match inbound {
                    None | Some(Err(WireError::ConnectionClosed)) => return Ok(false),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(msg)) => break msg,
                },
                outbound = self.outbound.recv() => match outbound {
                    Some(Outbound::Send(msg)) => {
                        write_message(&mut self.writer, &msg).await?;
                    }
                    Some(Outbound::Close) | None => {
                        tracing::debug!("Closing connection to {} before Hello", self.peer);
                        return Ok(false);
                    }
                },
            }
        };

        let hello = match first {
            ToConductor::Hello(hello) => hello,
            other => {
                return Err(ProtocolError::ProtocolViolation {
                    expected: "Hello",
                    actual: other.kind_name(),
                })
            }
        };

        let address = hello.address.clone();
        let role = self.conductor.handshake(hello, &self.handle)?;
        self.state = SessionState::Active { role, address };
        Ok(true)
    }

    /// Dispatch one message from an active player.
    ///
    /// Usage errors are logged and counted; only fatal errors end the session.
    fn handle_message(&mut self, msg: ToConductor) -> Result<(), ProtocolError> {
        let SessionState::Active { role, .. } = &self.state else {
            return Err(ProtocolError::ProtocolViolation {
                expected: "Hello",
                actual: msg.kind_name(),
            });
        };
        let role = role.clone();
        tracing::debug!("<- {}: {}", role, msg.kind_name());

        let result = match msg {
            ToConductor::Hello(_) => Err(ProtocolError::ProtocolViolation {
                expected: "no second Hello",
                actual: "Hello",
            }),
            ToConductor::EnterBarrier(enter) => self.conductor.enter_barrier(&role, enter),
            ToConductor::FailBarrier(fail) => self.conductor.fail_barrier(&role, fail),
            ToConductor::GetAddress(query) => {
                self.conductor.request_address(&self.handle, query.node);
                Ok(())
            }
            ToConductor::AddressReply(reply) => self
                .conductor
                .acknowledge(&role, InboundAck::Address(reply)),
            ToConductor::Done => self.conductor.acknowledge(&role, InboundAck::Done),
            ToConductor::CommandFailed(failed) => self
                .conductor
                .acknowledge(&role, InboundAck::Failed(failed.reason)),
        };

        match result {
            Err(e) if !e.is_fatal() => {
                self.conductor
                    .metrics()
                    .protocol_errors_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{}: {}", role, e);
                Ok(())
            }
            other => other,
        }
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Decode frames until the stream fails or the session stops listening.
async fn read_loop<R>(
    mut reader: R,
    max_frame: usize,
    tx: mpsc::Sender<Result<ToConductor, WireError>>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let msg = read_message::<ToConductor, _>(&mut reader, max_frame).await;
        let failed = msg.is_err();
        if tx.send(msg).await.is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use conductor_types::{EnterBarrier, Hello, ToPlayer};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn hello(name: &str) -> ToConductor {
        ToConductor::Hello(Hello {
            name: name.into(),
            address: Address::new("akka.tcp", "Sys", "127.0.0.1", 2552),
        })
    }

    fn spawn_session(
        conductor: &Arc<Conductor>,
    ) -> (DuplexStream, JoinHandle<Result<(), ConductorError>>) {
        let (client, server) = tokio::io::duplex(4096);
        let session = Session::new(conductor.clone(), server, "test");
        (client, tokio::spawn(session.run()))
    }

    async fn recv(client: &mut DuplexStream) -> ToPlayer {
        read_message(client, conductor_types::MAX_FRAME_SIZE)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn hello_is_answered_with_done() {
        let conductor = Conductor::new(Config::default());
        let (mut client, _task) = spawn_session(&conductor);

        write_message(&mut client, &hello("a")).await.unwrap();
        assert_eq!(recv(&mut client).await, ToPlayer::Done);
        assert_eq!(conductor.roles(), vec![Role::new("a")]);
    }

    #[tokio::test]
    async fn first_message_must_be_hello() {
        let conductor = Conductor::new(Config::default());
        let (mut client, task) = spawn_session(&conductor);

        write_message(&mut client, &ToConductor::Done).await.unwrap();
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConductorError::Protocol(ProtocolError::ProtocolViolation { .. }))
        ));
        assert_eq!(conductor.connection_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_connection_still_waiting_for_hello() {
        let conductor = Conductor::new(Config::default());
        let (_client, task) = spawn_session(&conductor);
        assert_eq!(conductor.connection_count(), 1);

        conductor.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(conductor.connection_count(), 0);
    }

    #[tokio::test]
    async fn hello_timeout_closes_connection() {
        let mut config = Config::default();
        config.limits.hello_timeout_secs = 0;
        let conductor = Conductor::new(config);
        let (_client, task) = spawn_session(&conductor);

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConductorError::Protocol(ProtocolError::HelloTimeout(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_role_is_closed() {
        let conductor = Conductor::new(Config::default());
        let (mut first, _t1) = spawn_session(&conductor);
        write_message(&mut first, &hello("a")).await.unwrap();
        assert_eq!(recv(&mut first).await, ToPlayer::Done);

        let (mut second, t2) = spawn_session(&conductor);
        write_message(&mut second, &hello("a")).await.unwrap();
        assert!(matches!(
            t2.await.unwrap(),
            Err(ConductorError::Protocol(ProtocolError::Registry(_)))
        ));
        assert_eq!(conductor.roles(), vec![Role::new("a")]);
    }

    #[tokio::test]
    async fn stale_barrier_keeps_session_open() {
        let conductor = Conductor::new(Config::default());
        let (mut client, task) = spawn_session(&conductor);
        write_message(&mut client, &hello("a")).await.unwrap();
        assert_eq!(recv(&mut client).await, ToPlayer::Done);

        write_message(
            &mut client,
            &ToConductor::EnterBarrier(EnterBarrier {
                name: "nothing-open".into(),
                timeout: None,
                role: None,
            }),
        )
        .await
        .unwrap();

        // Still registered after the usage error
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(conductor.player_count(), 1);
        assert_eq!(
            conductor
                .metrics()
                .protocol_errors_total
                .load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn eof_unregisters_role() {
        let conductor = Conductor::new(Config::default());
        let (mut client, task) = spawn_session(&conductor);
        write_message(&mut client, &hello("a")).await.unwrap();
        assert_eq!(recv(&mut client).await, ToPlayer::Done);

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(conductor.player_count(), 0);
        assert_eq!(conductor.connection_count(), 0);
    }

    #[tokio::test]
    async fn second_hello_is_a_violation() {
        let conductor = Conductor::new(Config::default());
        let (mut client, task) = spawn_session(&conductor);
        write_message(&mut client, &hello("a")).await.unwrap();
        assert_eq!(recv(&mut client).await, ToPlayer::Done);

        write_message(&mut client, &hello("a")).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert_eq!(conductor.player_count(), 0);
    }
}
