//! Transport abstraction for the player.
//!
//! The transport moves whole encoded messages between the player and the
//! conductor; how they are framed on the wire is the transport's business.
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one encoded message
//! - `recv()` waits for the next encoded message
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` take `&self` and may run concurrently: the player
//! keeps one task blocked in `recv()` while acknowledgements and barrier
//! requests are sent from elsewhere.

mod mock;
mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for exchanging conductor protocol messages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the conductor at `address` (`host:port` for TCP).
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one encoded message.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one encoded message.
    ///
    /// Blocks until a message is available or the connection ends.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
