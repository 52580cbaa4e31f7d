//! # conductor-player
//!
//! The player side of the multi-node test conductor.
//!
//! A [`Player`] connects to the conductor, registers its role and then
//! takes part in barriers, looks up the addresses of other roles and obeys
//! fault commands through a pluggable [`FaultHandler`].
//!
//! ```text
//! Test node → Player → Transport → Conductor
//!               ↓
//!          FaultHandler (throttle / disconnect / terminate)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use conductor_player::{Player, PlayerConfig, RecordingFaultHandler};
//! use conductor_types::Address;
//! use std::sync::Arc;
//!
//! let config = PlayerConfig::new(
//!     "127.0.0.1:4711",
//!     "node-a",
//!     Address::new("akka.tcp", "Sys", "127.0.0.1", 2552),
//! );
//! let player = Player::connect_tcp(config, Arc::new(RecordingFaultHandler::new())).await?;
//! player.enter_barrier("started", None).await?;
//! let peer = player.get_address(&"node-b".into()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod handler;
mod player;
pub mod transport;

pub use error::PlayerError;
pub use handler::{FaultHandler, RecordingFaultHandler};
pub use player::{Player, PlayerConfig, DEFAULT_HANDSHAKE_TIMEOUT};
pub use transport::{MockTransport, TcpTransport, Transport, TransportError};

// Re-export types for convenience
pub use conductor_types::{Address, Direction, Role, ShutdownOrExit};
