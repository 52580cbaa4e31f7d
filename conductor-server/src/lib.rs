//! # conductor-server
//!
//! The conductor process for multi-node tests.
//!
//! This crate implements the coordinating side that:
//! - Accepts TCP connections from player processes and binds each to a role
//! - Runs named barriers across a fixed set of roles, with optional deadline
//! - Sends throttle, disconnect and terminate commands and waits for their acks
//! - Answers address lookups between players
//!
//! ## Architecture
//!
//! ```text
//!  Player a ──┐                        ┌── Player b
//!             │   framed MessagePack   │
//!             ├───────────────────────►│
//!         ┌───┴────────────────────────┴───┐
//!         │           Conductor            │
//!         │  ┌──────────────────────────┐  │
//!         │  │ registry · barrier ·     │  │ ◄── test driver
//!         │  │ pending commands (1 lock)│  │     (open_barrier, throttle, ...)
//!         │  └──────────────────────────┘  │
//!         └────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! - Hello → Done (handshake, first message)
//! - EnterBarrier / FailBarrier → BarrierResult (to every expected role)
//! - GetAddress → AddressReply
//! - Throttle / Disconnect / Terminate → Done, GetAddress → AddressReply (fault acks)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fault;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::{ConductorError, FaultError, ProtocolError};
pub use fault::{CommandAck, CommandHandle};
pub use protocol::{listen, serve};
pub use server::{BarrierHandle, Conductor, ConductorMetrics, ConductorStatus};
