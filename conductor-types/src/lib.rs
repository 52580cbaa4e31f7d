//! # conductor-types
//!
//! Wire format types for the multi-node test conductor protocol.
//!
//! This crate provides the foundational types used across all conductor crates:
//! - [`Role`], [`Address`] - Identity of a player and its actor-system endpoint
//! - [`ToPlayer`], [`ToConductor`] - Protocol messages, one closed enum per direction
//! - [`FaultCommand`] - Local commands issued by the test driver (never serialized)
//! - [`read_message`], [`write_message`] - Length-prefixed framing
//! - [`WireError`] - Error types
//!
//! Only [`ToPlayer`] and [`ToConductor`] implement [`WireMessage`], so a local
//! command cannot be written to a connection without first being translated by
//! [`FaultCommand::to_wire`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod error;
mod frame;
mod ids;
mod messages;

pub use command::{AckKind, CommandKind, FaultCommand};
pub use error::WireError;
pub use frame::{read_frame, read_message, write_frame, write_message, MAX_FRAME_SIZE};
pub use ids::{Address, Role};
pub use messages::{
    AddressReply, BarrierResult, CommandFailed, Direction, DisconnectMsg, EnterBarrier,
    FailBarrier, GetAddress, Hello, ShutdownOrExit, TerminateMsg, ThrottleMsg, ToConductor,
    ToPlayer, WireMessage,
};
