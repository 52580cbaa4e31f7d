//! Protocol messages for the conductor.
//!
//! Messages are split by direction. [`ToPlayer`] holds everything the
//! conductor may send to a player, [`ToConductor`] everything a player may
//! send back. A message that travels both ways (`Done`, `EnterBarrier`, ...)
//! appears in both enums and shares its payload struct.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::{Address, Role, WireError};

mod sealed {
    pub trait Sealed {}
}

/// A message that may be written to a connection.
///
/// Sealed: implemented only for [`ToPlayer`] and [`ToConductor`].
pub trait WireMessage: Serialize + serde::de::DeserializeOwned + sealed::Sealed {
    /// Serialize to MessagePack bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec_named(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// Messages the conductor sends to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToPlayer {
    /// Handshake accepted
    Done,
    /// A barrier was opened that this player is expected in
    EnterBarrier(EnterBarrier),
    /// Another member failed the current barrier explicitly
    FailBarrier(FailBarrier),
    /// Final outcome of a barrier
    BarrierResult(BarrierResult),
    /// Ask the player for its own address
    GetAddress(GetAddress),
    /// Answer to a player's address query
    AddressReply(AddressReply),
    /// Throttle traffic to a target
    Throttle(ThrottleMsg),
    /// Drop the link to a target
    Disconnect(DisconnectMsg),
    /// Shut down or exit the player process
    Terminate(TerminateMsg),
}

/// Messages a player sends to the conductor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToConductor {
    /// Initial handshake
    Hello(Hello),
    /// Arrive at a barrier
    EnterBarrier(EnterBarrier),
    /// Report failure of a barrier
    FailBarrier(FailBarrier),
    /// Ask for another role's address
    GetAddress(GetAddress),
    /// Answer to the conductor's address query
    AddressReply(AddressReply),
    /// Generic acknowledgement of a fault command
    Done,
    /// A fault command could not be applied; takes the place of `Done`
    CommandFailed(CommandFailed),
}

impl sealed::Sealed for ToPlayer {}
impl WireMessage for ToPlayer {}

impl sealed::Sealed for ToConductor {}
impl WireMessage for ToConductor {}

impl ToPlayer {
    /// Short variant name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ToPlayer::Done => "Done",
            ToPlayer::EnterBarrier(_) => "EnterBarrier",
            ToPlayer::FailBarrier(_) => "FailBarrier",
            ToPlayer::BarrierResult(_) => "BarrierResult",
            ToPlayer::GetAddress(_) => "GetAddress",
            ToPlayer::AddressReply(_) => "AddressReply",
            ToPlayer::Throttle(_) => "Throttle",
            ToPlayer::Disconnect(_) => "Disconnect",
            ToPlayer::Terminate(_) => "Terminate",
        }
    }

    /// Whether the player must acknowledge this message.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ToPlayer::GetAddress(_)
                | ToPlayer::Throttle(_)
                | ToPlayer::Disconnect(_)
                | ToPlayer::Terminate(_)
        )
    }
}

impl ToConductor {
    /// Short variant name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ToConductor::Hello(_) => "Hello",
            ToConductor::EnterBarrier(_) => "EnterBarrier",
            ToConductor::FailBarrier(_) => "FailBarrier",
            ToConductor::GetAddress(_) => "GetAddress",
            ToConductor::AddressReply(_) => "AddressReply",
            ToConductor::Done => "Done",
            ToConductor::CommandFailed(_) => "CommandFailed",
        }
    }
}

/// Negative acknowledgement of a throttle or disconnect.
///
/// Sent in place of `Done`, so every command gets exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandFailed {
    /// Why the player could not apply the command.
    pub reason: String,
}

/// Initial handshake message sent by a player on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hello {
    /// Role name the player claims
    pub name: String,
    /// Address of the player's actor system
    pub address: Address,
}

/// Arrival at (or announcement of) a named barrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnterBarrier {
    /// Barrier name
    pub name: String,
    /// Timeout the sender expects, informational
    pub timeout: Option<Duration>,
    /// Role the arrival is reported for, if stated
    pub role: Option<Role>,
}

/// Failure of a named barrier reported by a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailBarrier {
    /// Barrier name
    pub name: String,
    /// Role reporting the failure
    pub role: Role,
}

/// Outcome of a barrier, delivered once to every expected role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarrierResult {
    /// Barrier name
    pub name: String,
    /// Whether all expected roles arrived
    pub success: bool,
}

/// Address query for a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetAddress {
    /// Role whose address is requested
    pub node: Role,
}

/// Answer to [`GetAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressReply {
    /// Role the address belongs to
    pub node: Role,
    /// The resolved address
    pub address: Address,
}

/// Traffic direction a throttle applies to, seen from the throttled node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Outbound traffic only
    Send,
    /// Inbound traffic only
    Receive,
    /// Both directions
    Both,
}

impl Direction {
    /// Whether this direction covers `other`.
    pub fn includes(self, other: Direction) -> bool {
        self == Direction::Both || self == other
    }
}

/// Throttle the link between the receiving player and `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleMsg {
    /// Remote end of the throttled link
    pub target: Address,
    /// Which way traffic is throttled
    pub direction: Direction,
    /// Rate in Mbit/s; `0.0` blackholes the link
    pub rate_mbit: f32,
}

/// Drop the link between the receiving player and `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisconnectMsg {
    /// Remote end of the link
    pub target: Address,
    /// Abort (reset) instead of closing gracefully
    pub abort: bool,
}

/// Terminate the receiving player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminateMsg {
    /// Shutdown mode
    pub shutdown_or_exit: ShutdownOrExit,
}

/// How a terminated player goes down.
///
/// Encoded on the wire as a bare `true` (graceful shutdown) or an integer
/// (process exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownOrExit {
    /// Shut the actor system down gracefully
    Graceful,
    /// Exit the process with the given code
    Exit(i32),
}

impl Serialize for ShutdownOrExit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ShutdownOrExit::Graceful => serializer.serialize_bool(true),
            ShutdownOrExit::Exit(code) => serializer.serialize_i32(*code),
        }
    }
}

impl<'de> Deserialize<'de> for ShutdownOrExit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Shutdown(bool),
            Exit(i32),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Shutdown(true) => Ok(ShutdownOrExit::Graceful),
            Repr::Shutdown(false) => Err(D::Error::custom(
                "shutdown flag must be true; use an exit code instead",
            )),
            Repr::Exit(code) => Ok(ShutdownOrExit::Exit(code)),
        }
    }
}
