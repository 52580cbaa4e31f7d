//! Identity types for conductor participants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::WireError;

/// Stable logical name of a player for the duration of a test run.
///
/// Equality, hashing and ordering are by name only.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Create a role from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The role name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Network location of a player's actor-system endpoint.
///
/// Rendered as `protocol://system@host:port`. A local address has neither
/// host nor port and renders as `protocol://system`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Transport protocol (e.g. `akka.tcp`).
    pub protocol: String,
    /// Actor system name.
    pub system: String,
    /// Host name or IP, absent for local addresses.
    pub host: Option<String>,
    /// Port, absent for local addresses.
    pub port: Option<u16>,
}

impl Address {
    /// Create a remote address.
    pub fn new(protocol: &str, system: &str, host: &str, port: u16) -> Self {
        Self {
            protocol: protocol.to_string(),
            system: system.to_string(),
            host: Some(host.to_string()),
            port: Some(port),
        }
    }

    /// Create a local (host-less) address.
    pub fn local(protocol: &str, system: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            system: system.to_string(),
            host: None,
            port: None,
        }
    }

    /// Whether the address can be reached from another process.
    pub fn has_global_scope(&self) -> bool {
        self.host.is_some()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.system)?;
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WireError::InvalidAddress(s.to_string());

        let (protocol, rest) = s.split_once("://").ok_or_else(invalid)?;
        if protocol.is_empty() {
            return Err(invalid());
        }

        let Some((system, authority)) = rest.split_once('@') else {
            if rest.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::local(protocol, rest));
        };

        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if system.is_empty() || host.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(protocol, system, host, port))
    }
}
