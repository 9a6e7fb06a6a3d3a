//! Strong type definitions for the RTR protocol.
//!
//! Identifiers that travel on the wire are newtypes so they cannot be mixed
//! up with each other or with plain integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// An autonomous system number (32-bit, RFC 6793).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asn(pub u32);

impl Asn {
    /// Create from the raw value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw 32-bit value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl From<u32> for Asn {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl FromStr for Asn {
    type Err = ParseError;

    /// Accepts `AS3333`, `as3333` or a bare `3333`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("AS")
            .or_else(|| trimmed.strip_prefix("as"))
            .unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Asn)
            .map_err(|_| ParseError::InvalidAsn(s.to_string()))
    }
}

/// A 16-bit session identifier.
///
/// Chosen randomly once per cache lifetime. A change tells routers that all
/// serial history they hold is void.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u16);

impl SessionId {
    /// Create from the raw value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Generate a random session id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Generate a random session id guaranteed to differ from `previous`.
    pub fn random_excluding(previous: SessionId) -> Self {
        loop {
            let candidate = Self::random();
            if candidate != previous {
                return candidate;
            }
        }
    }

    /// The raw 16-bit value.
    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RTR protocol version.
///
/// Version 0 is RFC 6810, version 1 is RFC 8210.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V0,
    V1,
}

impl ProtocolVersion {
    /// Highest version this implementation speaks.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V1;

    /// The version byte on the wire.
    pub const fn as_u8(&self) -> u8 {
        match self {
            ProtocolVersion::V0 => 0,
            ProtocolVersion::V1 => 1,
        }
    }

    /// Parse a version byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ProtocolVersion::V0),
            1 => Some(ProtocolVersion::V1),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Timing parameters carried in a version 1 End of Data PDU, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timing {
    /// How long a router waits before polling with a Serial Query.
    pub refresh: u32,
    /// How long a router waits before retrying a failed query.
    pub retry: u32,
    /// How long a router may keep using data it could not refresh.
    pub expire: u32,
}

impl Default for Timing {
    /// RFC 8210 section 6 defaults.
    fn default() -> Self {
        Self {
            refresh: 3600,
            retry: 600,
            expire: 7200,
        }
    }
}
