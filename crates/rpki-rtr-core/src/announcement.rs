//! Announcements: the (ASN, prefix, maximum length) records distributed to
//! routers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::ParseError;
use crate::types::Asn;

/// An IP network: an address with all host bits zero, plus a prefix length.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpPrefix {
    addr: IpAddr,
    length: u8,
}

impl IpPrefix {
    /// Build a prefix, zero-filling any host bits of `addr`.
    pub fn new(addr: IpAddr, length: u8) -> Result<Self, ParseError> {
        let max = max_length_for(&addr);
        if length > max {
            return Err(ParseError::PrefixLengthOutOfRange { length, max });
        }
        let addr = match addr {
            IpAddr::V4(v4) => {
                let mask = if length == 0 { 0 } else { u32::MAX << (32 - length) };
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                let mask = if length == 0 { 0 } else { u128::MAX << (128 - length) };
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };
        Ok(Self { addr, length })
    }

    /// The network address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The prefix length in bits.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Width of the address family in bits: 32 or 128.
    pub fn family_width(&self) -> u8 {
        max_length_for(&self.addr)
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

fn max_length_for(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl fmt::Debug for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.length)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.length)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, length) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidPrefix(s.to_string()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| ParseError::InvalidPrefix(s.to_string()))?;
        let length: u8 = length
            .parse()
            .map_err(|_| ParseError::InvalidPrefix(s.to_string()))?;
        IpPrefix::new(addr, length)
    }
}

impl Serialize for IpPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpPrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A route-origin authorization record.
///
/// Ordered by prefix (IPv4 before IPv6, then address, then length), then
/// maximum length, then ASN, so sets iterate in a stable wire order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Announcement {
    prefix: IpPrefix,
    max_length: Option<u8>,
    asn: Asn,
}

impl Announcement {
    /// Build an announcement. A present `max_length` must lie between the
    /// prefix length and the family width.
    pub fn new(asn: Asn, prefix: IpPrefix, max_length: Option<u8>) -> Result<Self, ParseError> {
        if let Some(max_length) = max_length {
            let limit = prefix.family_width();
            if max_length < prefix.length() || max_length > limit {
                return Err(ParseError::MaxLengthOutOfRange {
                    max_length,
                    length: prefix.length(),
                    limit,
                });
            }
        }
        Ok(Self {
            prefix,
            max_length,
            asn,
        })
    }

    pub fn asn(&self) -> Asn {
        self.asn
    }

    pub fn prefix(&self) -> IpPrefix {
        self.prefix
    }

    /// The maximum length as given, if any.
    pub fn max_length(&self) -> Option<u8> {
        self.max_length
    }

    /// The maximum length sent on the wire: the prefix length when absent.
    pub fn effective_max_length(&self) -> u8 {
        self.max_length.unwrap_or(self.prefix.length())
    }

    /// The same record with the maximum length made explicit.
    ///
    /// Two announcements whose normalized forms are equal produce identical
    /// prefix PDUs.
    pub fn normalized(&self) -> Self {
        Self {
            max_length: Some(self.effective_max_length()),
            ..*self
        }
    }
}

impl fmt::Debug for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_length {
            Some(max) => write!(f, "{} {}-{}", self.asn, self.prefix, max),
            None => write!(f, "{} {}", self.asn, self.prefix),
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Deterministic digest of an announcement table.
///
/// Computed over the normalized records in sorted order, so a server table
/// and a router table that would put the same PDUs on the wire share a
/// digest. Returned as lowercase hex.
pub fn table_digest<'a, I>(announcements: I) -> String
where
    I: IntoIterator<Item = &'a Announcement>,
{
    let normalized: BTreeSet<Announcement> =
        announcements.into_iter().map(Announcement::normalized).collect();

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"rpki-rtr-table-v0:");
    for announcement in &normalized {
        let prefix = announcement.prefix();
        match prefix.addr() {
            IpAddr::V4(v4) => {
                hasher.update(&[4]);
                hasher.update(&v4.octets());
            }
            IpAddr::V6(v6) => {
                hasher.update(&[6]);
                hasher.update(&v6.octets());
            }
        }
        hasher.update(&[prefix.length(), announcement.effective_max_length()]);
        hasher.update(&announcement.asn().value().to_be_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}
