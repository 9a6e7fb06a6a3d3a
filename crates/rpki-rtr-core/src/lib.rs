//! # RPKI-to-Router Core
//!
//! Pure primitives for the RPKI-to-Router protocol: announcements, serial
//! numbers, deltas and the PDU wire format.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! computation over values, shared by the cache, the session handler and the
//! test tooling.
//!
//! ## Key Types
//!
//! - [`Announcement`] - An (ASN, prefix, maximum length) record
//! - [`SerialNumber`] - A 32-bit serial with RFC 1982 ordering
//! - [`SessionId`] - Identifies one cache lifetime
//! - [`Delta`] - Additions and withdrawals between consecutive serials
//! - [`Pdu`] - A protocol message, see [`pdu`] for the wire layout

pub mod announcement;
pub mod delta;
pub mod error;
pub mod pdu;
pub mod serial;
pub mod types;

pub use announcement::{table_digest, Announcement, IpPrefix};
pub use delta::{compute_delta, Delta};
pub use error::{DecodeError, EncodeError, ParseError};
pub use pdu::{ErrorCode, ErrorReport, Flags, Header, Pdu, PrefixPdu, RouterKey, MAX_PDU_LENGTH};
pub use serial::SerialNumber;
pub use types::{Asn, ProtocolVersion, SessionId, Timing};
