//! RTR protocol data units and their binary encoding (RFC 6810, RFC 8210).
//!
//! Every PDU starts with an eight byte header:
//!
//! ```text
//! 0          8          16                    32
//! +----------+----------+---------------------+
//! | version  | pdu type | type-specific field |
//! +----------+----------+---------------------+
//! |            length (header included)       |
//! +-------------------------------------------+
//! ```
//!
//! All integers are big-endian. Decoding selects the [`Pdu`] variant from the
//! type byte and checks the declared length against both the type's layout
//! and the number of bytes supplied. Reserved fields and unused flag bits
//! must be zero, so a decoded PDU re-encodes to exactly the input bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::announcement::{Announcement, IpPrefix};
use crate::error::{DecodeError, EncodeError, ParseError, Result};
use crate::serial::SerialNumber;
use crate::types::{Asn, ProtocolVersion, SessionId, Timing};

/// Length of the common PDU header.
pub const HEADER_LENGTH: usize = 8;

/// Largest PDU accepted from a peer.
pub const MAX_PDU_LENGTH: u32 = 64 * 1024;

/// Length of a router key's subject key identifier.
pub const SKI_LENGTH: usize = 20;

/// Wire type bytes.
pub mod pdu_type {
    pub const SERIAL_NOTIFY: u8 = 0;
    pub const SERIAL_QUERY: u8 = 1;
    pub const RESET_QUERY: u8 = 2;
    pub const CACHE_RESPONSE: u8 = 3;
    pub const IPV4_PREFIX: u8 = 4;
    pub const IPV6_PREFIX: u8 = 6;
    pub const END_OF_DATA: u8 = 7;
    pub const CACHE_RESET: u8 = 8;
    pub const ROUTER_KEY: u8 = 9;
    pub const ERROR_REPORT: u8 = 10;
}

mod lengths {
    pub const SERIAL_NOTIFY: u32 = 12;
    pub const SERIAL_QUERY: u32 = 12;
    pub const RESET_QUERY: u32 = 8;
    pub const CACHE_RESPONSE: u32 = 8;
    pub const IPV4_PREFIX: u32 = 20;
    pub const IPV6_PREFIX: u32 = 32;
    pub const END_OF_DATA_V0: u32 = 12;
    pub const END_OF_DATA_V1: u32 = 24;
    pub const CACHE_RESET: u32 = 8;
    /// Header, SKI and ASN; the public key follows.
    pub const ROUTER_KEY_MIN: u32 = 32;
    /// Header and the two length fields.
    pub const ERROR_REPORT_MIN: u32 = 16;
}

/// Announce or withdraw, carried in bit 0 of the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flags {
    Withdraw,
    Announce,
}

impl Flags {
    pub const fn as_u8(&self) -> u8 {
        match self {
            Flags::Withdraw => 0,
            Flags::Announce => 1,
        }
    }

    /// Parse a flags byte. Bits 1-7 are reserved and must be zero.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Flags::Withdraw),
            1 => Some(Flags::Announce),
            _ => None,
        }
    }
}

/// Error codes carried by an Error Report PDU (RFC 8210 section 12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CorruptData,
    InternalError,
    NoDataAvailable,
    InvalidRequest,
    UnsupportedProtocolVersion,
    UnsupportedPduType,
    WithdrawalOfUnknownRecord,
    DuplicateAnnouncementReceived,
    UnexpectedProtocolVersion,
    /// A code this implementation does not know.
    Other(u16),
}

impl ErrorCode {
    pub const fn as_u16(&self) -> u16 {
        match self {
            ErrorCode::CorruptData => 0,
            ErrorCode::InternalError => 1,
            ErrorCode::NoDataAvailable => 2,
            ErrorCode::InvalidRequest => 3,
            ErrorCode::UnsupportedProtocolVersion => 4,
            ErrorCode::UnsupportedPduType => 5,
            ErrorCode::WithdrawalOfUnknownRecord => 6,
            ErrorCode::DuplicateAnnouncementReceived => 7,
            ErrorCode::UnexpectedProtocolVersion => 8,
            ErrorCode::Other(code) => *code,
        }
    }

    pub const fn from_u16(code: u16) -> Self {
        match code {
            0 => ErrorCode::CorruptData,
            1 => ErrorCode::InternalError,
            2 => ErrorCode::NoDataAvailable,
            3 => ErrorCode::InvalidRequest,
            4 => ErrorCode::UnsupportedProtocolVersion,
            5 => ErrorCode::UnsupportedPduType,
            6 => ErrorCode::WithdrawalOfUnknownRecord,
            7 => ErrorCode::DuplicateAnnouncementReceived,
            8 => ErrorCode::UnexpectedProtocolVersion,
            other => ErrorCode::Other(other),
        }
    }

    /// Every error except "No Data Available" terminates the session.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, ErrorCode::NoDataAvailable)
    }
}

/// Body of an IPv4 or IPv6 Prefix PDU.
///
/// The address is kept as received; conversion to an [`Announcement`]
/// validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefixPdu<A> {
    pub flags: Flags,
    pub prefix_length: u8,
    pub max_length: u8,
    pub prefix: A,
    pub asn: Asn,
}

impl<A: Into<IpAddr> + Copy> PrefixPdu<A> {
    /// The announcement this PDU describes, with an explicit maximum length.
    pub fn announcement(&self) -> std::result::Result<Announcement, ParseError> {
        let prefix = IpPrefix::new(self.prefix.into(), self.prefix_length)?;
        Announcement::new(self.asn, prefix, Some(self.max_length))
    }
}

/// Body of a Router Key PDU (version 1 only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouterKey {
    pub flags: Flags,
    pub subject_key_identifier: [u8; SKI_LENGTH],
    pub asn: Asn,
    pub subject_public_key_info: Bytes,
}

/// Body of an Error Report PDU.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorReport {
    pub code: ErrorCode,
    /// Copy of the PDU that caused the error; may be empty.
    pub offending_pdu: Bytes,
    pub text: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, offending_pdu: impl Into<Bytes>, text: impl Into<String>) -> Self {
        Self {
            code,
            offending_pdu: offending_pdu.into(),
            text: text.into(),
        }
    }
}

/// An RTR protocol message.
///
/// Variants map one-to-one onto wire type bytes; see [`Pdu::pdu_type`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pdu {
    SerialNotify {
        session_id: SessionId,
        serial: SerialNumber,
    },
    SerialQuery {
        session_id: SessionId,
        serial: SerialNumber,
    },
    ResetQuery,
    CacheResponse {
        session_id: SessionId,
    },
    Ipv4Prefix(PrefixPdu<Ipv4Addr>),
    Ipv6Prefix(PrefixPdu<Ipv6Addr>),
    EndOfData {
        session_id: SessionId,
        serial: SerialNumber,
        /// Present in version 1; absent when decoded from version 0.
        timing: Option<Timing>,
    },
    CacheReset,
    RouterKey(RouterKey),
    ErrorReport(ErrorReport),
}

/// A parsed PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: ProtocolVersion,
    pub pdu_type: u8,
    pub field: u16,
    pub length: u32,
}

impl Header {
    /// Parse and validate the first eight bytes of a PDU.
    ///
    /// Checks the version, that the type exists for that version, and that
    /// the declared length fits the type's layout and [`MAX_PDU_LENGTH`].
    /// Only the header bytes are needed, so a stream reader can reject a bad
    /// PDU before buffering its body.
    pub fn parse(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_LENGTH {
            return Err(DecodeError::Malformed(format!(
                "truncated header: {} bytes",
                buf.len()
            )));
        }
        let mut buf = &buf[..HEADER_LENGTH];
        let raw_version = buf.get_u8();
        let version =
            ProtocolVersion::from_u8(raw_version).ok_or(DecodeError::UnsupportedVersion(raw_version))?;
        let pdu_type = buf.get_u8();
        let field = buf.get_u16();
        let length = buf.get_u32();

        match expected_length(version, pdu_type)? {
            Some(expected) if length != expected => Err(DecodeError::Malformed(format!(
                "length of {} PDU must be {}, was {}",
                type_name(pdu_type),
                expected,
                length
            ))),
            None if length < minimum_length(pdu_type) || length > MAX_PDU_LENGTH => {
                Err(DecodeError::Malformed(format!(
                    "length of {} PDU must be between {} and {}, was {}",
                    type_name(pdu_type),
                    minimum_length(pdu_type),
                    MAX_PDU_LENGTH,
                    length
                )))
            }
            _ => Ok(Header {
                version,
                pdu_type,
                field,
                length,
            }),
        }
    }
}

/// The fixed length of a PDU type, or `None` for variable-length types.
///
/// Fails for types unknown to `version`.
pub fn expected_length(version: ProtocolVersion, pdu_type: u8) -> Result<Option<u32>> {
    let length = match pdu_type {
        pdu_type::SERIAL_NOTIFY => Some(lengths::SERIAL_NOTIFY),
        pdu_type::SERIAL_QUERY => Some(lengths::SERIAL_QUERY),
        pdu_type::RESET_QUERY => Some(lengths::RESET_QUERY),
        pdu_type::CACHE_RESPONSE => Some(lengths::CACHE_RESPONSE),
        pdu_type::IPV4_PREFIX => Some(lengths::IPV4_PREFIX),
        pdu_type::IPV6_PREFIX => Some(lengths::IPV6_PREFIX),
        pdu_type::END_OF_DATA => Some(match version {
            ProtocolVersion::V0 => lengths::END_OF_DATA_V0,
            ProtocolVersion::V1 => lengths::END_OF_DATA_V1,
        }),
        pdu_type::CACHE_RESET => Some(lengths::CACHE_RESET),
        pdu_type::ROUTER_KEY if version >= ProtocolVersion::V1 => None,
        pdu_type::ERROR_REPORT => None,
        other => {
            return Err(DecodeError::UnsupportedPduType {
                pdu_type: other,
                version: version.as_u8(),
            })
        }
    };
    Ok(length)
}

fn minimum_length(pdu_type: u8) -> u32 {
    match pdu_type {
        pdu_type::ROUTER_KEY => lengths::ROUTER_KEY_MIN,
        pdu_type::ERROR_REPORT => lengths::ERROR_REPORT_MIN,
        _ => HEADER_LENGTH as u32,
    }
}

fn type_name(pdu_type: u8) -> &'static str {
    match pdu_type {
        pdu_type::SERIAL_NOTIFY => "Serial Notify",
        pdu_type::SERIAL_QUERY => "Serial Query",
        pdu_type::RESET_QUERY => "Reset Query",
        pdu_type::CACHE_RESPONSE => "Cache Response",
        pdu_type::IPV4_PREFIX => "IPv4 Prefix",
        pdu_type::IPV6_PREFIX => "IPv6 Prefix",
        pdu_type::END_OF_DATA => "End of Data",
        pdu_type::CACHE_RESET => "Cache Reset",
        pdu_type::ROUTER_KEY => "Router Key",
        pdu_type::ERROR_REPORT => "Error Report",
        _ => "unknown",
    }
}

impl Pdu {
    /// Prefix PDU for an announcement.
    pub fn prefix(flags: Flags, announcement: &Announcement) -> Pdu {
        let prefix = announcement.prefix();
        let prefix_length = prefix.length();
        let max_length = announcement.effective_max_length();
        let asn = announcement.asn();
        match prefix.addr() {
            IpAddr::V4(addr) => Pdu::Ipv4Prefix(PrefixPdu {
                flags,
                prefix_length,
                max_length,
                prefix: addr,
                asn,
            }),
            IpAddr::V6(addr) => Pdu::Ipv6Prefix(PrefixPdu {
                flags,
                prefix_length,
                max_length,
                prefix: addr,
                asn,
            }),
        }
    }

    /// Shorthand for an Error Report PDU.
    pub fn error(code: ErrorCode, offending_pdu: impl Into<Bytes>, text: impl Into<String>) -> Pdu {
        Pdu::ErrorReport(ErrorReport::new(code, offending_pdu, text))
    }

    /// The wire type byte of this PDU.
    pub const fn pdu_type(&self) -> u8 {
        match self {
            Pdu::SerialNotify { .. } => pdu_type::SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => pdu_type::SERIAL_QUERY,
            Pdu::ResetQuery => pdu_type::RESET_QUERY,
            Pdu::CacheResponse { .. } => pdu_type::CACHE_RESPONSE,
            Pdu::Ipv4Prefix(_) => pdu_type::IPV4_PREFIX,
            Pdu::Ipv6Prefix(_) => pdu_type::IPV6_PREFIX,
            Pdu::EndOfData { .. } => pdu_type::END_OF_DATA,
            Pdu::CacheReset => pdu_type::CACHE_RESET,
            Pdu::RouterKey(_) => pdu_type::ROUTER_KEY,
            Pdu::ErrorReport(_) => pdu_type::ERROR_REPORT,
        }
    }

    /// Human-readable PDU name.
    pub fn name(&self) -> &'static str {
        type_name(self.pdu_type())
    }

    /// The flags and announcement carried by a prefix PDU.
    pub fn announcement(&self) -> Option<std::result::Result<(Flags, Announcement), ParseError>> {
        match self {
            Pdu::Ipv4Prefix(p) => Some(p.announcement().map(|a| (p.flags, a))),
            Pdu::Ipv6Prefix(p) => Some(p.announcement().map(|a| (p.flags, a))),
            _ => None,
        }
    }

    /// Number of bytes [`Pdu::encode`] produces under `version`.
    pub fn encoded_len(&self, version: ProtocolVersion) -> usize {
        let length = match self {
            Pdu::SerialNotify { .. } => lengths::SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => lengths::SERIAL_QUERY,
            Pdu::ResetQuery => lengths::RESET_QUERY,
            Pdu::CacheResponse { .. } => lengths::CACHE_RESPONSE,
            Pdu::Ipv4Prefix(_) => lengths::IPV4_PREFIX,
            Pdu::Ipv6Prefix(_) => lengths::IPV6_PREFIX,
            Pdu::EndOfData { .. } => match version {
                ProtocolVersion::V0 => lengths::END_OF_DATA_V0,
                ProtocolVersion::V1 => lengths::END_OF_DATA_V1,
            },
            Pdu::CacheReset => lengths::CACHE_RESET,
            Pdu::RouterKey(key) => {
                return lengths::ROUTER_KEY_MIN as usize + key.subject_public_key_info.len()
            }
            Pdu::ErrorReport(report) => {
                return lengths::ERROR_REPORT_MIN as usize
                    + report.offending_pdu.len()
                    + report.text.len()
            }
        };
        length as usize
    }

    /// Encode this PDU under `version`.
    pub fn encode(&self, version: ProtocolVersion) -> std::result::Result<Bytes, EncodeError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len(version));
        self.encode_into(version, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoding of this PDU to `dst`.
    ///
    /// Fails only for a Router Key under version 0 or a PDU whose length
    /// does not fit the 32-bit length field.
    pub fn encode_into(
        &self,
        version: ProtocolVersion,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), EncodeError> {
        if matches!(self, Pdu::RouterKey(_)) && version < ProtocolVersion::V1 {
            return Err(EncodeError::UnsupportedPduType {
                pdu_type: self.pdu_type(),
                version: version.as_u8(),
            });
        }
        let length = self.encoded_len(version);
        let length_field = u32::try_from(length).map_err(|_| EncodeError::TooLarge(length))?;
        dst.reserve(length);

        dst.put_u8(version.as_u8());
        dst.put_u8(self.pdu_type());
        match self {
            Pdu::SerialNotify { session_id, serial } | Pdu::SerialQuery { session_id, serial } => {
                dst.put_u16(session_id.value());
                dst.put_u32(length_field);
                dst.put_u32(serial.value());
            }
            Pdu::ResetQuery | Pdu::CacheReset => {
                dst.put_u16(0);
                dst.put_u32(length_field);
            }
            Pdu::CacheResponse { session_id } => {
                dst.put_u16(session_id.value());
                dst.put_u32(length_field);
            }
            Pdu::Ipv4Prefix(p) => {
                put_prefix_head(dst, length_field, p.flags, p.prefix_length, p.max_length);
                dst.put_slice(&p.prefix.octets());
                dst.put_u32(p.asn.value());
            }
            Pdu::Ipv6Prefix(p) => {
                put_prefix_head(dst, length_field, p.flags, p.prefix_length, p.max_length);
                dst.put_slice(&p.prefix.octets());
                dst.put_u32(p.asn.value());
            }
            Pdu::EndOfData {
                session_id,
                serial,
                timing,
            } => {
                dst.put_u16(session_id.value());
                dst.put_u32(length_field);
                dst.put_u32(serial.value());
                if version >= ProtocolVersion::V1 {
                    let timing = timing.unwrap_or_default();
                    dst.put_u32(timing.refresh);
                    dst.put_u32(timing.retry);
                    dst.put_u32(timing.expire);
                }
            }
            Pdu::RouterKey(key) => {
                dst.put_u8(key.flags.as_u8());
                dst.put_u8(0);
                dst.put_u32(length_field);
                dst.put_slice(&key.subject_key_identifier);
                dst.put_u32(key.asn.value());
                dst.put_slice(&key.subject_public_key_info);
            }
            Pdu::ErrorReport(report) => {
                dst.put_u16(report.code.as_u16());
                dst.put_u32(length_field);
                dst.put_u32(report.offending_pdu.len() as u32);
                dst.put_slice(&report.offending_pdu);
                dst.put_u32(report.text.len() as u32);
                dst.put_slice(report.text.as_bytes());
            }
        }
        Ok(())
    }

    /// Decode exactly one PDU occupying all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<(ProtocolVersion, Pdu)> {
        let header = Header::parse(bytes)?;
        if header.length as usize != bytes.len() {
            return Err(DecodeError::Malformed(format!(
                "{} PDU declares length {} but {} bytes were supplied",
                type_name(header.pdu_type),
                header.length,
                bytes.len()
            )));
        }

        let mut body = &bytes[HEADER_LENGTH..];
        let session_id = SessionId::new(header.field);
        let pdu = match header.pdu_type {
            pdu_type::SERIAL_NOTIFY => Pdu::SerialNotify {
                session_id,
                serial: SerialNumber::new(body.get_u32()),
            },
            pdu_type::SERIAL_QUERY => Pdu::SerialQuery {
                session_id,
                serial: SerialNumber::new(body.get_u32()),
            },
            pdu_type::RESET_QUERY => {
                require_zero(&header, "type field", header.field)?;
                Pdu::ResetQuery
            }
            pdu_type::CACHE_RESPONSE => Pdu::CacheResponse { session_id },
            pdu_type::IPV4_PREFIX => {
                let (flags, prefix_length, max_length) = get_prefix_head(&header, &mut body)?;
                let mut octets = [0u8; 4];
                body.copy_to_slice(&mut octets);
                Pdu::Ipv4Prefix(PrefixPdu {
                    flags,
                    prefix_length,
                    max_length,
                    prefix: Ipv4Addr::from(octets),
                    asn: Asn::new(body.get_u32()),
                })
            }
            pdu_type::IPV6_PREFIX => {
                let (flags, prefix_length, max_length) = get_prefix_head(&header, &mut body)?;
                let mut octets = [0u8; 16];
                body.copy_to_slice(&mut octets);
                Pdu::Ipv6Prefix(PrefixPdu {
                    flags,
                    prefix_length,
                    max_length,
                    prefix: Ipv6Addr::from(octets),
                    asn: Asn::new(body.get_u32()),
                })
            }
            pdu_type::END_OF_DATA => {
                let serial = SerialNumber::new(body.get_u32());
                let timing = match header.version {
                    ProtocolVersion::V0 => None,
                    ProtocolVersion::V1 => Some(Timing {
                        refresh: body.get_u32(),
                        retry: body.get_u32(),
                        expire: body.get_u32(),
                    }),
                };
                Pdu::EndOfData {
                    session_id,
                    serial,
                    timing,
                }
            }
            pdu_type::CACHE_RESET => {
                require_zero(&header, "type field", header.field)?;
                Pdu::CacheReset
            }
            pdu_type::ROUTER_KEY => {
                let [flags, zero] = header.field.to_be_bytes();
                let flags = parse_flags(&header, flags)?;
                require_zero(&header, "type field", u16::from(zero))?;
                let mut subject_key_identifier = [0u8; SKI_LENGTH];
                body.copy_to_slice(&mut subject_key_identifier);
                let asn = Asn::new(body.get_u32());
                Pdu::RouterKey(RouterKey {
                    flags,
                    subject_key_identifier,
                    asn,
                    subject_public_key_info: Bytes::copy_from_slice(body),
                })
            }
            pdu_type::ERROR_REPORT => Pdu::ErrorReport(decode_error_report(header, body)?),
            other => {
                return Err(DecodeError::UnsupportedPduType {
                    pdu_type: other,
                    version: header.version.as_u8(),
                })
            }
        };
        Ok((header.version, pdu))
    }
}

fn put_prefix_head(dst: &mut BytesMut, length: u32, flags: Flags, prefix_length: u8, max_length: u8) {
    dst.put_u16(0);
    dst.put_u32(length);
    dst.put_u8(flags.as_u8());
    dst.put_u8(prefix_length);
    dst.put_u8(max_length);
    dst.put_u8(0);
}

fn get_prefix_head(header: &Header, body: &mut &[u8]) -> Result<(Flags, u8, u8)> {
    require_zero(header, "type field", header.field)?;
    let flags = parse_flags(header, body.get_u8())?;
    let prefix_length = body.get_u8();
    let max_length = body.get_u8();
    require_zero(header, "reserved byte", u16::from(body.get_u8()))?;
    Ok((flags, prefix_length, max_length))
}

fn parse_flags(header: &Header, value: u8) -> Result<Flags> {
    Flags::from_u8(value).ok_or_else(|| {
        DecodeError::Malformed(format!(
            "{} PDU has reserved flag bits set: {:#04x}",
            type_name(header.pdu_type),
            value
        ))
    })
}

fn require_zero(header: &Header, what: &str, value: u16) -> Result<()> {
    if value == 0 {
        Ok(())
    } else {
        Err(DecodeError::Malformed(format!(
            "{} PDU {} must be zero, was {:#x}",
            type_name(header.pdu_type),
            what,
            value
        )))
    }
}

fn decode_error_report(header: Header, mut body: &[u8]) -> Result<ErrorReport> {
    let pdu_length = body.get_u32() as usize;
    if pdu_length > body.len().saturating_sub(4) {
        return Err(DecodeError::Malformed(format!(
            "encapsulated PDU length {} exceeds remaining {} bytes",
            pdu_length,
            body.len().saturating_sub(4)
        )));
    }
    let offending_pdu = Bytes::copy_from_slice(&body[..pdu_length]);
    body.advance(pdu_length);

    let text_length = body.get_u32() as usize;
    if text_length != body.len() {
        return Err(DecodeError::Malformed(format!(
            "error text length {} does not match remaining {} bytes",
            text_length,
            body.len()
        )));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| DecodeError::Malformed("error text is not valid UTF-8".into()))?
        .to_string();

    Ok(ErrorReport {
        code: ErrorCode::from_u16(header.field),
        offending_pdu,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const V0: ProtocolVersion = ProtocolVersion::V0;
    const V1: ProtocolVersion = ProtocolVersion::V1;

    fn roundtrip(version: ProtocolVersion, pdu: Pdu) {
        let bytes = pdu.encode(version).unwrap();
        assert_eq!(bytes.len(), pdu.encoded_len(version));
        assert_eq!(
            u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize,
            bytes.len(),
            "length field must equal bytes written"
        );
        let (decoded_version, decoded) = Pdu::decode(&bytes).unwrap();
        assert_eq!(decoded_version, version);
        assert_eq!(decoded, pdu);
    }

    fn announcement(asn: u32, prefix: &str, max: Option<u8>) -> Announcement {
        Announcement::new(Asn(asn), prefix.parse().unwrap(), max).unwrap()
    }

    #[test]
    fn test_roundtrip_every_variant() {
        let session_id = SessionId::new(0xBEEF);
        let serial = SerialNumber::new(0xDEADBEEF);
        for version in [V0, V1] {
            roundtrip(version, Pdu::SerialNotify { session_id, serial });
            roundtrip(version, Pdu::SerialQuery { session_id, serial });
            roundtrip(version, Pdu::ResetQuery);
            roundtrip(version, Pdu::CacheResponse { session_id });
            roundtrip(version, Pdu::CacheReset);
            roundtrip(
                version,
                Pdu::error(ErrorCode::InvalidRequest, vec![1, 2, 3], "bad request"),
            );
            roundtrip(version, Pdu::error(ErrorCode::Other(99), Bytes::new(), ""));
        }
        roundtrip(
            V0,
            Pdu::EndOfData {
                session_id,
                serial,
                timing: None,
            },
        );
        roundtrip(
            V1,
            Pdu::EndOfData {
                session_id,
                serial,
                timing: Some(Timing {
                    refresh: 1,
                    retry: 2,
                    expire: 3,
                }),
            },
        );
        roundtrip(
            V1,
            Pdu::RouterKey(RouterKey {
                flags: Flags::Announce,
                subject_key_identifier: [0xAB; SKI_LENGTH],
                asn: Asn(u32::MAX),
                subject_public_key_info: Bytes::from_static(&[0x30, 0x59, 0x30, 0x13]),
            }),
        );
    }

    #[test]
    fn test_roundtrip_prefix_boundaries() {
        for version in [V0, V1] {
            for flags in [Flags::Announce, Flags::Withdraw] {
                for a in [
                    announcement(0, "0.0.0.0/0", None),
                    announcement(u32::MAX, "255.255.255.255/32", Some(32)),
                    announcement(3333, "10.0.0.0/8", Some(24)),
                    announcement(0, "::/0", Some(128)),
                    announcement(u32::MAX, "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff/128", None),
                    announcement(65536, "2001:db8::/32", Some(48)),
                ] {
                    let pdu = Pdu::prefix(flags, &a);
                    roundtrip(version, pdu.clone());
                    let (f, back) = pdu.announcement().unwrap().unwrap();
                    assert_eq!(f, flags);
                    assert_eq!(back, a.normalized());
                }
            }
        }
    }

    #[test]
    fn test_ipv4_prefix_wire_layout() {
        // RFC 8210 section 5.6
        let pdu = Pdu::prefix(Flags::Announce, &announcement(3333, "127.0.0.0/8", Some(18)));
        assert_eq!(
            hex::encode(pdu.encode(V1).unwrap()),
            "0104000000000014010812007f00000000000d05"
        );
    }

    #[test]
    fn test_end_of_data_length_depends_on_version() {
        let pdu = Pdu::EndOfData {
            session_id: SessionId::new(1),
            serial: SerialNumber::new(2),
            timing: None,
        };
        assert_eq!(pdu.encode(V0).unwrap().len(), 12);
        let v1 = pdu.encode(V1).unwrap();
        assert_eq!(v1.len(), 24);
        let (_, decoded) = Pdu::decode(&v1).unwrap();
        assert_eq!(
            decoded,
            Pdu::EndOfData {
                session_id: SessionId::new(1),
                serial: SerialNumber::new(2),
                timing: Some(Timing::default()),
            }
        );
    }

    #[test]
    fn test_router_key_not_in_version_0() {
        let key = Pdu::RouterKey(RouterKey {
            flags: Flags::Announce,
            subject_key_identifier: [0; SKI_LENGTH],
            asn: Asn(1),
            subject_public_key_info: Bytes::new(),
        });
        assert!(matches!(
            key.encode(V0),
            Err(EncodeError::UnsupportedPduType { pdu_type: 9, version: 0 })
        ));

        let mut bytes = key.encode(V1).unwrap().to_vec();
        bytes[0] = 0;
        assert_eq!(
            Pdu::decode(&bytes),
            Err(DecodeError::UnsupportedPduType {
                pdu_type: 9,
                version: 0
            })
        );
    }

    #[test]
    fn test_decode_rejects_truncated_and_overlong() {
        let bytes = Pdu::SerialQuery {
            session_id: SessionId::new(1),
            serial: SerialNumber::new(1),
        }
        .encode(V1)
        .unwrap();

        assert!(matches!(Pdu::decode(&bytes[..4]), Err(DecodeError::Malformed(_))));
        assert!(matches!(Pdu::decode(&bytes[..11]), Err(DecodeError::Malformed(_))));

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(matches!(Pdu::decode(&long), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_declared_length() {
        // Reset Query declaring 12 bytes.
        let bytes = [1, 2, 0, 0, 0, 0, 0, 12, 0, 0, 0, 0];
        let err = Pdu::decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert_eq!(err.error_code(), ErrorCode::CorruptData);
    }

    #[test]
    fn test_decode_rejects_unknown_version_and_type() {
        let err = Pdu::decode(&[2, 2, 0, 0, 0, 0, 0, 8]).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedVersion(2));
        assert_eq!(err.error_code(), ErrorCode::UnsupportedProtocolVersion);

        let err = Pdu::decode(&[1, 5, 0, 0, 0, 0, 0, 8]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedPduType {
                pdu_type: 5,
                version: 1
            }
        );
        assert_eq!(err.error_code(), ErrorCode::UnsupportedPduType);
    }

    #[test]
    fn test_decode_error_report_validates_nested_lengths() {
        let good = Pdu::error(ErrorCode::CorruptData, vec![9; 4], "oops")
            .encode(V1)
            .unwrap();

        // Encapsulated PDU length larger than the body.
        let mut bad = good.to_vec();
        bad[8..12].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));

        // Text length not matching the remainder.
        let mut bad = good.to_vec();
        bad[16..20].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));

        // Invalid UTF-8.
        let mut bad = good.to_vec();
        bad[20] = 0xFF;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_nonzero_reserved_fields() {
        let announcement = Announcement::new(Asn(3333), "10.0.0.0/8".parse().unwrap(), Some(8)).unwrap();
        let good = Pdu::prefix(Flags::Announce, &announcement).encode(V1).unwrap();
        assert!(Pdu::decode(&good).is_ok());

        // Reserved flag bit.
        let mut bad = good.to_vec();
        bad[8] = 0x03;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));

        // Zero byte after the maximum length.
        let mut bad = good.to_vec();
        bad[11] = 1;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));

        // Type field of a prefix PDU.
        let mut bad = good.to_vec();
        bad[3] = 1;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));

        // Type field of Reset Query and Cache Reset.
        assert!(matches!(Pdu::decode(&[1, 2, 0, 7, 0, 0, 0, 8]), Err(DecodeError::Malformed(_))));
        assert!(matches!(Pdu::decode(&[1, 8, 1, 0, 0, 0, 0, 8]), Err(DecodeError::Malformed(_))));

        // Router Key: second type byte and reserved flag bits.
        let key = Pdu::RouterKey(RouterKey {
            flags: Flags::Withdraw,
            subject_key_identifier: [7; SKI_LENGTH],
            asn: Asn(64496),
            subject_public_key_info: Bytes::from_static(&[1, 2, 3]),
        })
        .encode(V1)
        .unwrap();
        assert!(Pdu::decode(&key).is_ok());
        let mut bad = key.to_vec();
        bad[3] = 1;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));
        let mut bad = key.to_vec();
        bad[2] = 0x80;
        assert!(matches!(Pdu::decode(&bad), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decoded_pdu_reencodes_to_input() {
        for bytes in [
            &[1u8, 2, 0, 0, 0, 0, 0, 8][..],
            &[0, 8, 0, 0, 0, 0, 0, 8][..],
            &[1, 1, 0, 9, 0, 0, 0, 12, 0, 0, 0, 4][..],
        ] {
            let (version, pdu) = Pdu::decode(bytes).unwrap();
            assert_eq!(&pdu.encode(version).unwrap()[..], bytes);
        }
    }

    #[test]
    fn test_header_rejects_oversize_variable_pdu() {
        let mut header = [1u8, pdu_type::ERROR_REPORT, 0, 0, 0, 0, 0, 0];
        header[4..8].copy_from_slice(&(MAX_PDU_LENGTH + 1).to_be_bytes());
        assert!(matches!(Header::parse(&header), Err(DecodeError::Malformed(_))));

        header[4..8].copy_from_slice(&15u32.to_be_bytes());
        assert!(matches!(Header::parse(&header), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_error_code_values() {
        for code in 0u16..=8 {
            assert_eq!(ErrorCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(ErrorCode::from_u16(1234), ErrorCode::Other(1234));
        assert!(!ErrorCode::NoDataAvailable.is_fatal());
        assert!(ErrorCode::CorruptData.is_fatal());
    }

    #[test]
    fn test_invalid_prefix_pdu_does_not_convert() {
        let pdu = Pdu::Ipv4Prefix(PrefixPdu {
            flags: Flags::Announce,
            prefix_length: 33,
            max_length: 33,
            prefix: Ipv4Addr::new(10, 0, 0, 0),
            asn: Asn(1),
        });
        assert!(pdu.announcement().unwrap().is_err());
        assert!(Pdu::ResetQuery.announcement().is_none());
    }
}
