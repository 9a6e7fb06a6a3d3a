//! Proptest generators for property-based testing.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use proptest::prelude::*;

use rpki_rtr_core::{
    Announcement, Asn, ErrorCode, Flags, IpPrefix, Pdu, ProtocolVersion, RouterKey, SerialNumber,
    SessionId, Timing,
};

/// Any ASN, weighted toward the edges.
pub fn asn() -> impl Strategy<Value = Asn> {
    prop_oneof![
        1 => Just(Asn(0)),
        1 => Just(Asn(u32::MAX)),
        8 => any::<u32>().prop_map(Asn),
    ]
}

pub fn serial() -> impl Strategy<Value = SerialNumber> {
    any::<u32>().prop_map(SerialNumber::new)
}

pub fn session_id() -> impl Strategy<Value = SessionId> {
    any::<u16>().prop_map(SessionId::new)
}

pub fn protocol_version() -> impl Strategy<Value = ProtocolVersion> {
    prop_oneof![Just(ProtocolVersion::V0), Just(ProtocolVersion::V1)]
}

pub fn flags() -> impl Strategy<Value = Flags> {
    prop_oneof![Just(Flags::Announce), Just(Flags::Withdraw)]
}

pub fn ipv4_prefix() -> impl Strategy<Value = IpPrefix> {
    (any::<u32>(), 0u8..=32).prop_filter_map("prefix length in range", |(addr, length)| {
        IpPrefix::new(IpAddr::V4(Ipv4Addr::from(addr)), length).ok()
    })
}

pub fn ipv6_prefix() -> impl Strategy<Value = IpPrefix> {
    (any::<u128>(), 0u8..=128).prop_filter_map("prefix length in range", |(addr, length)| {
        IpPrefix::new(IpAddr::V6(Ipv6Addr::from(addr)), length).ok()
    })
}

pub fn ip_prefix() -> impl Strategy<Value = IpPrefix> {
    prop_oneof![ipv4_prefix(), ipv6_prefix()]
}

/// A valid announcement. The maximum length is absent about a third of the
/// time.
pub fn announcement() -> impl Strategy<Value = Announcement> {
    (asn(), ip_prefix())
        .prop_flat_map(|(asn, prefix)| {
            let max_length = prop::option::weighted(0.66, prefix.length()..=prefix.family_width());
            (Just(asn), Just(prefix), max_length)
        })
        .prop_filter_map("valid announcement", |(asn, prefix, max_length)| {
            Announcement::new(asn, prefix, max_length).ok()
        })
}

/// A normalized announcement set with at most `max` records.
///
/// The records are drawn from a small pool of prefixes, so successive sets
/// overlap and deltas between them stay small.
pub fn announcement_set(max: usize) -> impl Strategy<Value = BTreeSet<Announcement>> {
    prop::collection::vec(pooled_announcement(), 0..=max)
        .prop_map(|records| records.iter().map(Announcement::normalized).collect())
}

fn pooled_announcement() -> impl Strategy<Value = Announcement> {
    (0u32..4, 0u8..16, 16u8..=24).prop_filter_map("valid pooled announcement", |(asn, net, max)| {
        let prefix = IpPrefix::new(IpAddr::V4(Ipv4Addr::new(10, net, 0, 0)), 16).ok()?;
        Announcement::new(Asn(64_500 + asn), prefix, Some(max)).ok()
    })
}

/// A sequence of announcement sets, as a validator would produce over time.
pub fn update_history(len: usize, max_records: usize) -> impl Strategy<Value = Vec<BTreeSet<Announcement>>> {
    prop::collection::vec(announcement_set(max_records), 1..=len)
}

pub fn timing() -> impl Strategy<Value = Timing> {
    (1u32..=86_400, 1u32..=7_200, 600u32..=172_800).prop_map(|(refresh, retry, expire)| Timing {
        refresh,
        retry,
        expire,
    })
}

pub fn error_code() -> impl Strategy<Value = ErrorCode> {
    (0u16..=12).prop_map(ErrorCode::from_u16)
}

fn router_key() -> impl Strategy<Value = RouterKey> {
    (
        flags(),
        any::<[u8; 20]>(),
        asn(),
        prop::collection::vec(any::<u8>(), 0..=128),
    )
        .prop_map(|(flags, subject_key_identifier, asn, spki)| RouterKey {
            flags,
            subject_key_identifier,
            asn,
            subject_public_key_info: Bytes::from(spki),
        })
}

/// Any PDU that can be encoded under `version`.
///
/// End of Data carries timing exactly when `version` is 1, and Router Key
/// only appears for version 1.
pub fn pdu(version: ProtocolVersion) -> BoxedStrategy<Pdu> {
    let v1 = version == ProtocolVersion::V1;
    let timing = if v1 {
        timing().prop_map(Some).boxed()
    } else {
        Just(None).boxed()
    };

    let common = prop_oneof![
        (session_id(), serial()).prop_map(|(session_id, serial)| Pdu::SerialNotify { session_id, serial }),
        (session_id(), serial()).prop_map(|(session_id, serial)| Pdu::SerialQuery { session_id, serial }),
        Just(Pdu::ResetQuery),
        session_id().prop_map(|session_id| Pdu::CacheResponse { session_id }),
        (flags(), announcement()).prop_map(|(flags, a)| Pdu::prefix(flags, &a)),
        (session_id(), serial(), timing)
            .prop_map(|(session_id, serial, timing)| Pdu::EndOfData { session_id, serial, timing }),
        Just(Pdu::CacheReset),
        (
            error_code(),
            prop::collection::vec(any::<u8>(), 0..=64),
            "[ -~]{0,64}",
        )
            .prop_map(|(code, offending, text)| Pdu::error(code, offending, text)),
    ];

    if v1 {
        prop_oneof![4 => common, 1 => router_key().prop_map(Pdu::RouterKey)].boxed()
    } else {
        common.boxed()
    }
}

/// A protocol version and a PDU valid under it.
pub fn versioned_pdu() -> impl Strategy<Value = (ProtocolVersion, Pdu)> {
    protocol_version().prop_flat_map(|version| (Just(version), pdu(version)))
}
