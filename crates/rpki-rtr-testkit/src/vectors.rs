//! Golden wire vectors.
//!
//! Byte-exact encodings every RTR implementation must agree on. The prefix
//! vectors follow RFC 8210 section 5.6 and 5.7.

use bytes::Bytes;

use rpki_rtr_core::{
    Announcement, Asn, ErrorCode, Flags, Pdu, ProtocolVersion, RouterKey, SerialNumber, SessionId,
    Timing,
};

/// A PDU and its expected encoding.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub version: ProtocolVersion,
    pub pdu: Pdu,
    /// Expected encoding, lowercase hex.
    pub hex: &'static str,
}

impl GoldenVector {
    /// The actual encoding as lowercase hex, or the encode error.
    pub fn encoded_hex(&self) -> String {
        self.pdu
            .encode(self.version)
            .map(hex::encode)
            .unwrap_or_else(|e| format!("encode error: {e}"))
    }

    pub fn expected_bytes(&self) -> Vec<u8> {
        hex::decode(self.hex).unwrap_or_default()
    }
}

fn prefix(flags: Flags, asn: u32, prefix: &str, max_length: Option<u8>) -> Pdu {
    let prefix = prefix.parse().unwrap_or_else(|e| panic!("bad vector prefix {prefix}: {e}"));
    let announcement = Announcement::new(Asn(asn), prefix, max_length)
        .unwrap_or_else(|e| panic!("bad vector announcement: {e}"));
    Pdu::prefix(flags, &announcement)
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    use ProtocolVersion::{V0, V1};

    vec![
        GoldenVector {
            name: "IPv4 prefix announcement",
            version: V1,
            pdu: prefix(Flags::Announce, 3333, "127.0.0.0/8", Some(18)),
            hex: "0104000000000014010812007f00000000000d05",
        },
        GoldenVector {
            name: "IPv4 host prefix withdrawal, maximum ASN",
            version: V1,
            pdu: prefix(Flags::Withdraw, u32::MAX, "255.255.255.255/32", None),
            hex: "010400000000001400202000ffffffffffffffff",
        },
        GoldenVector {
            name: "IPv6 prefix announcement",
            version: V1,
            pdu: prefix(Flags::Announce, 3333, "2001:67c:2e8:110::/64", Some(80)),
            hex: "0106000000000020014050002001067c02e80110000000000000000000000d05",
        },
        GoldenVector {
            name: "IPv6 host prefix withdrawal, maximum ASN",
            version: V1,
            pdu: prefix(Flags::Withdraw, u32::MAX, "::1/128", None),
            hex: "01060000000000200080800000000000000000000000000000000001ffffffff",
        },
        GoldenVector {
            name: "Serial Notify",
            version: V1,
            pdu: Pdu::SerialNotify {
                session_id: SessionId::new(0x1234),
                serial: SerialNumber::new(0xdead_beef),
            },
            hex: "010012340000000cdeadbeef",
        },
        GoldenVector {
            name: "Reset Query, version 0",
            version: V0,
            pdu: Pdu::ResetQuery,
            hex: "0002000000000008",
        },
        GoldenVector {
            name: "Cache Response",
            version: V1,
            pdu: Pdu::CacheResponse {
                session_id: SessionId::new(42),
            },
            hex: "0103002a00000008",
        },
        GoldenVector {
            name: "End of Data, version 0",
            version: V0,
            pdu: Pdu::EndOfData {
                session_id: SessionId::new(1),
                serial: SerialNumber::new(2),
                timing: None,
            },
            hex: "000700010000000c00000002",
        },
        GoldenVector {
            name: "End of Data, version 1 default timing",
            version: V1,
            pdu: Pdu::EndOfData {
                session_id: SessionId::new(1),
                serial: SerialNumber::new(2),
                timing: Some(Timing::default()),
            },
            hex: "01070001000000180000000200000e100000025800001c20",
        },
        GoldenVector {
            name: "Cache Reset",
            version: V1,
            pdu: Pdu::CacheReset,
            hex: "0108000000000008",
        },
        GoldenVector {
            name: "Router Key announcement",
            version: V1,
            pdu: Pdu::RouterKey(RouterKey {
                flags: Flags::Announce,
                subject_key_identifier: [0x11; 20],
                asn: Asn(64496),
                subject_public_key_info: Bytes::from_static(&[0x30, 0x59]),
            }),
            hex: "010901000000002211111111111111111111111111111111111111110000fbf03059",
        },
        GoldenVector {
            name: "Error Report without offending PDU",
            version: V1,
            pdu: Pdu::error(ErrorCode::NoDataAvailable, Bytes::new(), "no data"),
            hex: "010a00020000001700000000000000076e6f2064617461",
        },
    ]
}

/// Check every vector. Returns (name, matches, encoded hex) per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let encoded = v.encoded_hex();
            (v.name.to_string(), encoded == v.hex, encoded)
        })
        .collect()
}
