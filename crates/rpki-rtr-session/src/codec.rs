//! Stream framing: turns a byte stream into PDUs and back.
//!
//! The decoder reads the eight byte header first and validates it before
//! waiting for the body, so an absurd length is rejected without buffering.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use rpki_rtr_core::pdu::HEADER_LENGTH;
use rpki_rtr_core::{DecodeError, Header, Pdu, ProtocolVersion, MAX_PDU_LENGTH};

use crate::error::SessionError;

/// `tokio_util` codec for RTR PDUs.
///
/// Decodes to `(version, pdu)` so the session can negotiate and check the
/// protocol version. Encodes with the version set by
/// [`set_version`](Self::set_version), the latest version until then.
#[derive(Debug, Clone)]
pub struct PduCodec {
    version: ProtocolVersion,
    max_length: u32,
}

impl PduCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_PDU_LENGTH)
    }

    /// A codec rejecting PDUs longer than `max_length` bytes.
    pub fn with_max_length(max_length: u32) -> Self {
        Self {
            version: ProtocolVersion::LATEST,
            max_length,
        }
    }

    /// The version used for encoding.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }
}

impl Default for PduCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PduCodec {
    type Item = (ProtocolVersion, Pdu);
    type Error = SessionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LENGTH {
            src.reserve(HEADER_LENGTH - src.len());
            return Ok(None);
        }

        let header = Header::parse(&src[..HEADER_LENGTH]).map_err(|error| SessionError::Decode {
            error,
            offending: Bytes::copy_from_slice(&src[..HEADER_LENGTH]),
        })?;
        if header.length > self.max_length {
            return Err(SessionError::Decode {
                error: DecodeError::Malformed(format!(
                    "PDU length {} exceeds limit {}",
                    header.length, self.max_length
                )),
                offending: Bytes::copy_from_slice(&src[..HEADER_LENGTH]),
            });
        }

        let length = header.length as usize;
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(length).freeze();
        match Pdu::decode(&frame) {
            Ok((version, pdu)) => {
                trace!(%version, pdu = pdu.name(), length, "decoded PDU");
                Ok(Some((version, pdu)))
            }
            Err(error) => Err(SessionError::Decode {
                error,
                offending: frame,
            }),
        }
    }
}

impl Encoder<Pdu> for PduCodec {
    type Error = SessionError;

    fn encode(&mut self, pdu: Pdu, dst: &mut BytesMut) -> Result<(), Self::Error> {
        trace!(version = %self.version, pdu = pdu.name(), "encoding PDU");
        pdu.encode_into(self.version, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpki_rtr_core::{SerialNumber, SessionId};

    fn serial_query() -> Bytes {
        Pdu::SerialQuery {
            session_id: SessionId::new(3),
            serial: SerialNumber::new(9),
        }
        .encode(ProtocolVersion::V1)
        .unwrap()
    }

    #[test]
    fn test_decode_waits_for_full_pdu() {
        let mut codec = PduCodec::new();
        let bytes = serial_query();
        let mut buf = BytesMut::new();

        for &byte in &bytes[..bytes.len() - 1] {
            buf.extend_from_slice(&[byte]);
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        let (version, pdu) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(version, ProtocolVersion::V1);
        assert!(matches!(pdu, Pdu::SerialQuery { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_splits_back_to_back_pdus() {
        let mut codec = PduCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&serial_query());
        buf.extend_from_slice(&Pdu::ResetQuery.encode(ProtocolVersion::V0).unwrap());

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some((ProtocolVersion::V1, Pdu::SerialQuery { .. }))
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some((ProtocolVersion::V0, Pdu::ResetQuery))
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_bad_header_early() {
        let mut codec = PduCodec::new();
        // Serial Query claiming 4 GiB: rejected from the header alone.
        let mut buf = BytesMut::from(&[1u8, 1, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        match codec.decode(&mut buf) {
            Err(SessionError::Decode { error, offending }) => {
                assert!(matches!(error, DecodeError::Malformed(_)));
                assert_eq!(offending.len(), HEADER_LENGTH);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_respects_configured_limit() {
        let mut codec = PduCodec::with_max_length(64);
        let report = Pdu::error(rpki_rtr_core::ErrorCode::InternalError, Bytes::new(), "x".repeat(100))
            .encode(ProtocolVersion::V1)
            .unwrap();
        let mut buf = BytesMut::from(&report[..HEADER_LENGTH]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SessionError::Decode {
                error: DecodeError::Malformed(_),
                ..
            })
        ));
    }

    #[test]
    fn test_encode_uses_configured_version() {
        let mut codec = PduCodec::new();
        let eod = Pdu::EndOfData {
            session_id: SessionId::new(1),
            serial: SerialNumber::new(1),
            timing: None,
        };

        let mut buf = BytesMut::new();
        codec.encode(eod.clone(), &mut buf).unwrap();
        assert_eq!(buf.len(), 24);

        codec.set_version(ProtocolVersion::V0);
        let mut buf = BytesMut::new();
        codec.encode(eod, &mut buf).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(buf[0], 0);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn queries() -> impl Strategy<Value = Vec<Pdu>> {
            proptest::collection::vec(
                prop_oneof![
                    Just(Pdu::ResetQuery),
                    (any::<u16>(), any::<u32>()).prop_map(|(session, serial)| Pdu::SerialQuery {
                        session_id: SessionId::new(session),
                        serial: SerialNumber::new(serial),
                    }),
                ],
                1..20,
            )
        }

        proptest! {
            #[test]
            fn test_any_chunking_yields_same_pdus(pdus in queries(), chunk in 1usize..40) {
                let mut wire = Vec::new();
                for pdu in &pdus {
                    wire.extend_from_slice(&pdu.encode(ProtocolVersion::V1).unwrap());
                }

                let mut codec = PduCodec::new();
                let mut buf = BytesMut::new();
                let mut decoded = Vec::new();
                for piece in wire.chunks(chunk) {
                    buf.extend_from_slice(piece);
                    while let Some((_, pdu)) = codec.decode(&mut buf).unwrap() {
                        decoded.push(pdu);
                    }
                }
                prop_assert_eq!(decoded, pdus);
                prop_assert!(buf.is_empty());
            }

            #[test]
            fn test_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let mut codec = PduCodec::new();
                let mut buf = BytesMut::from(&bytes[..]);
                while let Ok(Some(_)) = codec.decode(&mut buf) {}
            }
        }
    }
}
