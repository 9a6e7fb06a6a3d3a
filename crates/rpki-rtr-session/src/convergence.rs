//! Router-side table mirror for convergence checks.
//!
//! [`RouterTable`] applies response streams the way a router does, so a
//! test (or a monitoring probe) can confirm that a router following the
//! server ends up with exactly the server's table. Both sides compare via
//! [`table_digest`].

use std::collections::BTreeSet;

use thiserror::Error;

use rpki_rtr_core::{
    table_digest, Announcement, ErrorCode, Flags, Pdu, ParseError, SerialNumber, SessionId,
};

/// A response stream a router would reject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("duplicate announcement of {0}")]
    DuplicateAnnouncement(Announcement),

    #[error("withdrawal of unknown record {0}")]
    UnknownWithdrawal(Announcement),

    #[error("invalid prefix PDU: {0}")]
    InvalidPrefix(#[from] ParseError),

    #[error("unexpected {0} PDU in response")]
    UnexpectedPdu(&'static str),

    #[error("session id changed from {expected} to {actual} without a reset")]
    SessionMismatch {
        expected: SessionId,
        actual: SessionId,
    },

    #[error("response ended before End of Data")]
    Incomplete,
}

impl MirrorError {
    /// The error code a router would report for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MirrorError::DuplicateAnnouncement(_) => ErrorCode::DuplicateAnnouncementReceived,
            MirrorError::UnknownWithdrawal(_) => ErrorCode::WithdrawalOfUnknownRecord,
            MirrorError::InvalidPrefix(_) | MirrorError::Incomplete => ErrorCode::CorruptData,
            MirrorError::UnexpectedPdu(_) | MirrorError::SessionMismatch { .. } => {
                ErrorCode::InvalidRequest
            }
        }
    }
}

/// What a router holds after applying responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterTable {
    session_id: Option<SessionId>,
    serial: Option<SerialNumber>,
    announcements: BTreeSet<Announcement>,
}

impl RouterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn serial(&self) -> Option<SerialNumber> {
        self.serial
    }

    pub fn announcements(&self) -> &BTreeSet<Announcement> {
        &self.announcements
    }

    pub fn len(&self) -> usize {
        self.announcements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announcements.is_empty()
    }

    pub fn digest(&self) -> String {
        table_digest(self.announcements.iter())
    }

    /// Drop all data, as a router does on Cache Reset.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The query a router in this state sends next.
    pub fn next_query(&self) -> Pdu {
        match (self.session_id, self.serial) {
            (Some(session_id), Some(serial)) => Pdu::SerialQuery { session_id, serial },
            _ => Pdu::ResetQuery,
        }
    }

    /// Apply one complete response.
    ///
    /// A response is either a lone Cache Reset, or Cache Response, prefix
    /// PDUs, End of Data. Changes are staged and only committed at End of
    /// Data, so a rejected response leaves the table untouched. When the
    /// table holds no serial the response is taken as a full table.
    pub fn apply_response<'a, I>(&mut self, pdus: I) -> Result<(), MirrorError>
    where
        I: IntoIterator<Item = &'a Pdu>,
    {
        let mut pdus = pdus.into_iter();
        let session_id = match pdus.next() {
            Some(Pdu::CacheReset) => {
                self.reset();
                return Ok(());
            }
            Some(Pdu::CacheResponse { session_id }) => *session_id,
            Some(other) => return Err(MirrorError::UnexpectedPdu(other.name())),
            None => return Err(MirrorError::Incomplete),
        };

        let mut staged = if self.serial.is_some() {
            if let Some(expected) = self.session_id {
                if expected != session_id {
                    return Err(MirrorError::SessionMismatch {
                        expected,
                        actual: session_id,
                    });
                }
            }
            self.announcements.clone()
        } else {
            BTreeSet::new()
        };

        for pdu in pdus {
            match pdu {
                Pdu::Ipv4Prefix(_) | Pdu::Ipv6Prefix(_) => {
                    let Some(record) = pdu.announcement() else {
                        continue;
                    };
                    let (flags, announcement) = record?;
                    match flags {
                        Flags::Announce => {
                            if !staged.insert(announcement) {
                                return Err(MirrorError::DuplicateAnnouncement(announcement));
                            }
                        }
                        Flags::Withdraw => {
                            if !staged.remove(&announcement) {
                                return Err(MirrorError::UnknownWithdrawal(announcement));
                            }
                        }
                    }
                }
                Pdu::EndOfData {
                    session_id: end_session,
                    serial,
                    ..
                } => {
                    if *end_session != session_id {
                        return Err(MirrorError::SessionMismatch {
                            expected: session_id,
                            actual: *end_session,
                        });
                    }
                    self.session_id = Some(session_id);
                    self.serial = Some(*serial);
                    self.announcements = staged;
                    return Ok(());
                }
                other => return Err(MirrorError::UnexpectedPdu(other.name())),
            }
        }
        Err(MirrorError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpki_rtr_core::Asn;

    const S: SessionId = SessionId::new(9);

    fn roa(asn: u32, prefix: &str) -> Announcement {
        Announcement::new(Asn(asn), prefix.parse().unwrap(), None)
            .unwrap()
            .normalized()
    }

    fn response(serial: u32, body: Vec<Pdu>) -> Vec<Pdu> {
        let mut pdus = vec![Pdu::CacheResponse { session_id: S }];
        pdus.extend(body);
        pdus.push(Pdu::EndOfData {
            session_id: S,
            serial: SerialNumber(serial),
            timing: None,
        });
        pdus
    }

    #[test]
    fn test_full_then_incremental() {
        let a = roa(1, "10.0.0.0/8");
        let b = roa(2, "2001:db8::/32");
        let mut table = RouterTable::new();
        assert_eq!(table.next_query(), Pdu::ResetQuery);

        table
            .apply_response(&response(1, vec![Pdu::prefix(Flags::Announce, &a)]))
            .unwrap();
        assert_eq!(table.serial(), Some(SerialNumber(1)));
        assert_eq!(
            table.next_query(),
            Pdu::SerialQuery {
                session_id: S,
                serial: SerialNumber(1)
            }
        );

        table
            .apply_response(&response(
                2,
                vec![
                    Pdu::prefix(Flags::Withdraw, &a),
                    Pdu::prefix(Flags::Announce, &b),
                ],
            ))
            .unwrap();
        assert_eq!(table.announcements(), &[b].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(table.digest(), table_digest([&b]));
    }

    #[test]
    fn test_rejects_duplicate_and_unknown() {
        let a = roa(1, "10.0.0.0/8");
        let mut table = RouterTable::new();
        table
            .apply_response(&response(1, vec![Pdu::prefix(Flags::Announce, &a)]))
            .unwrap();

        let err = table
            .apply_response(&response(2, vec![Pdu::prefix(Flags::Announce, &a)]))
            .unwrap_err();
        assert_eq!(err, MirrorError::DuplicateAnnouncement(a));
        assert_eq!(err.error_code(), ErrorCode::DuplicateAnnouncementReceived);

        let unknown = roa(2, "11.0.0.0/8");
        let err = table
            .apply_response(&response(2, vec![Pdu::prefix(Flags::Withdraw, &unknown)]))
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::WithdrawalOfUnknownRecord);

        // Rejected responses leave the table alone.
        assert_eq!(table.serial(), Some(SerialNumber(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_cache_reset_clears() {
        let mut table = RouterTable::new();
        table
            .apply_response(&response(1, vec![Pdu::prefix(Flags::Announce, &roa(1, "10.0.0.0/8"))]))
            .unwrap();
        table.apply_response(&[Pdu::CacheReset]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.next_query(), Pdu::ResetQuery);
    }

    #[test]
    fn test_incomplete_and_unexpected() {
        let mut table = RouterTable::new();
        assert_eq!(
            table.apply_response(&[Pdu::CacheResponse { session_id: S }]),
            Err(MirrorError::Incomplete)
        );
        assert_eq!(
            table.apply_response(&[Pdu::ResetQuery]),
            Err(MirrorError::UnexpectedPdu("Reset Query"))
        );
    }
}
