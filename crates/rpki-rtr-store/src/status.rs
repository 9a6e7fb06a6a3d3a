//! Read-only monitoring view of the cache.

use serde::Serialize;
use std::time::Instant;

use rpki_rtr_core::{SerialNumber, SessionId};

use crate::snapshot::CacheSnapshot;

/// Size of one retained delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    pub serial: SerialNumber,
    pub additions: usize,
    pub withdrawals: usize,
    pub age_secs: u64,
}

/// Summary of the cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub ready: bool,
    pub session_id: SessionId,
    pub serial: SerialNumber,
    pub announcements: usize,
    pub digest: String,
    pub deltas: Vec<DeltaSummary>,
}

impl CacheStatus {
    pub fn of(snapshot: &CacheSnapshot, now: Instant) -> Self {
        Self {
            ready: snapshot.is_ready(),
            session_id: snapshot.session_id(),
            serial: snapshot.serial(),
            announcements: snapshot.announcements().len(),
            digest: snapshot.digest(),
            deltas: snapshot
                .deltas()
                .map(|entry| DeltaSummary {
                    serial: entry.delta.serial,
                    additions: entry.delta.additions.len(),
                    withdrawals: entry.delta.withdrawals.len(),
                    age_secs: now.saturating_duration_since(entry.recorded_at).as_secs(),
                })
                .collect(),
        }
    }
}
