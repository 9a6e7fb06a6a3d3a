//! Immutable cache snapshots and delta lookups against them.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use rpki_rtr_core::{table_digest, Announcement, Delta, SerialNumber, SessionId};

/// A delta together with the time it was recorded.
#[derive(Debug, Clone)]
pub struct RetainedDelta {
    pub delta: Arc<Delta>,
    pub recorded_at: Instant,
}

/// One published state of the cache.
///
/// Never mutated after publication. Cloning is cheap: the announcement
/// table and the deltas are shared.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub(crate) session_id: SessionId,
    pub(crate) serial: SerialNumber,
    pub(crate) ready: bool,
    pub(crate) announcements: Arc<BTreeSet<Announcement>>,
    /// Consecutive deltas, oldest first, the last one leading to `serial`.
    pub(crate) deltas: VecDeque<RetainedDelta>,
}

impl CacheSnapshot {
    /// The empty, not-ready state at serial zero.
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            serial: SerialNumber::ZERO,
            ready: false,
            announcements: Arc::new(BTreeSet::new()),
            deltas: VecDeque::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn serial(&self) -> SerialNumber {
        self.serial
    }

    /// False until the first successful refresh.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The current announcement table in wire order.
    pub fn announcements(&self) -> &BTreeSet<Announcement> {
        &self.announcements
    }

    /// Shared handle to the announcement table.
    pub fn announcements_arc(&self) -> Arc<BTreeSet<Announcement>> {
        Arc::clone(&self.announcements)
    }

    /// Retained deltas, oldest first.
    pub fn deltas(&self) -> impl Iterator<Item = &RetainedDelta> {
        self.deltas.iter()
    }

    /// The oldest serial a router may hold and still be served deltas.
    pub fn oldest_serial(&self) -> SerialNumber {
        self.deltas
            .front()
            .map(|entry| entry.delta.serial.previous())
            .unwrap_or(self.serial)
    }

    /// Digest of the announcement table, see [`table_digest`].
    pub fn digest(&self) -> String {
        table_digest(self.announcements.iter())
    }

    /// The deltas a router at (`session_id`, `serial`) needs to catch up.
    ///
    /// Answers [`DeltaQuery::NeedsReset`] when the cache is not ready, the
    /// session id is foreign, or `serial` lies outside the retained window
    /// (older than the oldest retained delta or after the current serial).
    pub fn deltas_since(&self, session_id: SessionId, serial: SerialNumber) -> DeltaQuery {
        if !self.ready || session_id != self.session_id {
            return DeltaQuery::NeedsReset;
        }

        let oldest = self.oldest_serial();
        let span = oldest.distance_to(self.serial) as usize;
        let offset = oldest.distance_to(serial) as usize;
        if offset > span {
            return DeltaQuery::NeedsReset;
        }

        DeltaQuery::Deltas(DeltaSeries {
            session_id: self.session_id,
            from: serial,
            to: self.serial,
            deltas: self
                .deltas
                .iter()
                .skip(offset)
                .map(|entry| Arc::clone(&entry.delta))
                .collect(),
        })
    }
}

/// Answer to a delta lookup.
#[derive(Debug, Clone)]
pub enum DeltaQuery {
    /// The router can catch up incrementally.
    Deltas(DeltaSeries),
    /// The router must discard its table and start over.
    NeedsReset,
}

/// Consecutive deltas leading from `from` to `to`.
#[derive(Debug, Clone)]
pub struct DeltaSeries {
    pub session_id: SessionId,
    pub from: SerialNumber,
    pub to: SerialNumber,
    pub deltas: Vec<Arc<Delta>>,
}

impl DeltaSeries {
    /// True when the router is already current.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// All deltas folded into one, as sent to the router.
    ///
    /// Applying the result to the table at `from` yields the table at `to`.
    pub fn net_changes(&self) -> Delta {
        let mut net = Delta {
            serial: self.to,
            additions: BTreeSet::new(),
            withdrawals: BTreeSet::new(),
        };
        for delta in &self.deltas {
            net.then(delta);
        }
        net
    }
}
