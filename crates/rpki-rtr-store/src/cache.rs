//! The versioned announcement cache.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use rpki_rtr_core::{Announcement, Delta, SerialNumber, SessionId};

use crate::snapshot::{CacheSnapshot, DeltaQuery, RetainedDelta};
use crate::status::CacheStatus;

/// Default number of retained deltas.
pub const DEFAULT_MAX_DELTAS: usize = 100;

/// Default capacity of the update broadcast channel.
const DEFAULT_NOTIFY_CAPACITY: usize = 64;

/// How much delta history the cache keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Maximum number of retained deltas.
    pub max_deltas: usize,
    /// Deltas older than this are dropped by [`RtrCache::expire_deltas`].
    #[serde(rename = "max_age_secs", with = "optional_secs")]
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_deltas: DEFAULT_MAX_DELTAS,
            max_age: None,
        }
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Broadcast to sessions whenever the published serial moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheUpdate {
    pub session_id: SessionId,
    pub serial: SerialNumber,
}

/// Result of [`RtrCache::apply_new_announcement_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The set equals the current one; serial and history are untouched.
    Unchanged { serial: SerialNumber },
    /// A new serial was published.
    Updated {
        serial: SerialNumber,
        additions: usize,
        withdrawals: usize,
    },
}

/// The authoritative announcement cache.
///
/// Readers call [`snapshot`](Self::snapshot) or
/// [`deltas_since`](Self::deltas_since) without locking. Writers are
/// serialized by an internal mutex and publish a new snapshot atomically.
pub struct RtrCache {
    current: ArcSwap<CacheSnapshot>,
    writer: Mutex<()>,
    retention: RetentionPolicy,
    updates: broadcast::Sender<CacheUpdate>,
}

impl RtrCache {
    /// Create an empty cache with a random session id.
    pub fn new(retention: RetentionPolicy, notify_capacity: usize) -> Self {
        Self::with_session_id(SessionId::random(), retention, notify_capacity)
    }

    /// Create an empty cache with the given session id.
    pub fn with_session_id(
        session_id: SessionId,
        retention: RetentionPolicy,
        notify_capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(notify_capacity.max(1));
        info!(%session_id, max_deltas = retention.max_deltas, "cache created");
        Self {
            current: ArcSwap::from_pointee(CacheSnapshot::empty(session_id)),
            writer: Mutex::new(()),
            retention,
            updates,
        }
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    pub fn session_id(&self) -> SessionId {
        self.current.load().session_id()
    }

    pub fn serial(&self) -> SerialNumber {
        self.current.load().serial()
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_ready()
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// See [`CacheSnapshot::deltas_since`].
    pub fn deltas_since(&self, session_id: SessionId, serial: SerialNumber) -> DeltaQuery {
        self.current.load().deltas_since(session_id, serial)
    }

    /// Subscribe to serial changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates.subscribe()
    }

    /// Replace the current announcement set.
    ///
    /// Records are normalized first, so two announcements that differ only
    /// in an implicit maximum length collapse into one.
    ///
    /// Computes the delta from the current set. An empty delta is a no-op
    /// apart from marking the cache ready. Otherwise the serial advances by
    /// one, the delta is recorded, history beyond the retention limit is
    /// pruned, and the new snapshot is published before subscribers are
    /// notified.
    pub fn apply_new_announcement_set(&self, announcements: BTreeSet<Announcement>) -> UpdateOutcome {
        let announcements: BTreeSet<Announcement> =
            announcements.iter().map(Announcement::normalized).collect();
        let _guard = self.lock_writer();
        let current = self.current.load_full();
        let delta = Delta::between(current.serial.next(), &current.announcements, &announcements);

        if delta.is_empty() {
            if !current.ready {
                self.publish(CacheSnapshot {
                    ready: true,
                    ..(*current).clone()
                });
                info!(session_id = %current.session_id, serial = %current.serial, "cache ready");
            } else {
                debug!(serial = %current.serial, "announcement set unchanged");
            }
            return UpdateOutcome::Unchanged {
                serial: current.serial,
            };
        }

        let serial = delta.serial;
        let (additions, withdrawals) = (delta.additions.len(), delta.withdrawals.len());
        let mut deltas = current.deltas.clone();
        deltas.push_back(RetainedDelta {
            delta: Arc::new(delta),
            recorded_at: Instant::now(),
        });
        let pruned = prune_to(&mut deltas, self.retention.max_deltas);

        self.publish(CacheSnapshot {
            session_id: current.session_id,
            serial,
            ready: true,
            announcements: Arc::new(announcements),
            deltas,
        });
        info!(
            session_id = %current.session_id,
            %serial,
            additions,
            withdrawals,
            pruned = pruned.len(),
            "cache updated"
        );

        UpdateOutcome::Updated {
            serial,
            additions,
            withdrawals,
        }
    }

    /// Drop deltas older than the retention policy's maximum age.
    ///
    /// Returns the serials of the dropped deltas.
    pub fn expire_deltas(&self, now: Instant) -> Vec<SerialNumber> {
        let Some(max_age) = self.retention.max_age else {
            return Vec::new();
        };
        let _guard = self.lock_writer();
        let current = self.current.load_full();

        let mut deltas = current.deltas.clone();
        let mut expired = Vec::new();
        while let Some(front) = deltas.front() {
            if now.saturating_duration_since(front.recorded_at) <= max_age {
                break;
            }
            expired.push(front.delta.serial);
            deltas.pop_front();
        }

        if !expired.is_empty() {
            self.current.store(Arc::new(CacheSnapshot {
                deltas,
                ..(*current).clone()
            }));
            info!(serials = ?expired, "expired deltas");
        }
        expired
    }

    /// Discard all state and start a new session.
    ///
    /// The new session id always differs from the old one. The cache is
    /// empty and not ready until the next refresh.
    pub fn reset(&self) -> SessionId {
        let _guard = self.lock_writer();
        let previous = self.current.load().session_id();
        let session_id = SessionId::random_excluding(previous);
        self.current.store(Arc::new(CacheSnapshot::empty(session_id)));
        info!(%previous, %session_id, "cache reset");
        session_id
    }

    /// Monitoring summary of the current state.
    pub fn status(&self) -> CacheStatus {
        CacheStatus::of(&self.current.load(), Instant::now())
    }

    fn publish(&self, snapshot: CacheSnapshot) {
        let update = CacheUpdate {
            session_id: snapshot.session_id,
            serial: snapshot.serial,
        };
        self.current.store(Arc::new(snapshot));
        // No subscribers is not an error.
        let _ = self.updates.send(update);
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RtrCache {
    fn default() -> Self {
        Self::new(RetentionPolicy::default(), DEFAULT_NOTIFY_CAPACITY)
    }
}

impl std::fmt::Debug for RtrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("RtrCache")
            .field("session_id", &snapshot.session_id)
            .field("serial", &snapshot.serial)
            .field("ready", &snapshot.ready)
            .field("announcements", &snapshot.announcements.len())
            .field("deltas", &snapshot.deltas.len())
            .finish()
    }
}

fn prune_to(deltas: &mut VecDeque<RetainedDelta>, max_deltas: usize) -> Vec<SerialNumber> {
    let mut pruned = Vec::new();
    while deltas.len() > max_deltas {
        if let Some(entry) = deltas.pop_front() {
            pruned.push(entry.delta.serial);
        }
    }
    pruned
}
