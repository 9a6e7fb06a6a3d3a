//! Periodic refresh of the cache from a validation source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use rpki_rtr_store::{RtrCache, UpdateOutcome};

use crate::error::SourceError;
use crate::source::{Validated, ValidationSource};

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The source returned a set and the cache applied it.
    Applied(UpdateOutcome),
    /// The source has no data yet; the cache was left alone.
    NotReady,
}

/// Drives the cache from a [`ValidationSource`].
///
/// The adapter is the only writer of the cache. A failed or not-ready fetch
/// leaves the cache at its last good state.
pub struct RefreshAdapter {
    cache: Arc<RtrCache>,
    source: Arc<dyn ValidationSource>,
}

impl RefreshAdapter {
    pub fn new(cache: Arc<RtrCache>, source: Arc<dyn ValidationSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Arc<RtrCache> {
        &self.cache
    }

    /// Fetch once and apply the result.
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, SourceError> {
        match self.source.fetch().await? {
            Validated::NotReady => {
                warn!(source = %self.source.describe(), "validation source not ready, will retry");
                Ok(RefreshOutcome::NotReady)
            }
            Validated::Ready(announcements) => {
                let records = announcements.len();
                let outcome = self.cache.apply_new_announcement_set(announcements);
                match outcome {
                    UpdateOutcome::Updated { serial, .. } => {
                        info!(source = %self.source.describe(), records, %serial, "refresh applied");
                    }
                    UpdateOutcome::Unchanged { serial } => {
                        debug!(records, %serial, "refresh found no changes");
                    }
                }
                Ok(RefreshOutcome::Applied(outcome))
            }
        }
    }

    /// Refresh every `interval` until `shutdown` flips to `true`.
    ///
    /// The first refresh runs immediately. Each tick also expires deltas
    /// older than the retention policy allows.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(source = %self.source.describe(), ?interval, "refresh loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh_once().await {
                        warn!(source = %self.source.describe(), %error, "refresh failed, keeping current cache");
                    }
                    self.cache.expire_deltas(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("refresh loop stopped");
    }
}
