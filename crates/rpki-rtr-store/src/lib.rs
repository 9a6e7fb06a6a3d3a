//! # RPKI-to-Router Store
//!
//! The authoritative holder of synchronization state: the current
//! announcement set, its serial number and session id, plus a bounded
//! history of deltas so routers can catch up incrementally.
//!
//! ## Overview
//!
//! [`RtrCache`] has a single writer (the refresh loop) and many readers (one
//! per router session). The state is an immutable [`CacheSnapshot`]
//! published through `ArcSwap`: readers load an `Arc` and keep a consistent
//! view for as long as they need it, while the writer builds the next
//! snapshot and swaps it in.
//!
//! ## Key Types
//!
//! - [`RtrCache`] - The cache and its update broadcast
//! - [`CacheSnapshot`] - One consistent published state
//! - [`DeltaQuery`] - Answer to "what changed since serial N?"
//! - [`RetentionPolicy`] - How much delta history is kept
//! - [`CacheStatus`] - Read-only monitoring view
//!
//! ## Design Notes
//!
//! - **No-op updates**: an update equal to the current set leaves the serial
//!   and the history untouched.
//! - **Contiguous history**: retained deltas always cover consecutive
//!   serials ending at the current one; anything older needs a full reset.
//! - **Publish then notify**: the snapshot is swapped in before the update is
//!   broadcast, so a notified session always sees the new serial.

pub mod cache;
pub mod snapshot;
pub mod status;

pub use cache::{CacheUpdate, RetentionPolicy, RtrCache, UpdateOutcome, DEFAULT_MAX_DELTAS};
pub use snapshot::{CacheSnapshot, DeltaQuery, DeltaSeries, RetainedDelta};
pub use status::{CacheStatus, DeltaSummary};
