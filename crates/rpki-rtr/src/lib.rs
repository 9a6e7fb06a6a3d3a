//! # RPKI-to-Router Cache Server
//!
//! Serves validated route-origin data to routers over the RPKI-to-Router
//! protocol (RFC 6810 and RFC 8210).
//!
//! ## Overview
//!
//! - **Cache**: the authoritative announcement set, its serial and a bounded
//!   history of deltas ([`store::RtrCache`])
//! - **Refresh**: a [`RefreshAdapter`] polls a [`ValidationSource`] and
//!   applies each complete set to the cache
//! - **Sessions**: the [`RtrServer`] accepts routers and runs one
//!   [`session::ClientSession`] per connection
//! - **Monitoring**: [`ServerStatus`] summarizes the cache and connected
//!   routers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rpki_rtr::{JsonFileSource, RefreshAdapter, RtrServer, ServerConfig};
//! use rpki_rtr::store::RtrCache;
//!
//! async fn example() -> rpki_rtr::Result<()> {
//!     let config = ServerConfig::default();
//!     let cache = Arc::new(RtrCache::new(config.retention.clone(), config.notify_capacity));
//!
//!     let source = Arc::new(JsonFileSource::new("export.json"));
//!     let (_shutdown_tx, shutdown) = tokio::sync::watch::channel(false);
//!     tokio::spawn(RefreshAdapter::new(cache.clone(), source).run(config.refresh_interval(), shutdown.clone()));
//!
//!     let server = RtrServer::new(cache, config.session.to_session_config());
//!     server.bind_and_serve(config.bind, shutdown).await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rpki_rtr::core` - PDUs, announcements, serials and deltas
//! - `rpki_rtr::store` - the cache and its snapshots
//! - `rpki_rtr::session` - the per-router session and framing codec

pub mod config;
pub mod error;
pub mod monitor;
pub mod refresh;
pub mod server;
pub mod source;

pub use rpki_rtr_core as core;
pub use rpki_rtr_session as session;
pub use rpki_rtr_store as store;

pub use config::{ServerConfig, SessionSettings, DEFAULT_PORT};
pub use error::{Result, ServerError, SourceError};
pub use monitor::ServerStatus;
pub use refresh::{RefreshAdapter, RefreshOutcome};
pub use server::RtrServer;
pub use source::{parse_export, JsonFileSource, Validated, ValidationSource};
