//! # RPKI-to-Router Testkit
//!
//! Testing utilities for the RTR server.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: byte-exact PDU encodings, including the RFC 8210
//!   prefix examples
//! - **Generators**: proptest strategies for announcements, announcement
//!   histories and PDUs
//! - **Fixtures**: a cache with a fixed session id, a scriptable validation
//!   source, and a router that mirrors what the cache sends
//!
//! ## Golden Vectors
//!
//! ```rust
//! use rpki_rtr_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, encoded) in verify_all_vectors() {
//!     assert!(matches, "{name}: {encoded}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use rpki_rtr_testkit::generators::versioned_pdu;
//!
//! proptest! {
//!     #[test]
//!     fn pdu_roundtrip((version, pdu) in versioned_pdu()) {
//!         let bytes = pdu.encode(version).unwrap();
//!         prop_assert_eq!(Pdu::decode(&bytes).unwrap(), (version, pdu));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use rpki_rtr_testkit::fixtures::{roa, TestFixture};
//!
//! # async fn example() {
//! let fixture = TestFixture::new();
//! fixture.update(&[roa(3333, "10.0.0.0/8", None)]);
//!
//! let (mut router, _session) = fixture.connect();
//! router.sync().await.unwrap();
//! assert_eq!(router.table().len(), 1);
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    roa, set, RouterError, RunningServer, StaticSource, TestFixture, TestRouter,
    FIXTURE_SESSION_ID,
};
pub use generators::{announcement, announcement_set, pdu, update_history, versioned_pdu};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
