//! # RPKI-to-Router Session
//!
//! Serves one router connection: answers Reset and Serial Queries from the
//! cache and pushes Serial Notify PDUs when the cache changes.
//!
//! ## Overview
//!
//! A [`ClientSession`] runs over any `AsyncRead + AsyncWrite` stream. The
//! [`PduCodec`] frames the byte stream into PDUs; the session decides what
//! to send for each request and writes the response in one batch.
//!
//! ## Message Flow
//!
//! ```text
//! Router                               Cache
//!   |-------- Reset Query ------------->|
//!   |<------- Cache Response -----------|
//!   |<------- Prefix PDUs (announce) ---|
//!   |<------- End of Data --------------|
//!   |                                   |  (cache updated)
//!   |<------- Serial Notify ------------|
//!   |-------- Serial Query ------------>|
//!   |<------- Cache Response -----------|
//!   |<------- Prefix PDUs (changes) ----|
//!   |<------- End of Data --------------|
//! ```
//!
//! ## Key Properties
//!
//! - **Isolated failures**: a protocol violation closes only its session,
//!   after an Error Report naming the offending PDU
//! - **No stale data**: a serial outside the retained window always gets a
//!   Cache Reset, never a partial delta
//! - **One notify per serial**: a router is told about each new serial once

pub mod codec;
pub mod convergence;
pub mod error;
pub mod registry;
pub mod session;

pub use codec::PduCodec;
pub use convergence::{MirrorError, RouterTable};
pub use error::{Result, SessionError};
pub use registry::{ClientHandle, ClientInfo, ClientRegistry};
pub use session::{ClientSession, Response, SessionConfig, SessionState};
