//! The per-router session state machine.
//!
//! A [`ClientSession`] answers the router's queries from the cache and pushes
//! Serial Notify PDUs when the cache moves on. The decision of what to send
//! ([`ClientSession::respond`]) is separate from the I/O loop
//! ([`ClientSession::run`]) so it can be exercised without a transport.
//!
//! ```text
//!             Reset Query                    Serial Query (in window)
//!   +-------------------------+      +-------------------------------+
//!   v                         |      |                               v
//! SendingFullResponse   AwaitingRequest   ------------->   SendingDeltaResponse
//!   |                       ^   ^  |     bad PDU / decode failure      |
//!   +-----------------------+   |  +---------------------> Closed      |
//!                               +--------------------------------------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use rpki_rtr_core::{
    Delta, ErrorCode, ErrorReport, Flags, Pdu, ProtocolVersion, SerialNumber, SessionId, Timing,
    MAX_PDU_LENGTH,
};
use rpki_rtr_store::{CacheSnapshot, DeltaQuery, RtrCache};

use crate::codec::PduCodec;
use crate::error::{Result, SessionError};
use crate::registry::ClientHandle;

/// Where a session is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    SendingFullResponse,
    SendingDeltaResponse,
    Closed,
}

/// Configuration for router sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Intervals advertised in version 1 End of Data PDUs.
    pub timing: Timing,
    /// Close a session that sends nothing for this long.
    pub idle_timeout: Duration,
    /// Largest PDU accepted from the router.
    pub max_pdu_length: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            timing,
            idle_timeout: Duration::from_secs(u64::from(timing.expire)),
            max_pdu_length: MAX_PDU_LENGTH,
        }
    }
}

/// What to send in reply to one router PDU.
#[derive(Debug, Clone)]
pub enum Response {
    /// Cache Response, every announcement, End of Data.
    Full {
        snapshot: Arc<CacheSnapshot>,
        timing: Timing,
    },
    /// Cache Response, net withdrawals then announcements, End of Data.
    Incremental {
        session_id: SessionId,
        serial: SerialNumber,
        changes: Delta,
        timing: Timing,
    },
    /// The router must start over with a Reset Query.
    CacheReset,
    /// Non-fatal Error Report; the session continues.
    NoData(ErrorReport),
    /// Fatal Error Report; the session closes after sending it.
    Fatal(ErrorReport),
    /// The router reported an error; close without replying.
    PeerError(ErrorReport),
}

impl Response {
    /// The PDUs to write, in order.
    pub fn pdus(&self) -> Box<dyn Iterator<Item = Pdu> + Send + '_> {
        match self {
            Response::Full { snapshot, timing } => {
                let session_id = snapshot.session_id();
                let end = Pdu::EndOfData {
                    session_id,
                    serial: snapshot.serial(),
                    timing: Some(*timing),
                };
                Box::new(
                    std::iter::once(Pdu::CacheResponse { session_id })
                        .chain(
                            snapshot
                                .announcements()
                                .iter()
                                .map(|a| Pdu::prefix(Flags::Announce, a)),
                        )
                        .chain(std::iter::once(end)),
                )
            }
            Response::Incremental {
                session_id,
                serial,
                changes,
                timing,
            } => {
                let end = Pdu::EndOfData {
                    session_id: *session_id,
                    serial: *serial,
                    timing: Some(*timing),
                };
                Box::new(
                    std::iter::once(Pdu::CacheResponse {
                        session_id: *session_id,
                    })
                    .chain(
                        changes
                            .withdrawals
                            .iter()
                            .map(|a| Pdu::prefix(Flags::Withdraw, a)),
                    )
                    .chain(
                        changes
                            .additions
                            .iter()
                            .map(|a| Pdu::prefix(Flags::Announce, a)),
                    )
                    .chain(std::iter::once(end)),
                )
            }
            Response::CacheReset => Box::new(std::iter::once(Pdu::CacheReset)),
            Response::NoData(report) | Response::Fatal(report) => {
                Box::new(std::iter::once(Pdu::ErrorReport(report.clone())))
            }
            Response::PeerError(_) => Box::new(std::iter::empty()),
        }
    }

    /// True if the session ends after this response.
    pub fn closes_session(&self) -> bool {
        matches!(self, Response::Fatal(_) | Response::PeerError(_))
    }
}

/// One router connection.
pub struct ClientSession {
    cache: Arc<RtrCache>,
    config: SessionConfig,
    state: SessionState,
    version: Option<ProtocolVersion>,
    /// Session id and serial the router holds after our last response.
    delivered: Option<(SessionId, SerialNumber)>,
    last_notified: Option<(SessionId, SerialNumber)>,
    registration: Option<ClientHandle>,
}

impl ClientSession {
    pub fn new(cache: Arc<RtrCache>, config: SessionConfig) -> Self {
        Self {
            cache,
            config,
            state: SessionState::AwaitingRequest,
            version: None,
            delivered: None,
            last_notified: None,
            registration: None,
        }
    }

    /// Keep `handle` up to date and release it when the session ends.
    pub fn with_registration(mut self, handle: ClientHandle) -> Self {
        self.registration = Some(handle);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The version fixed by the router's first PDU.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Decide the reply to one PDU from the router.
    ///
    /// Moves the session into the matching sending state, or `Closed` for
    /// responses that end the session. Call [`finish_response`] once the
    /// PDUs are written.
    ///
    /// [`finish_response`]: Self::finish_response
    pub fn respond(&mut self, version: ProtocolVersion, pdu: Pdu) -> Response {
        if let Some(handle) = &self.registration {
            handle.touch();
        }

        match self.version {
            None => {
                self.version = Some(version);
                if let Some(handle) = &self.registration {
                    handle.set_version(version);
                }
                debug!(%version, "negotiated protocol version");
            }
            Some(negotiated) if negotiated != version => {
                return self.fatal(
                    ErrorCode::UnexpectedProtocolVersion,
                    &pdu,
                    version,
                    format!("protocol version {version} does not match negotiated version {negotiated}"),
                );
            }
            Some(_) => {}
        }

        match pdu {
            Pdu::ResetQuery => {
                debug!("reset query");
                let snapshot = self.cache.snapshot();
                if !snapshot.is_ready() {
                    return self.no_data(&pdu, version);
                }
                self.state = SessionState::SendingFullResponse;
                self.mark_delivered(Some((snapshot.session_id(), snapshot.serial())));
                Response::Full {
                    snapshot,
                    timing: self.config.timing,
                }
            }
            Pdu::SerialQuery { session_id, serial } => {
                debug!(%session_id, %serial, "serial query");
                let snapshot = self.cache.snapshot();
                if !snapshot.is_ready() {
                    return self.no_data(&pdu, version);
                }
                match snapshot.deltas_since(session_id, serial) {
                    DeltaQuery::NeedsReset => {
                        debug!(
                            %session_id,
                            %serial,
                            current_session = %snapshot.session_id(),
                            oldest = %snapshot.oldest_serial(),
                            "serial not in window, sending cache reset"
                        );
                        self.mark_delivered(None);
                        // The reset already tells the router to catch up to
                        // this serial.
                        self.last_notified = Some((snapshot.session_id(), snapshot.serial()));
                        Response::CacheReset
                    }
                    DeltaQuery::Deltas(series) => {
                        self.state = SessionState::SendingDeltaResponse;
                        self.mark_delivered(Some((series.session_id, series.to)));
                        Response::Incremental {
                            session_id: series.session_id,
                            serial: series.to,
                            changes: series.net_changes(),
                            timing: self.config.timing,
                        }
                    }
                }
            }
            Pdu::ErrorReport(report) => {
                warn!(
                    code = ?report.code,
                    text = %report.text,
                    offending = %hex::encode(&report.offending_pdu),
                    "router sent error report"
                );
                self.state = SessionState::Closed;
                Response::PeerError(report)
            }
            other => {
                let text = format!("{} PDU is not valid from a router", other.name());
                self.fatal(ErrorCode::InvalidRequest, &other, version, text)
            }
        }
    }

    /// Return to `AwaitingRequest` after a response was written.
    pub fn finish_response(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::AwaitingRequest;
        }
    }

    /// A Serial Notify, if the cache moved past what the router has seen.
    ///
    /// Only sent once the version is negotiated and the cache is ready, and
    /// at most once per serial.
    pub fn pending_notify(&mut self) -> Option<Pdu> {
        if self.version.is_none() || self.state != SessionState::AwaitingRequest {
            return None;
        }
        let snapshot = self.cache.snapshot();
        if !snapshot.is_ready() {
            return None;
        }
        let current = (snapshot.session_id(), snapshot.serial());
        let behind = |seen: Option<(SessionId, SerialNumber)>| match seen {
            None => true,
            Some((session_id, serial)) => session_id != current.0 || current.1.is_after(serial),
        };
        if !behind(self.delivered) || !behind(self.last_notified) {
            return None;
        }
        self.last_notified = Some(current);
        Some(Pdu::SerialNotify {
            session_id: current.0,
            serial: current.1,
        })
    }

    /// Serve the router on `io` until it disconnects or the session fails.
    ///
    /// Returns `Ok(())` when the router closes the connection.
    pub async fn run<T>(mut self, io: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, PduCodec::with_max_length(self.config.max_pdu_length));
        let mut updates = self.cache.subscribe();
        let mut updates_open = true;
        let idle = tokio::time::sleep(self.config.idle_timeout);
        tokio::pin!(idle);

        let result = loop {
            tokio::select! {
                frame = framed.next() => {
                    let (version, pdu) = match frame {
                        None => {
                            debug!("router closed connection");
                            break Ok(());
                        }
                        Some(Ok(item)) => item,
                        Some(Err(SessionError::Decode { error, offending })) => {
                            warn!(%error, offending = %hex::encode(&offending), "undecodable PDU from router");
                            let report = Pdu::error(error.error_code(), offending.clone(), error.to_string());
                            if let Err(e) = framed.send(report).await {
                                debug!(error = %e, "failed to send error report");
                            }
                            break Err(SessionError::Decode { error, offending });
                        }
                        Some(Err(e)) => break Err(e),
                    };
                    idle.as_mut().reset(Instant::now() + self.config.idle_timeout);

                    let response = self.respond(version, pdu);
                    if let Some(negotiated) = self.version {
                        framed.codec_mut().set_version(negotiated);
                    }
                    if let Err(e) = write_response(&mut framed, &response).await {
                        break Err(e);
                    }
                    match response {
                        Response::Fatal(report) => {
                            warn!(code = ?report.code, text = %report.text, "closing session after protocol violation");
                            break Err(SessionError::Protocol { code: report.code, text: report.text });
                        }
                        Response::PeerError(report) => {
                            break Err(SessionError::PeerError { code: report.code, text: report.text });
                        }
                        _ => {}
                    }
                    self.finish_response();
                    if let Err(e) = self.send_pending_notify(&mut framed).await {
                        break Err(e);
                    }
                }
                update = updates.recv(), if updates_open => {
                    match update {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            if let Err(e) = self.send_pending_notify(&mut framed).await {
                                break Err(e);
                            }
                        }
                        Err(RecvError::Closed) => updates_open = false,
                    }
                }
                () = &mut idle => {
                    info!(timeout = ?self.config.idle_timeout, "closing idle session");
                    break Err(SessionError::IdleTimeout(self.config.idle_timeout));
                }
            }
        };

        self.state = SessionState::Closed;
        result
    }

    async fn send_pending_notify<T>(&mut self, framed: &mut Framed<T, PduCodec>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(notify) = self.pending_notify() {
            debug!(?notify, "notifying router");
            framed.send(notify).await?;
        }
        Ok(())
    }

    fn mark_delivered(&mut self, delivered: Option<(SessionId, SerialNumber)>) {
        self.delivered = delivered;
        if let Some(handle) = &self.registration {
            match delivered {
                Some((session_id, serial)) => handle.record_delivered(session_id, serial),
                None => handle.clear_delivered(),
            }
        }
    }

    fn no_data(&self, pdu: &Pdu, version: ProtocolVersion) -> Response {
        debug!("cache not ready, answering no data available");
        Response::NoData(ErrorReport::new(
            ErrorCode::NoDataAvailable,
            offending_bytes(pdu, version),
            "no data available",
        ))
    }

    fn fatal(&mut self, code: ErrorCode, pdu: &Pdu, version: ProtocolVersion, text: String) -> Response {
        self.state = SessionState::Closed;
        Response::Fatal(ErrorReport::new(code, offending_bytes(pdu, version), text))
    }
}

/// Re-encode a decoded PDU. Decoding rejects non-zero reserved bits, so this
/// is the original.
fn offending_bytes(pdu: &Pdu, version: ProtocolVersion) -> bytes::Bytes {
    pdu.encode(version).unwrap_or_default()
}

async fn write_response<T>(framed: &mut Framed<T, PduCodec>, response: &Response) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut count = 0usize;
    for pdu in response.pdus() {
        framed.feed(pdu).await?;
        count += 1;
    }
    if count > 0 {
        framed.flush().await?;
        debug!(pdus = count, "response sent");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpki_rtr_core::{Announcement, Asn};
    use rpki_rtr_store::RetentionPolicy;
    use std::collections::BTreeSet;
    use tokio::io::{duplex, DuplexStream};

    const SESSION: SessionId = SessionId::new(777);

    fn roa(asn: u32, prefix: &str, max: Option<u8>) -> Announcement {
        Announcement::new(Asn(asn), prefix.parse().unwrap(), max)
            .unwrap()
            .normalized()
    }

    fn cache() -> Arc<RtrCache> {
        Arc::new(RtrCache::with_session_id(SESSION, RetentionPolicy::default(), 16))
    }

    fn session(cache: &Arc<RtrCache>) -> ClientSession {
        ClientSession::new(Arc::clone(cache), SessionConfig::default())
    }

    fn collect(response: &Response) -> Vec<Pdu> {
        response.pdus().collect()
    }

    #[test]
    fn test_reset_query_before_ready_is_no_data() {
        let cache = cache();
        let mut session = session(&cache);
        let response = session.respond(ProtocolVersion::V1, Pdu::ResetQuery);
        match &response {
            Response::NoData(report) => assert_eq!(report.code, ErrorCode::NoDataAvailable),
            other => panic!("expected no data, got {other:?}"),
        }
        assert!(!response.closes_session());
        session.finish_response();
        assert_eq!(session.state(), SessionState::AwaitingRequest);
    }

    #[test]
    fn test_reset_query_sends_full_table() {
        let cache = cache();
        let a = roa(3333, "10.0.0.0/8", Some(8));
        cache.apply_new_announcement_set([a].into_iter().collect());

        let mut session = session(&cache);
        let response = session.respond(ProtocolVersion::V1, Pdu::ResetQuery);
        assert_eq!(session.state(), SessionState::SendingFullResponse);
        assert_eq!(
            collect(&response),
            vec![
                Pdu::CacheResponse { session_id: SESSION },
                Pdu::prefix(Flags::Announce, &a),
                Pdu::EndOfData {
                    session_id: SESSION,
                    serial: SerialNumber(1),
                    timing: Some(Timing::default()),
                },
            ]
        );
        session.finish_response();
        assert_eq!(session.state(), SessionState::AwaitingRequest);
    }

    #[test]
    fn test_serial_query_sends_net_changes() {
        let cache = cache();
        let old = roa(3333, "10.0.0.0/8", Some(8));
        let new = roa(3333, "10.0.0.0/8", Some(24));
        cache.apply_new_announcement_set([old].into_iter().collect());
        cache.apply_new_announcement_set([new].into_iter().collect());

        let mut session = session(&cache);
        let response = session.respond(
            ProtocolVersion::V1,
            Pdu::SerialQuery {
                session_id: SESSION,
                serial: SerialNumber(1),
            },
        );
        assert_eq!(session.state(), SessionState::SendingDeltaResponse);
        assert_eq!(
            collect(&response),
            vec![
                Pdu::CacheResponse { session_id: SESSION },
                Pdu::prefix(Flags::Withdraw, &old),
                Pdu::prefix(Flags::Announce, &new),
                Pdu::EndOfData {
                    session_id: SESSION,
                    serial: SerialNumber(2),
                    timing: Some(Timing::default()),
                },
            ]
        );
    }

    #[test]
    fn test_serial_query_for_current_serial_is_empty_response() {
        let cache = cache();
        cache.apply_new_announcement_set([roa(1, "10.0.0.0/8", None)].into_iter().collect());
        let mut session = session(&cache);
        let pdus = collect(&session.respond(
            ProtocolVersion::V0,
            Pdu::SerialQuery {
                session_id: SESSION,
                serial: SerialNumber(1),
            },
        ));
        assert_eq!(pdus.len(), 2);
        assert!(matches!(pdus[0], Pdu::CacheResponse { .. }));
        assert!(matches!(pdus[1], Pdu::EndOfData { .. }));
    }

    #[test]
    fn test_serial_query_with_foreign_session_gets_cache_reset() {
        let cache = cache();
        cache.apply_new_announcement_set([roa(1, "10.0.0.0/8", None)].into_iter().collect());
        let mut session = session(&cache);
        let response = session.respond(
            ProtocolVersion::V1,
            Pdu::SerialQuery {
                session_id: SessionId::new(1),
                serial: SerialNumber(1),
            },
        );
        assert_eq!(collect(&response), vec![Pdu::CacheReset]);
        assert!(!response.closes_session());
    }

    #[test]
    fn test_invalid_pdu_from_router_is_fatal() {
        let cache = cache();
        let mut session = session(&cache);
        let pdu = Pdu::CacheResponse { session_id: SESSION };
        let response = session.respond(ProtocolVersion::V1, pdu.clone());
        match &response {
            Response::Fatal(report) => {
                assert_eq!(report.code, ErrorCode::InvalidRequest);
                assert_eq!(report.offending_pdu, pdu.encode(ProtocolVersion::V1).unwrap());
            }
            other => panic!("expected fatal, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Closed);
        session.finish_response();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_version_change_is_fatal() {
        let cache = cache();
        cache.apply_new_announcement_set(BTreeSet::new());
        let mut session = session(&cache);
        session.respond(ProtocolVersion::V0, Pdu::ResetQuery);
        session.finish_response();
        assert_eq!(session.version(), Some(ProtocolVersion::V0));

        match session.respond(ProtocolVersion::V1, Pdu::ResetQuery) {
            Response::Fatal(report) => {
                assert_eq!(report.code, ErrorCode::UnexpectedProtocolVersion)
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_router_error_report_closes_silently() {
        let cache = cache();
        let mut session = session(&cache);
        let response = session.respond(
            ProtocolVersion::V1,
            Pdu::error(ErrorCode::InternalError, bytes::Bytes::new(), "router broke"),
        );
        assert!(matches!(response, Response::PeerError(_)));
        assert!(collect(&response).is_empty());
        assert!(response.closes_session());
    }

    #[test]
    fn test_pending_notify_rules() {
        let cache = cache();
        let mut session = session(&cache);

        cache.apply_new_announcement_set([roa(1, "10.0.0.0/8", None)].into_iter().collect());
        assert_eq!(session.pending_notify(), None, "version not negotiated yet");

        session.respond(ProtocolVersion::V1, Pdu::ResetQuery);
        session.finish_response();
        assert_eq!(session.pending_notify(), None, "router is current");

        cache.apply_new_announcement_set([roa(2, "10.0.0.0/8", None)].into_iter().collect());
        assert_eq!(
            session.pending_notify(),
            Some(Pdu::SerialNotify {
                session_id: SESSION,
                serial: SerialNumber(2)
            })
        );
        assert_eq!(session.pending_notify(), None, "already notified");
    }

    #[test]
    fn test_cache_reset_does_not_trigger_notify() {
        let cache = Arc::new(RtrCache::with_session_id(
            SESSION,
            RetentionPolicy {
                max_deltas: 1,
                ..RetentionPolicy::default()
            },
            16,
        ));
        for asn in 1..=3 {
            cache.apply_new_announcement_set([roa(asn, "10.0.0.0/8", None)].into_iter().collect());
        }
        let mut session = session(&cache);
        let response = session.respond(
            ProtocolVersion::V1,
            Pdu::SerialQuery {
                session_id: SESSION,
                serial: SerialNumber(1),
            },
        );
        assert_eq!(collect(&response), vec![Pdu::CacheReset]);
        session.finish_response();
        assert_eq!(session.pending_notify(), None, "cache has not moved since the reset");

        cache.apply_new_announcement_set([roa(4, "10.0.0.0/8", None)].into_iter().collect());
        assert_eq!(
            session.pending_notify(),
            Some(Pdu::SerialNotify {
                session_id: SESSION,
                serial: SerialNumber(4)
            })
        );
    }

    async fn next_pdu(router: &mut Framed<DuplexStream, PduCodec>) -> Pdu {
        tokio::time::timeout(Duration::from_secs(5), router.next())
            .await
            .expect("timed out waiting for PDU")
            .expect("stream ended")
            .expect("decode failed")
            .1
    }

    fn spawn_session(
        cache: &Arc<RtrCache>,
        config: SessionConfig,
    ) -> (
        Framed<DuplexStream, PduCodec>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (client, server) = duplex(64 * 1024);
        let session = ClientSession::new(Arc::clone(cache), config);
        let task = tokio::spawn(session.run(server));
        (Framed::new(client, PduCodec::new()), task)
    }

    #[tokio::test]
    async fn test_run_answers_queries_and_notifies() {
        let cache = cache();
        let a = roa(3333, "10.0.0.0/8", Some(8));
        cache.apply_new_announcement_set([a].into_iter().collect());
        let (mut router, task) = spawn_session(&cache, SessionConfig::default());

        router.send(Pdu::ResetQuery).await.unwrap();
        assert_eq!(next_pdu(&mut router).await, Pdu::CacheResponse { session_id: SESSION });
        assert_eq!(next_pdu(&mut router).await, Pdu::prefix(Flags::Announce, &a));
        assert!(matches!(next_pdu(&mut router).await, Pdu::EndOfData { serial, .. } if serial == SerialNumber(1)));

        cache.apply_new_announcement_set(BTreeSet::new());
        assert_eq!(
            next_pdu(&mut router).await,
            Pdu::SerialNotify {
                session_id: SESSION,
                serial: SerialNumber(2)
            }
        );

        drop(router);
        assert!(task.await.unwrap().is_ok());
    }

    async fn assert_silent(router: &mut Framed<DuplexStream, PduCodec>) {
        if let Ok(frame) = tokio::time::timeout(Duration::from_millis(300), router.next()).await {
            panic!("expected no further PDUs, got {frame:?}");
        }
    }

    #[tokio::test]
    async fn test_run_cache_reset_is_not_followed_by_notify() {
        let cache = Arc::new(RtrCache::with_session_id(
            SESSION,
            RetentionPolicy {
                max_deltas: 1,
                ..RetentionPolicy::default()
            },
            16,
        ));
        for asn in 1..=3 {
            cache.apply_new_announcement_set([roa(asn, "10.0.0.0/8", None)].into_iter().collect());
        }
        let (mut router, _task) = spawn_session(&cache, SessionConfig::default());

        router
            .send(Pdu::SerialQuery {
                session_id: SESSION,
                serial: SerialNumber(1),
            })
            .await
            .unwrap();
        assert_eq!(next_pdu(&mut router).await, Pdu::CacheReset);
        assert_silent(&mut router).await;
    }

    #[tokio::test]
    async fn test_run_lagged_session_notifies_latest_serial_once() {
        let cache = Arc::new(RtrCache::with_session_id(SESSION, RetentionPolicy::default(), 1));
        cache.apply_new_announcement_set([roa(1, "10.0.0.0/8", None)].into_iter().collect());
        let (mut router, _task) = spawn_session(&cache, SessionConfig::default());

        router.send(Pdu::ResetQuery).await.unwrap();
        assert!(matches!(next_pdu(&mut router).await, Pdu::CacheResponse { .. }));
        assert!(matches!(next_pdu(&mut router).await, Pdu::Ipv4Prefix(_)));
        assert!(matches!(next_pdu(&mut router).await, Pdu::EndOfData { serial, .. } if serial == SerialNumber(1)));

        // The session task does not run between these, so its receiver lags.
        for asn in 2..=5 {
            cache.apply_new_announcement_set([roa(asn, "10.0.0.0/8", None)].into_iter().collect());
        }
        assert_eq!(cache.serial(), SerialNumber(5));

        assert_eq!(
            next_pdu(&mut router).await,
            Pdu::SerialNotify {
                session_id: SESSION,
                serial: SerialNumber(5)
            }
        );
        assert_silent(&mut router).await;
    }

    #[tokio::test]
    async fn test_run_reports_decode_error_and_closes() {
        let cache = cache();
        let (mut router, task) = spawn_session(&cache, SessionConfig::default());

        // Unknown PDU type 5.
        let io = router.get_mut();
        tokio::io::AsyncWriteExt::write_all(io, &[1, 5, 0, 0, 0, 0, 0, 8])
            .await
            .unwrap();

        match next_pdu(&mut router).await {
            Pdu::ErrorReport(report) => {
                assert_eq!(report.code, ErrorCode::UnsupportedPduType);
                assert_eq!(&report.offending_pdu[..], &[1, 5, 0, 0, 0, 0, 0, 8]);
            }
            other => panic!("expected error report, got {other:?}"),
        }
        assert!(matches!(
            task.await.unwrap(),
            Err(SessionError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_closes_idle_session() {
        let cache = cache();
        let config = SessionConfig {
            idle_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let (_router, task) = spawn_session(&cache, config);
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(SessionError::IdleTimeout(_))));
    }
}
