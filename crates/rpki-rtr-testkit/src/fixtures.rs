//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a cache with a fixed session
//! id, a scriptable validation source, and a router that speaks RTR and
//! mirrors what it receives.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use rpki_rtr::{RtrServer, SourceError, Validated, ValidationSource};
use rpki_rtr_core::{Announcement, Asn, ErrorCode, Pdu, ProtocolVersion, SessionId};
use rpki_rtr_session::{ClientSession, MirrorError, PduCodec, RouterTable, SessionConfig, SessionError};
use rpki_rtr_store::{RetentionPolicy, RtrCache, UpdateOutcome};

/// Session id of every [`TestFixture`] cache.
pub const FIXTURE_SESSION_ID: SessionId = SessionId::new(0x2a);

/// How long a [`TestRouter`] waits for the cache before giving up.
pub const DEFAULT_ROUTER_TIMEOUT: Duration = Duration::from_secs(5);

/// A normalized announcement.
///
/// Panics on an invalid prefix or maximum length.
pub fn roa(asn: u32, prefix: &str, max_length: Option<u8>) -> Announcement {
    let prefix = prefix
        .parse()
        .unwrap_or_else(|e| panic!("invalid prefix {prefix}: {e}"));
    Announcement::new(Asn(asn), prefix, max_length)
        .unwrap_or_else(|e| panic!("invalid announcement: {e}"))
        .normalized()
}

/// Collect announcements into a set.
pub fn set<'a>(announcements: impl IntoIterator<Item = &'a Announcement>) -> BTreeSet<Announcement> {
    announcements.into_iter().copied().collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache Fixture
// ─────────────────────────────────────────────────────────────────────────────

/// A cache with a known session id and session settings for tests.
pub struct TestFixture {
    pub cache: Arc<RtrCache>,
    pub config: SessionConfig,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::default())
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            cache: Arc::new(RtrCache::with_session_id(FIXTURE_SESSION_ID, retention, 64)),
            config: SessionConfig::default(),
        }
    }

    /// Keep at most `max_deltas` deltas.
    pub fn with_max_deltas(max_deltas: usize) -> Self {
        Self::with_retention(RetentionPolicy {
            max_deltas,
            ..RetentionPolicy::default()
        })
    }

    /// Replace the cache contents with `announcements`.
    pub fn update(&self, announcements: &[Announcement]) -> UpdateOutcome {
        self.cache.apply_new_announcement_set(set(announcements))
    }

    /// A session over the fixture cache, not yet connected.
    pub fn session(&self) -> ClientSession {
        ClientSession::new(self.cache.clone(), self.config.clone())
    }

    /// Run a session over an in-memory stream and return the router end.
    pub fn connect(&self) -> (TestRouter<DuplexStream>, JoinHandle<Result<(), SessionError>>) {
        let (router_io, cache_io) = tokio::io::duplex(64 * 1024);
        let session = self.session();
        let task = tokio::spawn(session.run(cache_io));
        (TestRouter::new(router_io), task)
    }

    /// Serve the fixture cache on an ephemeral local TCP port.
    pub async fn serve(&self) -> std::io::Result<RunningServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = RtrServer::new(self.cache.clone(), self.config.clone());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener, shutdown_rx).await }
        });
        Ok(RunningServer {
            addr,
            server,
            shutdown,
            task,
        })
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A server started by [`TestFixture::serve`].
pub struct RunningServer {
    pub addr: SocketAddr,
    pub server: RtrServer,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<rpki_rtr::Result<()>>,
}

impl RunningServer {
    /// Stop accepting and wait for the accept loop to exit.
    pub async fn stop(self) -> rpki_rtr::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(e) => panic!("server task panicked: {e}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation Source
// ─────────────────────────────────────────────────────────────────────────────

/// A validation source whose output is set by the test.
///
/// Starts not ready.
#[derive(Debug)]
pub struct StaticSource {
    state: Mutex<Validated>,
    unavailable: AtomicBool,
}

impl StaticSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Validated::NotReady),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn set_ready(&self, announcements: &[Announcement]) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Validated::Ready(set(announcements));
    }

    pub fn set_not_ready(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Validated::NotReady;
    }

    /// Make fetches fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ValidationSource for StaticSource {
    async fn fetch(&self) -> Result<Validated, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Io {
                path: PathBuf::from("static"),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "source unavailable"),
            });
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn describe(&self) -> String {
        "static".into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Router
// ─────────────────────────────────────────────────────────────────────────────

/// Failures seen by a [`TestRouter`].
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("no PDU from the cache within {0:?}")]
    Timeout(Duration),

    #[error("cache closed the connection")]
    Closed,

    #[error("cache sent error report ({code:?}): {text}")]
    Report { code: ErrorCode, text: String },
}

/// A router connected to the cache.
///
/// Keeps a [`RouterTable`] up to date from the responses it receives, and
/// records Serial Notify PDUs that arrive between responses.
pub struct TestRouter<T> {
    framed: Framed<T, PduCodec>,
    table: RouterTable,
    notifies: Vec<Pdu>,
    timeout: Duration,
}

impl TestRouter<TcpStream> {
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        Ok(Self::new(TcpStream::connect(addr).await?))
    }
}

impl<T> TestRouter<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, PduCodec::new()),
            table: RouterTable::new(),
            notifies: Vec::new(),
            timeout: DEFAULT_ROUTER_TIMEOUT,
        }
    }

    /// Speak `version` instead of the latest version.
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.framed.codec_mut().set_version(version);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &RouterTable {
        &self.table
    }

    /// Serial Notify PDUs received so far, oldest first.
    pub fn notifies(&self) -> &[Pdu] {
        &self.notifies
    }

    pub fn take_notifies(&mut self) -> Vec<Pdu> {
        std::mem::take(&mut self.notifies)
    }

    pub async fn send(&mut self, pdu: Pdu) -> Result<(), RouterError> {
        self.framed.send(pdu).await?;
        Ok(())
    }

    /// Write raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), RouterError> {
        use tokio::io::AsyncWriteExt;

        let io = self.framed.get_mut();
        io.write_all(bytes).await.map_err(SessionError::from)?;
        io.flush().await.map_err(SessionError::from)?;
        Ok(())
    }

    /// The next PDU from the cache.
    pub async fn recv(&mut self) -> Result<Pdu, RouterError> {
        match tokio::time::timeout(self.timeout, self.framed.next()).await {
            Err(_) => Err(RouterError::Timeout(self.timeout)),
            Ok(None) => Err(RouterError::Closed),
            Ok(Some(frame)) => Ok(frame?.1),
        }
    }

    /// Wait for a Serial Notify, taking one already received if present.
    pub async fn recv_notify(&mut self) -> Result<Pdu, RouterError> {
        if !self.notifies.is_empty() {
            return Ok(self.notifies.remove(0));
        }
        loop {
            let pdu = self.recv().await?;
            if matches!(pdu, Pdu::SerialNotify { .. }) {
                return Ok(pdu);
            }
        }
    }

    /// True if the connection was closed by the cache.
    pub async fn is_closed(&mut self) -> bool {
        matches!(self.recv().await, Err(RouterError::Closed | RouterError::Session(_)))
    }

    /// Read one complete response.
    ///
    /// Serial Notify PDUs ahead of the response are recorded, not returned.
    /// The response ends at End of Data, Cache Reset or Error Report.
    pub async fn recv_response(&mut self) -> Result<Vec<Pdu>, RouterError> {
        let mut pdus = Vec::new();
        loop {
            let pdu = self.recv().await?;
            match pdu {
                Pdu::SerialNotify { .. } if pdus.is_empty() => self.notifies.push(pdu),
                Pdu::EndOfData { .. } | Pdu::CacheReset | Pdu::ErrorReport(_) => {
                    pdus.push(pdu);
                    return Ok(pdus);
                }
                _ => pdus.push(pdu),
            }
        }
    }

    /// Send `query` and read the response, without touching the table.
    pub async fn query(&mut self, query: Pdu) -> Result<Vec<Pdu>, RouterError> {
        self.send(query).await?;
        self.recv_response().await
    }

    /// Bring the table up to date, the way a router polls.
    ///
    /// Sends a Serial Query when the table holds data and a Reset Query
    /// otherwise, and falls back to a Reset Query after a Cache Reset.
    /// Returns the response that was applied last.
    pub async fn sync(&mut self) -> Result<Vec<Pdu>, RouterError> {
        loop {
            let query = self.table.next_query();
            let response = self.query(query).await?;
            if let Some(Pdu::ErrorReport(report)) = response.last() {
                return Err(RouterError::Report {
                    code: report.code,
                    text: report.text.clone(),
                });
            }
            self.table.apply_response(&response)?;
            if response.first() != Some(&Pdu::CacheReset) {
                return Ok(response);
            }
        }
    }
}
