//! The RTR server: accepts router connections and runs one session each.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use rpki_rtr_session::{ClientRegistry, ClientSession, SessionConfig, SessionError};
use rpki_rtr_store::RtrCache;

use crate::error::Result;
use crate::monitor::ServerStatus;

/// First pause after a failed accept; doubles per consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before accepting again after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Serves a shared cache to any number of routers.
///
/// Each accepted connection gets its own task and [`ClientSession`]. A
/// failing session is logged and dropped; it never affects the accept loop
/// or other sessions.
#[derive(Clone)]
pub struct RtrServer {
    cache: Arc<RtrCache>,
    registry: Arc<ClientRegistry>,
    config: SessionConfig,
}

impl RtrServer {
    pub fn new(cache: Arc<RtrCache>, config: SessionConfig) -> Self {
        Self {
            cache,
            registry: ClientRegistry::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<RtrCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Monitoring view of the cache and connected routers.
    pub fn status(&self) -> ServerStatus {
        ServerStatus::collect(&self.cache, &self.registry)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accept Loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind `addr` and serve until `shutdown` flips to `true`.
    pub async fn bind_and_serve(&self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` flips to `true`.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, session_id = %self.cache.session_id(), "RTR server listening");

        let mut failures = 0u32;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            failures = 0;
                            self.spawn_session(stream, remote_addr);
                        }
                        // Accept errors are per connection, but some (EMFILE)
                        // persist until a descriptor frees up.
                        Err(error) => {
                            failures = failures.saturating_add(1);
                            let pause = accept_backoff(failures);
                            warn!(%error, ?pause, "failed to accept connection");
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(%local_addr, "RTR server stopped accepting connections");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, remote_addr: SocketAddr) {
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%remote_addr, %error, "failed to set TCP_NODELAY");
        }
        let handle = self.registry.register(Some(remote_addr));
        let client_id = handle.id();
        let session = ClientSession::new(self.cache.clone(), self.config.clone()).with_registration(handle);
        info!(%remote_addr, client_id, clients = self.registry.len(), "router connected");

        tokio::spawn(async move {
            match session.run(stream).await {
                Ok(()) => info!(%remote_addr, client_id, "router disconnected"),
                Err(SessionError::IdleTimeout(timeout)) => {
                    info!(%remote_addr, client_id, ?timeout, "router session timed out")
                }
                Err(error) if error.is_protocol_violation() => {
                    warn!(%remote_addr, client_id, %error, "router session closed after protocol error")
                }
                Err(error) => warn!(%remote_addr, client_id, %error, "router session failed"),
            }
        });
    }
}
