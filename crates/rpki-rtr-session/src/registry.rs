//! Registry of connected routers, for monitoring.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use rpki_rtr_core::{ProtocolVersion, SerialNumber, SessionId};

/// What the server knows about one connected router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: u64,
    pub remote_addr: Option<SocketAddr>,
    /// Unix milliseconds.
    pub connected_at: i64,
    pub version: Option<ProtocolVersion>,
    /// Session id and serial of the last complete response.
    pub session_id: Option<SessionId>,
    pub serial: Option<SerialNumber>,
    /// Unix milliseconds of the last PDU received.
    pub last_activity: i64,
}

/// Shared registry of live sessions.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: RwLock<BTreeMap<u64, ClientInfo>>,
}

impl ClientRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new session. The entry lives as long as the returned
    /// handle.
    pub fn register(self: &Arc<Self>, remote_addr: Option<SocketAddr>) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = now_millis();
        self.write(|clients| {
            clients.insert(
                id,
                ClientInfo {
                    id,
                    remote_addr,
                    connected_at: now,
                    version: None,
                    session_id: None,
                    serial: None,
                    last_activity: now,
                },
            );
        });
        ClientHandle {
            id,
            registry: Arc::clone(self),
        }
    }

    /// All live sessions, in connection order.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write<R>(&self, f: impl FnOnce(&mut BTreeMap<u64, ClientInfo>) -> R) -> R {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut clients)
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut ClientInfo)) {
        self.write(|clients| {
            if let Some(info) = clients.get_mut(&id) {
                f(info);
            }
        });
    }
}

/// Registration of one session. Dropping it removes the entry.
#[derive(Debug)]
pub struct ClientHandle {
    id: u64,
    registry: Arc<ClientRegistry>,
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_version(&self, version: ProtocolVersion) {
        self.registry.update(self.id, |info| info.version = Some(version));
    }

    pub fn record_delivered(&self, session_id: SessionId, serial: SerialNumber) {
        self.registry.update(self.id, |info| {
            info.session_id = Some(session_id);
            info.serial = Some(serial);
        });
    }

    /// Forget the delivered state, after a Cache Reset.
    pub fn clear_delivered(&self) {
        self.registry.update(self.id, |info| {
            info.session_id = None;
            info.serial = None;
        });
    }

    pub fn touch(&self) {
        let now = now_millis();
        self.registry.update(self.id, |info| info.last_activity = now);
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.registry.write(|clients| clients.remove(&self.id));
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
