//! Read-only monitoring view.

use serde::Serialize;

use rpki_rtr_session::{ClientInfo, ClientRegistry};
use rpki_rtr_store::{CacheStatus, RtrCache};

/// Cache state plus the routers currently connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub cache: CacheStatus,
    pub clients: Vec<ClientInfo>,
}

impl ServerStatus {
    pub fn collect(cache: &RtrCache, registry: &ClientRegistry) -> Self {
        Self {
            cache: cache.status(),
            clients: registry.clients(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpki_rtr_core::{Announcement, Asn, SerialNumber, SessionId};
    use rpki_rtr_store::RetentionPolicy;

    #[test]
    fn test_status_json() {
        let cache = RtrCache::with_session_id(SessionId::new(7), RetentionPolicy::default(), 4);
        let roa = Announcement::new(Asn(3333), "10.0.0.0/8".parse().unwrap(), None).unwrap();
        cache.apply_new_announcement_set([roa].into_iter().collect());

        let registry = ClientRegistry::new();
        let _handle = registry.register(None);

        let status = ServerStatus::collect(&cache, &registry);
        assert!(status.cache.ready);
        assert_eq!(status.cache.serial, SerialNumber(1));
        assert_eq!(status.clients.len(), 1);

        let json: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(json["cache"]["announcements"], 1);
        assert_eq!(json["cache"]["deltas"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["clients"][0]["id"], 0);
    }
}
