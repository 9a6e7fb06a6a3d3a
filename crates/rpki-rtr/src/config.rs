//! Server configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rpki_rtr_core::{Timing, MAX_PDU_LENGTH};
use rpki_rtr_session::SessionConfig;
use rpki_rtr_store::RetentionPolicy;

use crate::error::{Result, ServerError};

/// IANA-assigned port for RTR over TCP is 323; this server defaults to an
/// unprivileged one.
pub const DEFAULT_PORT: u16 = 9178;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Seconds between refreshes from the validation source.
    pub refresh_interval_secs: u64,
    pub retention: RetentionPolicy,
    pub session: SessionSettings,
    /// Capacity of the cache update broadcast channel.
    pub notify_capacity: usize,
    /// Validator JSON export to serve.
    pub source: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            refresh_interval_secs: 60,
            retention: RetentionPolicy::default(),
            session: SessionSettings::default(),
            notify_capacity: 64,
            source: None,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: ServerConfig = serde_json::from_str(&text)
            .map_err(|e| ServerError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(ServerError::Config("refresh_interval_secs must be positive".into()));
        }
        if self.retention.max_deltas == 0 {
            return Err(ServerError::Config("retention.max_deltas must be positive".into()));
        }
        if self.notify_capacity == 0 {
            return Err(ServerError::Config("notify_capacity must be positive".into()));
        }
        self.session.validate()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub refresh_interval: u32,
    pub retry_interval: u32,
    pub expire_interval: u32,
    /// Defaults to the expire interval.
    pub idle_timeout_secs: Option<u64>,
    pub max_pdu_length: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            refresh_interval: timing.refresh,
            retry_interval: timing.retry,
            expire_interval: timing.expire,
            idle_timeout_secs: None,
            max_pdu_length: MAX_PDU_LENGTH,
        }
    }
}

impl SessionSettings {
    /// RFC 8210 section 6 ranges.
    fn validate(&self) -> Result<()> {
        let check = |name: &str, value: u32, min: u32, max: u32| {
            if value < min || value > max {
                Err(ServerError::Config(format!(
                    "session.{name} must be between {min} and {max}, was {value}"
                )))
            } else {
                Ok(())
            }
        };
        check("refresh_interval", self.refresh_interval, 1, 86_400)?;
        check("retry_interval", self.retry_interval, 1, 7_200)?;
        check("expire_interval", self.expire_interval, 600, 172_800)?;
        if self.expire_interval <= self.refresh_interval.max(self.retry_interval) {
            return Err(ServerError::Config(
                "session.expire_interval must exceed the refresh and retry intervals".into(),
            ));
        }
        if self.max_pdu_length < 64 {
            return Err(ServerError::Config("session.max_pdu_length is too small".into()));
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            refresh: self.refresh_interval,
            retry: self.retry_interval,
            expire: self.expire_interval,
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            timing: self.timing(),
            idle_timeout: Duration::from_secs(
                self.idle_timeout_secs
                    .unwrap_or(u64::from(self.expire_interval)),
            ),
            max_pdu_length: self.max_pdu_length,
        }
    }
}
