//! Validation sources.
//!
//! A [`ValidationSource`] yields the complete validated announcement set the
//! cache should serve. The refresh adapter polls it; the cache never sees a
//! partial set.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rpki_rtr_core::{Announcement, Asn, IpPrefix};

use crate::error::SourceError;

/// Outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    /// The validator finished a run; this is its full output.
    Ready(BTreeSet<Announcement>),
    /// The validator has not completed a run yet.
    NotReady,
}

/// Where validated announcements come from.
#[async_trait]
pub trait ValidationSource: Send + Sync {
    /// Fetch the current validated set.
    async fn fetch(&self) -> Result<Validated, SourceError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Reads a validator JSON export from disk on every fetch.
///
/// Expected shape:
///
/// ```json
/// {"data": {"ready": true, "roas": [{"asn": "AS3333", "prefix": "10.0.0.0/8", "maxLength": 8}]}}
/// ```
///
/// Unknown fields are ignored. Records are normalized, so two entries that
/// differ only in an explicit maximum length equal to the prefix length
/// collapse into one.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ValidationSource for JsonFileSource {
    async fn fetch(&self) -> Result<Validated, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let validated = parse_export(&bytes)?;
        if let Validated::Ready(set) = &validated {
            debug!(path = %self.path.display(), records = set.len(), "read validator export");
        }
        Ok(validated)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Export {
    data: ExportData,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    ready: bool,
    #[serde(default)]
    roas: Vec<ExportRoa>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRoa {
    asn: ExportAsn,
    prefix: String,
    #[serde(default)]
    max_length: Option<u8>,
}

/// Validators write the ASN either as `"AS3333"` or as a bare number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportAsn {
    Number(u32),
    Text(String),
}

impl ExportRoa {
    fn to_announcement(&self) -> Result<Announcement, SourceError> {
        let invalid = |reason| SourceError::Invalid {
            record: format!("{:?} {} {:?}", self.asn, self.prefix, self.max_length),
            reason,
        };
        let asn = match &self.asn {
            ExportAsn::Number(n) => Asn(*n),
            ExportAsn::Text(s) => s.parse().map_err(invalid)?,
        };
        let prefix: IpPrefix = self.prefix.parse().map_err(invalid)?;
        let announcement = Announcement::new(asn, prefix, self.max_length).map_err(invalid)?;
        Ok(announcement.normalized())
    }
}

/// Parse a validator export document.
pub fn parse_export(bytes: &[u8]) -> Result<Validated, SourceError> {
    let export: Export = serde_json::from_slice(bytes)?;
    if !export.data.ready {
        return Ok(Validated::NotReady);
    }
    let set = export
        .data
        .roas
        .iter()
        .map(ExportRoa::to_announcement)
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(Validated::Ready(set))
}
