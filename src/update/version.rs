use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use super::lenient;
use crate::error::{BootError, Result};
use crate::http::Transport;
use crate::storage::TtlCachedResource;

/// Release timestamps above this are taken as epoch milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Outdated,
    Latest,
    Stable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown version status \"{0}\"")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OUTDATED" => Ok(Self::Outdated),
            "LATEST" => Ok(Self::Latest),
            "STABLE" => Ok(Self::Stable),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Outdated => "OUTDATED",
            Self::Latest => "LATEST",
            Self::Stable => "STABLE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    name: String,
    release: i64,
    status: Status,
}

impl VersionRecord {
    pub fn new(name: impl Into<String>, release: i64, status: Status) -> Self {
        Self {
            name: name.into(),
            release,
            status,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(&self) -> i64 {
        self.release
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        if self.release.abs() > MILLIS_THRESHOLD {
            Utc.timestamp_millis_opt(self.release).single()
        } else {
            Utc.timestamp_opt(self.release, 0).single()
        }
    }

    /// Parse one catalog entry. `Ok(None)` for entries with an unknown status.
    fn from_json(value: &Value) -> Result<Option<Self>> {
        let object = value
            .as_object()
            .ok_or_else(|| BootError::MalformedCatalog(format!("expected object, got {}", value)))?;

        let field = |key: &str| {
            object
                .get(key)
                .ok_or_else(|| BootError::MalformedCatalog(format!("entry without \"{}\": {}", key, value)))
        };

        let name = match field("name")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let release = match field("release")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| BootError::MalformedCatalog(format!("bad release for {}", name)))?;
        let status_raw = match field("status")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match status_raw.parse::<Status>() {
            Ok(status) => Ok(Some(Self::new(name, release, status))),
            Err(e) => {
                warn!(version = %name, error = %e, "skipping entry");
                Ok(None)
            }
        }
    }
}

/// Version records, newest release first.
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    records: Vec<VersionRecord>,
}

impl VersionCatalog {
    pub fn new(mut records: Vec<VersionRecord>) -> Self {
        // stable: equal releases keep feed order
        records.sort_by(|a, b| b.release.cmp(&a.release));
        Self { records }
    }

    /// Fetch the catalog through its TTL cache. A failed refresh falls back
    /// to the cached copy, or to an empty catalog. A cached copy that is not
    /// a catalog goes through the cache's unreadable policy, so by default
    /// it is deleted and refetched on the next lookup.
    pub fn lookup<T: Transport>(resource: &TtlCachedResource, transport: &T) -> Result<Self> {
        let tokens = resource.read_tokens_best_effort(transport)?;
        let catalog = match Self::parse(&tokens.join(" ")) {
            Ok(catalog) => catalog,
            Err(BootError::MalformedCatalog(reason)) if resource.path().is_file() => {
                resource.discard_local(format!("malformed catalog: {}", reason))?;
                Self::default()
            }
            Err(e) => return Err(e),
        };
        debug!(versions = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(&lenient::normalize(raw))
            .map_err(|e| BootError::MalformedCatalog(e.to_string()))?;
        let entries = value
            .as_array()
            .ok_or_else(|| BootError::MalformedCatalog("expected a JSON array".to_string()))?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(record) = VersionRecord::from_json(entry)? {
                records.push(record);
            }
        }
        Ok(Self::new(records))
    }

    /// Newest record with `status`.
    pub fn find_by_status(&self, status: Status) -> Result<&VersionRecord> {
        self.records
            .iter()
            .find(|record| record.status == status)
            .ok_or_else(|| BootError::NotFound(format!("no {} version published", status)))
    }

    pub fn latest(&self) -> Result<&VersionRecord> {
        self.find_by_status(Status::Latest)
    }

    pub fn stable(&self) -> Result<&VersionRecord> {
        self.find_by_status(Status::Stable)
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
