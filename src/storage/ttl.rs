use crate::error::{BootError, Result};
use crate::http::{Request, Transport};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{file_age, touch};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// What to do when the local copy cannot be read or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreadablePolicy {
    /// Delete the file and serve an empty payload.
    #[default]
    Discard,
    /// Fail with `UnreadableCache`.
    Fail,
}

/// A local copy of a remote file that is refetched once older than its TTL.
#[derive(Debug, Clone)]
pub struct TtlCachedResource {
    origin: String,
    path: PathBuf,
    ttl: Duration,
    unreadable: UnreadablePolicy,
}

impl TtlCachedResource {
    pub fn new(origin: &str, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            origin: origin.to_string(),
            path: path.into(),
            ttl,
            unreadable: UnreadablePolicy::default(),
        }
    }

    pub fn with_unreadable_policy(mut self, policy: UnreadablePolicy) -> Self {
        self.unreadable = policy;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn age(&self) -> Option<Duration> {
        if !self.path.is_file() {
            return None;
        }
        file_age(&self.path)
    }

    pub fn is_fresh(&self) -> bool {
        self.age().map(|age| age <= self.ttl).unwrap_or(false)
    }

    /// Fetch the origin and replace the local copy. The local copy is only
    /// replaced when the whole body arrived.
    pub fn refresh<T: Transport>(&self, transport: &T) -> Result<()> {
        let refresh_failed = |reason: String| BootError::RefreshFailed {
            origin: self.origin.clone(),
            reason,
        };

        let request = Request::get(&self.origin, CONNECT_TIMEOUT, READ_TIMEOUT);
        let mut response = transport
            .get(&request)
            .map_err(|e| refresh_failed(e.to_string()))?;
        if !response.is_success() {
            return Err(refresh_failed(format!("HTTP {}", response.status)));
        }

        let parent = self
            .path
            .parent()
            .ok_or_else(|| refresh_failed("cache path has no parent".to_string()))?;
        fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        let bytes = io::copy(&mut response.body, staged.as_file_mut())
            .map_err(|e| refresh_failed(e.to_string()))?;
        staged.persist(&self.path).map_err(|e| BootError::Io(e.error))?;
        touch(&self.path, SystemTime::now())?;

        info!(origin = %self.origin, bytes, "cache refreshed");
        Ok(())
    }

    /// Whitespace-separated tokens of a fresh copy, refreshing first when
    /// the local copy is missing or older than the TTL.
    pub fn read_tokens<T: Transport>(&self, transport: &T) -> Result<Vec<String>> {
        if !self.is_fresh() {
            debug!(path = %self.path.display(), "cache stale or missing");
            self.refresh(transport)?;
        }
        self.read_local()
    }

    /// Like `read_tokens`, but a failed refresh serves whatever is on disk,
    /// possibly stale, possibly nothing.
    pub fn read_tokens_best_effort<T: Transport>(&self, transport: &T) -> Result<Vec<String>> {
        if !self.is_fresh() {
            if let Err(e) = self.refresh(transport) {
                warn!(error = %e, stale = self.path.is_file(), "serving cached copy");
            }
        }
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        self.read_local()
    }

    fn read_local(&self) -> Result<Vec<String>> {
        let decoded = fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));

        match decoded {
            Ok(text) => Ok(text.split_whitespace().map(String::from).collect()),
            Err(reason) => self.discard_local(reason),
        }
    }

    /// Give up on the local copy as the unreadable policy says: `Discard`
    /// deletes it so the next read refetches and serves nothing now, `Fail`
    /// keeps it and reports `UnreadableCache`.
    pub fn discard_local(&self, reason: String) -> Result<Vec<String>> {
        match self.unreadable {
            UnreadablePolicy::Discard => {
                warn!(path = %self.path.display(), %reason, "discarding unusable cache file");
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %self.path.display(), error = %e, "failed to remove cache file")
                    }
                }
                Ok(Vec::new())
            }
            UnreadablePolicy::Fail => Err(BootError::UnreadableCache {
                path: self.path.clone(),
                reason,
            }),
        }
    }
}
