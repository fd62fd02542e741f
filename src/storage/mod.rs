//! Per-user cache directory and the files the bootstrapper keeps in it.
//!
//! The cache root holds three files: the TTL-cached version catalog, the
//! installed-version marker and the artifact itself. A single bootstrapper
//! process is assumed per cache root; nothing here takes file locks.

pub mod local;
pub mod ttl;

use crate::error::{BootError, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub use local::LocalResource;
pub use ttl::{TtlCachedResource, UnreadablePolicy};

pub const CATALOG_FILE: &str = "versions";
pub const MARKER_FILE: &str = "version.jx";
pub const ARTIFACT_FILE: &str = "intave.jx";

pub const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Windows,
    Other,
}

impl OsKind {
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(name: &str) -> Self {
        if name.to_lowercase().starts_with("windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

/// Cache root for an OS, given the environment it would read.
pub fn cache_root(os: OsKind, appdata: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    match os {
        OsKind::Windows => appdata.map(|dir| dir.join("Intave").join("Bootstrap")),
        OsKind::Other => home.map(|dir| dir.join(".intave").join("bootstrap")),
    }
}

#[derive(Debug, Clone)]
pub struct CacheRoot {
    dir: PathBuf,
}

impl CacheRoot {
    /// Use `dir` as the cache root, creating it if needed.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            BootError::CacheRoot(format!("unable to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Resolve the per-OS default location from the process environment.
    pub fn resolve() -> Result<Self> {
        let appdata = std::env::var_os("APPDATA").map(PathBuf::from);
        let home = dirs::home_dir();
        let dir = cache_root(OsKind::current(), appdata.as_deref(), home.as_deref())
            .ok_or_else(|| BootError::CacheRoot("no APPDATA or home directory".to_string()))?;
        Self::at(dir)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// A file named `name` directly under the root.
    pub fn local(&self, name: &str) -> LocalResource {
        LocalResource::new(self.dir.join(name))
    }

    /// The installed-version marker.
    pub fn marker(&self) -> LocalResource {
        self.local(MARKER_FILE)
    }

    /// The downloaded artifact.
    pub fn artifact(&self) -> LocalResource {
        self.local(ARTIFACT_FILE)
    }

    /// The version catalog fetched from `origin`, cached for a day.
    pub fn catalog(&self, origin: &str) -> TtlCachedResource {
        TtlCachedResource::new(origin, self.dir.join(CATALOG_FILE), CATALOG_TTL)
    }
}

/// Stamp a file's modification time.
pub(crate) fn touch(path: &Path, time: SystemTime) -> io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_modified(time)
}

/// Age of a file by modification time; a timestamp in the future counts as zero.
pub(crate) fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}
