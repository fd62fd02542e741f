use crate::error::{BootError, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{file_age, touch};

/// A named file in the cache root. No expiry of its own.
#[derive(Debug, Clone)]
pub struct LocalResource {
    path: PathBuf,
}

impl LocalResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Present and non-empty. A cleared artifact exists but is not usable.
    pub fn is_usable(&self) -> bool {
        self.len().map(|len| len > 0).unwrap_or(false)
    }

    pub fn len(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    pub fn age(&self) -> Option<Duration> {
        file_age(&self.path)
    }

    /// Open for reading. Reading refreshes the modification time.
    pub fn read(&self) -> Result<File> {
        if !self.exists() {
            return Err(BootError::NotFound(self.path.display().to_string()));
        }
        if let Err(e) = touch(&self.path, SystemTime::now()) {
            debug!(path = %self.path.display(), error = %e, "unable to touch resource");
        }
        Ok(File::open(&self.path)?)
    }

    pub fn read_to_string(&self) -> Result<String> {
        let mut content = String::new();
        self.read()?.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Replace the content with everything `reader` yields.
    ///
    /// The data lands in a sibling temp file that is renamed over the
    /// destination once complete, so a reader that fails midway leaves the
    /// previous content in place. Returns whether the file exists afterwards.
    pub fn write<R: Read + ?Sized>(&self, reader: &mut R) -> Result<bool> {
        let (staged, written) = self.stage(reader)?;
        self.commit(staged, written)?;
        Ok(self.exists())
    }

    /// Like `write`, but an empty stream is discarded and the previous
    /// content stays in place. Returns the bytes written, `None` when empty.
    pub fn write_nonempty<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Option<u64>> {
        let (staged, written) = self.stage(reader)?;
        if written == 0 {
            debug!(path = %self.path.display(), "empty stream, keeping previous content");
            return Ok(None);
        }
        self.commit(staged, written)?;
        Ok(Some(written))
    }

    fn stage<R: Read + ?Sized>(&self, reader: &mut R) -> Result<(NamedTempFile, u64)> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| BootError::NotFound(format!("parent of {}", self.path.display())))?;
        fs::create_dir_all(parent)?;

        let mut staged = NamedTempFile::new_in(parent)?;
        let written = io::copy(reader, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        Ok((staged, written))
    }

    fn commit(&self, staged: NamedTempFile, written: u64) -> Result<()> {
        staged.persist(&self.path).map_err(|e| BootError::Io(e.error))?;
        touch(&self.path, SystemTime::now())?;
        debug!(path = %self.path.display(), bytes = written, "resource written");
        Ok(())
    }

    /// Read the whole file without refreshing its modification time.
    /// Missing is `Ok(None)`.
    pub fn peek_to_string(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<bool> {
        self.write(&mut io::Cursor::new(bytes))
    }

    /// Truncate to empty, keeping the file.
    pub fn clear(&self) -> Result<()> {
        self.write_bytes(&[])?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
