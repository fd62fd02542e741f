use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{BootError, Result};

pub const RUNTIME_ARTIFACT: &str = "intave.jar";

/// The host's mechanism for loading the artifact.
pub trait ActivationTarget {
    fn activate(&mut self, artifact: &Path) -> Result<()>;
    fn deactivate(&mut self) -> Result<()>;
}

/// Copies the artifact into a runtime directory the host loads from.
#[derive(Debug, Clone)]
pub struct RuntimeCopyActivation {
    runtime_dir: PathBuf,
    active: Option<PathBuf>,
}

impl RuntimeCopyActivation {
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            active: None,
        }
    }

    pub fn target_path(&self) -> PathBuf {
        self.runtime_dir.join(RUNTIME_ARTIFACT)
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }
}

impl ActivationTarget for RuntimeCopyActivation {
    fn activate(&mut self, artifact: &Path) -> Result<()> {
        if !artifact.is_file() {
            return Err(BootError::Activation(format!(
                "artifact {} is missing",
                artifact.display()
            )));
        }
        fs::create_dir_all(&self.runtime_dir)?;

        // Copy beside the target first so the host never sees a partial jar
        let target = self.target_path();
        let staged = NamedTempFile::new_in(&self.runtime_dir)?;
        fs::copy(artifact, staged.path())
            .map_err(|e| BootError::Activation(format!("failed to stage artifact: {}", e)))?;
        staged
            .persist(&target)
            .map_err(|e| BootError::Activation(format!("failed to install artifact: {}", e.error)))?;

        info!(path = %target.display(), "Artifact activated");
        self.active = Some(target);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        if let Some(path) = self.active.take() {
            debug!(path = %path.display(), "deactivating");
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
