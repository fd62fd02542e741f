use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BootError, Result};
use crate::storage::UnreadablePolicy;
use crate::update::{Endpoints, MarkerPolicy};

pub const DEFAULT_CHANNEL: &str = "STABLE";

/// String settings by key, with a fallback.
pub trait ConfigProvider {
    fn get_string(&self, key: &str, default: &str) -> String;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub authkey: Option<String>,

    /// Version channel, e.g. STABLE or LATEST
    #[serde(default = "default_channel")]
    pub version: String,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,

    #[serde(default)]
    pub marker_policy: MarkerPolicy,

    #[serde(default)]
    pub unreadable_cache: UnreadablePolicy,

    #[serde(default = "default_true")]
    pub progress: bool,

    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authkey: None,
            version: default_channel(),
            cache_dir: None,
            runtime_dir: None,
            marker_policy: MarkerPolicy::default(),
            unreadable_cache: UnreadablePolicy::default(),
            progress: true,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| BootError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| match e {
            BootError::Config(msg) => BootError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BootError::Config(e.to_string()))
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("intave-boot")
            .join("config.toml")
    }
}

impl ConfigProvider for Config {
    fn get_string(&self, key: &str, default: &str) -> String {
        let value = match key {
            "authkey" => self.authkey.clone(),
            "version" => Some(self.version.clone()),
            "cache_dir" => self.cache_dir.as_ref().map(|p| p.display().to_string()),
            "runtime_dir" => self.runtime_dir.as_ref().map(|p| p.display().to_string()),
            _ => None,
        };
        value.unwrap_or_else(|| default.to_string())
    }
}
