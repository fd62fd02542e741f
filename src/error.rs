use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootError {
    #[error("Invalid authkey: expected {expected} characters, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("Failed to refresh {origin}: {reason}")]
    RefreshFailed { origin: String, reason: String },

    #[error("Authentication rejected: {response}")]
    AuthRejected { response: String },

    #[error("Authentication succeeded but the server sent no session cookies")]
    MissingCredentials,

    #[error("Download of {version} failed: {reason}")]
    DownloadFailed { version: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown version channel \"{0}\"")]
    UnknownChannel(String),

    #[error("Malformed version catalog: {0}")]
    MalformedCatalog(String),

    #[error("HTTP error on {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Unable to determine cache directory: {0}")]
    CacheRoot(String),

    #[error("Cache file {} is unreadable: {reason}", .path.display())]
    UnreadableCache { path: PathBuf, reason: String },

    #[error("Activation failed: {0}")]
    Activation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootError {
    /// Errors caused by local configuration rather than the remote service.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BootError::InvalidKey { .. } | BootError::UnknownChannel(_) | BootError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BootError>;
