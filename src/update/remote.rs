use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use super::auth::AuthToken;
use crate::error::{BootError, Result};
use crate::http::{Request, Transport};
use crate::storage::LocalResource;

const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DOWNLOAD_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub versions: String,
    pub authenticate: String,
    pub download: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            versions: "https://service.intave.de/versions".to_string(),
            authenticate: "https://intave.de/keyauthenticate.php".to_string(),
            download: "https://intave.de/download-intave.php".to_string(),
        }
    }
}

/// Stream `version` from the download endpoint into `dest`.
pub fn download_artifact<T: Transport>(
    transport: &T,
    endpoint: &str,
    version: &str,
    token: &AuthToken,
    dest: &LocalResource,
    show_progress: bool,
) -> Result<u64> {
    let failed = |reason: String| BootError::DownloadFailed {
        version: version.to_string(),
        reason,
    };

    let request = Request::get(endpoint, DOWNLOAD_CONNECT_TIMEOUT, DOWNLOAD_READ_TIMEOUT)
        .header("RequestedVersion", version)
        .header("Cookie", &token.header_value());
    let response = transport
        .get(&request)
        .map_err(|e| failed(e.to_string()))?;
    if !response.is_success() {
        return Err(failed(format!("HTTP {}", response.status)));
    }

    let pb = progress_bar(response.content_length(), show_progress);
    let mut body = pb.wrap_read(response.body);
    let written = dest
        .write_nonempty(&mut body)
        .map_err(|e| failed(e.to_string()))?;
    pb.finish_and_clear();

    let bytes = written.ok_or_else(|| failed("server sent an empty artifact".to_string()))?;
    info!(version, bytes, "Download complete");
    Ok(bytes)
}

fn progress_bar(total: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}
