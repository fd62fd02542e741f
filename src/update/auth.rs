use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BootError, Result};
use crate::http::{Request, Transport};

pub const KEY_LENGTH: usize = 128;

const TIMEOUT: Duration = Duration::from_secs(5);
const SUCCESS: &str = "success";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    /// Name and value of a `Set-Cookie` header; attributes are dropped.
    pub fn parse(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
        })
    }
}

/// Session cookies for one download. Never written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    cookies: Vec<Cookie>,
}

impl AuthToken {
    /// Token carrying `cookies` in the order the server sent them.
    pub fn from_cookies(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Value for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// A secret key must be exactly `KEY_LENGTH` characters.
pub fn validate_key(secret_key: &str) -> Result<()> {
    let actual = secret_key.chars().count();
    if actual != KEY_LENGTH {
        return Err(BootError::InvalidKey {
            expected: KEY_LENGTH,
            actual,
        });
    }
    Ok(())
}

/// Exchanges the long-lived secret key for session cookies.
pub struct AuthSession<'a, T: Transport> {
    transport: &'a T,
    endpoint: &'a str,
}

impl<'a, T: Transport> AuthSession<'a, T> {
    pub fn new(transport: &'a T, endpoint: &'a str) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn authenticate(&self, secret_key: &str) -> Result<AuthToken> {
        validate_key(secret_key)?;

        let http_error = |reason: String| BootError::Http {
            url: self.endpoint.to_string(),
            reason,
        };

        let request = Request::get(self.endpoint, TIMEOUT, TIMEOUT).header("Key", secret_key);
        let response = self
            .transport
            .get(&request)
            .map_err(|e| http_error(e.to_string()))?;
        if !response.is_success() {
            return Err(http_error(format!("HTTP {}", response.status)));
        }

        let cookies: Vec<Cookie> = response
            .header_values("set-cookie")
            .filter_map(Cookie::parse)
            .collect();
        let body = response
            .text_joined()
            .map_err(|e| http_error(e.to_string()))?;

        if !body.trim().eq_ignore_ascii_case(SUCCESS) {
            warn!(response = %body, "authentication rejected");
            return Err(BootError::AuthRejected { response: body });
        }
        if cookies.is_empty() {
            return Err(BootError::MissingCredentials);
        }

        debug!(cookies = cookies.len(), "session established");
        info!("Authenticated");
        Ok(AuthToken::from_cookies(cookies))
    }
}
