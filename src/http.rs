use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const USER_AGENT: &str = "IntaveBootstrap";

const NO_CACHE_HEADERS: [(&str, &str); 2] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
];

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// A blocking GET with the bootstrapper's fixed headers already attached.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Request {
    /// GET `url` with User-Agent and no-cache headers.
    pub fn get(url: &str, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let mut headers = vec![("User-Agent".to_string(), USER_AGENT.to_string())];
        headers.extend(
            NO_CACHE_HEADERS
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        Self {
            url: url.to_string(),
            headers,
            connect_timeout,
            read_timeout,
        }
    }

    /// Append a header, keeping any with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct Response {
    pub status: u16,
    /// Header names are lowercase; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_values("content-length")
            .next()
            .and_then(|v| v.trim().parse().ok())
    }

    /// Read the whole body as text, joining lines without separators.
    pub fn text_joined(self) -> Result<String, TransportError> {
        let mut raw = String::new();
        let mut body = self.body;
        body.read_to_string(&mut raw)
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(raw.lines().map(str::trim).collect())
    }
}

pub trait Transport {
    fn get(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).get(request)
    }
}

/// `reqwest` blocking transport. A fresh client per request keeps the
/// per-endpoint timeouts independent.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn get(&self, request: &Request) -> Result<Response, TransportError> {
        debug!(url = %request.url, "GET");
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(request.connect_timeout)
            .timeout(request.read_timeout)
            .build()?;

        let mut builder = client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        debug!(url = %request.url, status, "response");

        Ok(Response {
            status,
            headers,
            body: Box::new(response),
        })
    }
}
