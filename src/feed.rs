//! Alert snapshot retrieval and parsing.
//!
//! The public feed answers every poll with either an empty body (nothing
//! active) or one JSON object describing the current alert:
//! `{"id": "...", "cat": "1", "title": "...", "data": ["locality", ...], "desc": "..."}`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const DEFAULT_FEED_URL: &str = "https://www.oref.org.il/WarningMessages/alert/alerts.json";
pub const DEFAULT_DEBUG_FEED_URL: &str = "http://localhost/alerts.json";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.97 Safari/537.36";

/// One published notice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertEvent {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Display title ("category" of the notice).
    #[serde(default)]
    pub title: String,
    /// Raw locality names, in feed order.
    pub data: Vec<String>,
}

fn id_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(serde_json::Number),
    }
    Ok(match Id::deserialize(d)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// Transport-level failure: counts towards the retry backoff.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload-level failure: the cycle is skipped, retries are unaffected.
#[derive(Debug, Error)]
#[error("malformed alert payload: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// Parse one raw snapshot. `Ok(None)` means no alert is active.
pub fn parse_snapshot(raw: &str) -> Result<Option<AlertEvent>, ParseError> {
    let body = raw.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(body)?))
}

/// Something that can hand out the current raw snapshot.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Short human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// The public HTTP feed (or a local stand-in in debug mode).
pub struct HttpFeed {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://www.oref.org.il/"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl AlertSource for HttpFeed {
    async fn fetch(&self) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let bytes = resp.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Development source: the snapshot is whatever the file holds right now.
/// A missing file reads as "no alert".
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AlertSource for FileFeed {
    async fn fetch(&self) -> Result<String, FetchError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
