//! Playlist fetcher
//!
//! Single HTTP(S) GET per call with a bounded timeout and a cap on the body
//! size. No retries: the caller (the playlist cache) decides what to do with a
//! failure.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fetch failures. Causes are kept as strings so one result can be cloned to
/// every caller waiting on the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid playlist URL: {0}")]
    InvalidUrl(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("playlist exceeds {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: u64 },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Source of raw playlist text
#[async_trait]
pub trait PlaylistFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP fetcher settings
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_bytes: 50 * 1024 * 1024,
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
        }
    }
}

/// reqwest-backed playlist fetcher
#[derive(Clone)]
pub struct PlaylistFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

impl PlaylistFetcher {
    pub fn new(options: FetcherOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout: options.timeout,
            max_bytes: options.max_bytes,
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "Error".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
        }

        // Content-Length may be absent or wrong, so count while streaming
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit_bytes: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl PlaylistFetch for PlaylistFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch_bytes(url).await?;
        tracing::debug!(url = url, bytes = body.len(), "playlist downloaded");
        Ok(decode_body(body))
    }
}

/// Decode as UTF-8, falling back to Latin-1 for legacy playlists
pub fn decode_body(body: Vec<u8>) -> String {
    match String::from_utf8(body) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!("playlist is not valid UTF-8, decoding as Latin-1");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}
