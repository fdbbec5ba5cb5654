//! Remote GET capability shared by every background service.
//!
//! Services only ever see the [`Fetcher`] trait so tests can swap in canned
//! responses; [`HttpFetcher`] is the reqwest-backed production implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{AeronavError, FetchError};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the full response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AeronavError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%url, bytes = body.len(), "GET complete");
        Ok(body.to_vec())
    }
}

/// In-memory fetcher serving canned bodies by URL. Unknown URLs answer 404.
///
/// Every request is recorded so tests can assert on remote traffic.
#[derive(Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url` until replaced.
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.lock_responses().insert(url.into(), Ok(body.into()));
    }

    /// Make `url` fail with `err` until replaced.
    pub fn fail(&self, url: impl Into<String>, err: FetchError) {
        self.lock_responses().insert(url.into(), Err(err));
    }

    pub fn remove(&self, url: &str) {
        self.lock_responses().remove(url);
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Result<Vec<u8>, FetchError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        self.lock_responses()
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fetcher_serves_and_records() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.invalid/a", b"alpha".to_vec());

        assert_eq!(fetcher.get("https://example.invalid/a").await.unwrap(), b"alpha");
        let err = fetcher.get("https://example.invalid/b").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fetcher.request_count("https://example.invalid/a"), 1);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpFetcher::new(&HttpConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let fetcher = HttpFetcher::new(&HttpConfig {
            timeout_secs: 2,
            user_agent: "aeronav-test".to_string(),
        })
        .unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetcher.get("http://127.0.0.1:9/listing/").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_status_is_detected() {
        let err = FetchError::Status {
            url: "https://example.invalid/x".to_string(),
            status: 404,
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "https://example.invalid/x returned HTTP 404");
    }
}
