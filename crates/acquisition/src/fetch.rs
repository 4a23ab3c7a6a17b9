//! The download collaborator.
//!
//! Acquisition only needs "give me the bytes behind this URL or tell me
//! there are none"; the trait keeps schedulers testable with canned
//! responses. The HTTP implementation carries its own timeouts so a
//! stalled connection cannot wedge a scheduler past the next cycle.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{info, warn};

use crate::error::{AcquireError, Result};

/// Byte-fetching collaborator used by the acquisition schedulers.
///
/// `Ok(None)` means the server answered but had no content for us
/// (non-success status); transport failures are errors.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<Bytes>>;
}

/// HTTP implementation over a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent("radolan-ingest")
            .build()
            .map_err(|e| AcquireError::Network {
                url: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquireError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "download rejected");
            return Ok(None);
        }

        let bytes = response.bytes().await.map_err(|e| AcquireError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        info!(url = %url, bytes = bytes.len(), "download complete");
        Ok(Some(bytes))
    }
}
