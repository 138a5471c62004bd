//! HTTP client for a remote content-addressed store.
//!
//! ```text
//!   POST {base}/blobs          body: application/octet-stream
//!        ◄── 200 {"cid": "<reference>"}
//!   GET  {base}/blobs/{cid}
//!        ◄── 200 raw bytes | 404
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::ContentStore;
use crate::error::{Error, Result};
use crate::ids::ContentRef;

#[derive(Deserialize)]
struct PutResponse {
    cid: String,
}

/// Content store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: Client,
    base_url: String,
    base: Url,
}

impl HttpContentStore {
    /// Client for the store rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    /// Client with a per-request timeout
    ///
    /// Timeouts surface as `StorageUnavailable`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_timeout(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(client, base_url)
    }

    /// Use a preconfigured `reqwest::Client`
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Internal("Content store base URL is empty".into()));
        }
        let base = Url::parse(&base_url)
            .map_err(|e| Error::Internal(format!("Invalid content store URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Internal(format!(
                "Content store URL cannot carry a path: {}",
                base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    /// Root URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/blobs`, plus the percent-encoded reference when given
    fn blobs_url(&self, reference: Option<&ContentRef>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("blobs");
            if let Some(reference) = reference {
                segments.push(reference.as_str());
            }
        }
        url
    }

    fn status_error(status: StatusCode, context: &str) -> Error {
        if status == StatusCode::NOT_FOUND {
            Error::NotFound(context.to_string())
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Error::StorageUnavailable(format!("{} returned {}", context, status))
        } else {
            Error::Internal(format!("Content store rejected {}: {}", context, status))
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ContentStore for HttpContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentRef> {
        let size = bytes.len();
        let response = self
            .client
            .post(self.blobs_url(None))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Content upload rejected");
            return Err(Self::status_error(status, "upload"));
        }

        let body = response.bytes().await?;
        let parsed: PutResponse = serde_json::from_slice(&body)?;
        tracing::debug!(cid = %parsed.cid, size, "Uploaded blob");
        Ok(ContentRef::new(parsed.cid))
    }

    async fn get(&self, reference: &ContentRef) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.blobs_url(Some(reference)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, reference.as_str()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
