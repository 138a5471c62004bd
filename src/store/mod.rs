//! # Content-Addressed Store Client
//!
//! Upload and download of opaque encrypted blobs. The store never sees a
//! key; it only hands back a reference derived from the bytes it was given.
//!
//! ```text
//!   put(bytes) ──► ContentRef        get(&ContentRef) ──► bytes
//!      │                                  │
//!      ├─ transport failure ─► StorageUnavailable (retryable)
//!      └─ unknown reference ─► NotFound           (never retried)
//! ```

mod http;
mod memory;

pub use http::HttpContentStore;
pub use memory::MemoryContentStore;

use async_trait::async_trait;

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::ids::ContentRef;

/// Content-addressed blob store
///
/// Browser fetch futures are not `Send`, so on WASM the trait is declared
/// with `?Send` futures.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ContentStore: Send + Sync {
    /// Upload bytes and return their reference
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentRef>;

    /// Download the bytes behind a reference
    async fn get(&self, reference: &ContentRef) -> Result<Vec<u8>>;
}

/// Upload with bounded exponential backoff
///
/// Only [`Error::StorageUnavailable`] is retried. Uploads are idempotent
/// under content addressing, so a retry after an ambiguous failure cannot
/// produce a second distinct reference.
pub async fn put_with_retry(
    store: &dyn ContentStore,
    bytes: Vec<u8>,
    policy: RetryPolicy,
) -> Result<ContentRef> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match store.put(bytes.clone()).await {
            Ok(reference) => return Ok(reference),
            Err(Error::StorageUnavailable(reason)) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Content upload failed, retrying: {}",
                    reason
                );
                crate::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
