//! In-process content-addressed store.
//!
//! References are the lowercase hex SHA-256 of the stored bytes, so storing
//! the same content twice yields the same reference and a single copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::ContentStore;
use crate::crypto::hash;
use crate::error::{Error, Result};
use crate::ids::ContentRef;

/// Content store backed by a `HashMap`
#[derive(Debug)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }
}

impl MemoryContentStore {
    /// Create an empty, available store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every call fails with
    /// `StorageUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `put` calls received, including failed ones
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `get` calls received, including failed ones
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of distinct blobs held
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether no blobs are held
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Overwrite the bytes behind a reference, keeping the reference
    ///
    /// Lets tests model a store that serves content other than what was
    /// uploaded.
    pub fn replace(&self, reference: &ContentRef, bytes: Vec<u8>) {
        self.blobs.write().insert(reference.as_str().to_string(), bytes);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable("Content store offline".into()))
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentRef> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let cid = hash(&bytes).to_hex();
        let mut blobs = self.blobs.write();
        if !blobs.contains_key(&cid) {
            tracing::debug!(cid = %cid, size = bytes.len(), "Stored blob");
            blobs.insert(cid.clone(), bytes);
        }
        Ok(ContentRef::new(cid))
    }

    async fn get(&self, reference: &ContentRef) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        self.blobs
            .read()
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryContentStore::new();
        let reference = store.put(b"sealed".to_vec()).await.unwrap();

        assert_eq!(reference.as_str().len(), 64);
        assert_eq!(store.get(&reference).await.unwrap(), b"sealed");
    }

    #[tokio::test]
    async fn test_identical_content_same_reference() {
        let store = MemoryContentStore::new();
        let a = store.put(vec![1, 2, 3]).await.unwrap();
        let b = store.put(vec![1, 2, 3]).await.unwrap();
        let c = store.put(vec![3, 2, 1]).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
        assert_eq!(store.put_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_reference_not_found() {
        let store = MemoryContentStore::new();
        let result = store.get(&ContentRef::new("missing")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_outage() {
        let store = MemoryContentStore::new();
        let reference = store.put(vec![9]).await.unwrap();

        store.set_available(false);
        assert!(matches!(store.put(vec![1]).await, Err(Error::StorageUnavailable(_))));
        assert!(matches!(store.get(&reference).await, Err(Error::StorageUnavailable(_))));

        store.set_available(true);
        assert_eq!(store.get(&reference).await.unwrap(), vec![9]);
        assert_eq!(store.get_count(), 2);
    }
}
