//! Session-scoped backing stores for the custody mirror.
//!
//! A session store survives a page reload but not the end of the browsing
//! session. Each tab has its own; nothing here is shared across tabs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// String key/value store with session lifetime
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value (no-op if absent)
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process session store
///
/// Clones share the same underlying map, so handing a clone to a fresh
/// custodian simulates a page reload with the session mirror intact.
/// Writes can be switched off to simulate a full or blocked storage area.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    items: Arc<RwLock<HashMap<String, String>>>,
    writable: Arc<AtomicBool>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            items: Arc::default(),
            writable: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write or delete fail (or succeed again)
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::SessionStoreError("Session storage is not writable".into()))
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.items.write().remove(key);
        Ok(())
    }
}

/// `window.sessionStorage` in the browser
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSessionStore;

#[cfg(target_arch = "wasm32")]
impl WebSessionStore {
    fn storage() -> Result<web_sys::Storage> {
        let window = web_sys::window()
            .ok_or_else(|| Error::SessionStoreError("No window object".into()))?;
        window
            .session_storage()
            .map_err(|e| Error::SessionStoreError(format!("sessionStorage denied: {:?}", e)))?
            .ok_or_else(|| Error::SessionStoreError("sessionStorage unavailable".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl SessionStore for WebSessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| Error::SessionStoreError(format!("getItem failed: {:?}", e)))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        // Quota errors surface here
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| Error::SessionStoreError(format!("setItem failed: {:?}", e)))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        Self::storage()?
            .remove_item(key)
            .map_err(|e| Error::SessionStoreError(format!("removeItem failed: {:?}", e)))
    }
}
