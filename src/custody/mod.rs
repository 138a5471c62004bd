//! # Key Custodian
//!
//! Keeps the `(encryption key, nonce)` pair of every unrevealed commitment
//! available to the same browsing session across page reloads, and expires
//! secrets that are never revealed.
//!
//! ## Storage Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY CUSTODY                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  In-memory cache (primary)                                      │   │
//! │  │  RwLock<HashMap<CommitmentId, KeyStoreEntry>>                   │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │ every write re-serializes all        │
//! │                                 ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Session mirror (SessionStore)                                  │   │
//! │  │  JSON → XOR keystream → base64 under one key                    │   │
//! │  │  Survives reload, dies with the tab                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entry Lifecycle
//!
//! ```text
//!   Absent ──store──► Stored ──retrieve──► Stored (any number of times)
//!                        │
//!                        ├──remove / clear──────► Removed   (terminal)
//!                        └──expiry (read/sweep)─► Expired   (terminal)
//! ```
//!
//! A lost entry makes its commitment permanently unrevealable by this
//! participant. The only way back is the opt-in password backup in
//! [`backup`].

pub mod backup;
pub mod guard;
pub mod obfuscation;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::commitment::Nonce;
use crate::config::CustodyConfig;
use crate::crypto::EncryptionKey;
use crate::error::{Error, Result};
use crate::ids::CommitmentId;
use crate::time::now_timestamp_millis;

pub use session::{MemorySessionStore, SessionStore};

#[cfg(target_arch = "wasm32")]
pub use session::WebSessionStore;

/// The secrets needed to reveal one commitment
#[derive(Clone)]
pub struct CustodyRecord {
    /// Key that seals the stored envelope
    pub key: EncryptionKey,
    /// Nonce bound into the commitment hash
    pub nonce: Nonce,
}

impl std::fmt::Debug for CustodyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustodyRecord(<redacted>)")
    }
}

/// One live custody entry
#[derive(Clone)]
pub struct KeyStoreEntry {
    /// Key that seals the stored envelope
    pub key: EncryptionKey,
    /// Nonce bound into the commitment hash
    pub nonce: Nonce,
    /// Unix millis at store time
    pub created_at: i64,
    /// Unix millis after which the entry is absent
    pub expires_at: i64,
}

impl KeyStoreEntry {
    fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    fn record(&self) -> CustodyRecord {
        CustodyRecord {
            key: self.key.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

/// On-mirror representation of an entry
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedEntry {
    pub(crate) key: String,
    pub(crate) nonce: Nonce,
    pub(crate) created_at: i64,
    pub(crate) expires_at: i64,
}

impl PersistedEntry {
    pub(crate) fn from_entry(entry: &KeyStoreEntry) -> Self {
        Self {
            key: entry.key.to_hex(),
            nonce: entry.nonce.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        }
    }

    pub(crate) fn into_entry(self) -> Result<KeyStoreEntry> {
        Ok(KeyStoreEntry {
            key: EncryptionKey::from_hex(&self.key)?,
            nonce: self.nonce.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

impl Drop for PersistedEntry {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.key.zeroize();
    }
}

/// Custodian of per-commitment secrets for one session context
///
/// Construct one per browsing session and share it behind an [`Arc`]. Each
/// [`CommitmentId`] is an independent key; no cross-entry locking exists.
pub struct KeyCustodian {
    entries: RwLock<HashMap<CommitmentId, KeyStoreEntry>>,
    mirror: Arc<dyn SessionStore>,
    config: CustodyConfig,
}

impl KeyCustodian {
    /// Build a custodian over a session store, restoring any mirrored entries
    ///
    /// Expired entries in the mirror are dropped. A mirror that cannot be
    /// read or decoded is logged and treated as empty; the next write
    /// replaces it.
    pub fn restore(mirror: Arc<dyn SessionStore>, config: CustodyConfig) -> Self {
        let entries = match Self::load_mirror(mirror.as_ref(), &config.mirror_key) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Discarding unreadable custody mirror: {}", e);
                HashMap::new()
            }
        };

        let now = now_timestamp_millis();
        let total = entries.len();
        let live: HashMap<_, _> = entries
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();

        if total > 0 {
            tracing::info!(
                restored = live.len(),
                expired = total - live.len(),
                "Restored custody entries from session mirror"
            );
        }

        Self {
            entries: RwLock::new(live),
            mirror,
            config,
        }
    }

    /// Custodian over a fresh private in-memory session store
    pub fn in_memory(config: CustodyConfig) -> Self {
        Self::restore(Arc::new(MemorySessionStore::new()), config)
    }

    /// Active configuration
    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    /// Store secrets with the default lifetime
    pub fn store(&self, id: &CommitmentId, key: &EncryptionKey, nonce: &Nonce) -> Result<()> {
        let now = now_timestamp_millis();
        self.insert(id, key, nonce, now, now.saturating_add(self.config.key_ttl_ms))
    }

    /// Store secrets with an explicit expiry (unix millis)
    pub fn store_with_expiry(
        &self,
        id: &CommitmentId,
        key: &EncryptionKey,
        nonce: &Nonce,
        expires_at: i64,
    ) -> Result<()> {
        self.insert(id, key, nonce, now_timestamp_millis(), expires_at)
    }

    fn insert(
        &self,
        id: &CommitmentId,
        key: &EncryptionKey,
        nonce: &Nonce,
        created_at: i64,
        expires_at: i64,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(
            id.clone(),
            KeyStoreEntry {
                key: key.clone(),
                nonce: nonce.clone(),
                created_at,
                expires_at,
            },
        );

        if let Err(e) = self.persist(&entries) {
            // Cache and mirror must agree
            match previous {
                Some(previous) => entries.insert(id.clone(), previous),
                None => entries.remove(id),
            };
            return Err(e);
        }

        if previous.is_some() {
            tracing::debug!(commitment_id = %id, "Replaced existing custody entry");
        }
        Ok(())
    }

    /// Keep secrets in memory without writing the mirror
    ///
    /// For a commitment that is already registered when the mirror write
    /// fails. The entry is lost on reload unless a later write succeeds,
    /// since every successful write mirrors the whole map.
    pub fn store_unmirrored(&self, id: &CommitmentId, key: &EncryptionKey, nonce: &Nonce) {
        let now = now_timestamp_millis();
        self.entries.write().insert(
            id.clone(),
            KeyStoreEntry {
                key: key.clone(),
                nonce: nonce.clone(),
                created_at: now,
                expires_at: now.saturating_add(self.config.key_ttl_ms),
            },
        );
        tracing::warn!(commitment_id = %id, "Custody entry held in memory only");
    }

    /// Fetch the secrets for a commitment
    ///
    /// Returns `None` if the entry was never stored, was removed, or has
    /// expired. An expired entry is removed as a side effect.
    pub fn retrieve(&self, id: &CommitmentId) -> Option<CustodyRecord> {
        let now = now_timestamp_millis();
        {
            let entries = self.entries.read();
            match entries.get(id) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.record()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        // Re-check under the write lock; a concurrent store may have refreshed it
        match entries.get(id) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.record()),
            Some(_) => {
                entries.remove(id);
            }
            None => return None,
        }

        tracing::debug!(commitment_id = %id, "Custody entry expired on read");
        if let Err(e) = self.persist(&entries) {
            tracing::warn!("Failed to persist custody mirror after expiry: {}", e);
        }
        None
    }

    /// Purge the secrets for a commitment
    ///
    /// Returns whether a live or expired entry existed.
    pub fn remove(&self, id: &CommitmentId) -> Result<bool> {
        let mut entries = self.entries.write();
        let previous = match entries.remove(id) {
            Some(previous) => previous,
            None => return Ok(false),
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(id.clone(), previous);
            return Err(e);
        }

        tracing::debug!(commitment_id = %id, "Removed custody entry");
        Ok(true)
    }

    /// Purge every entry and the mirror
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        self.mirror.remove_item(&self.config.mirror_key)?;
        entries.clear();
        Ok(())
    }

    /// Number of live (unexpired) entries
    pub fn pending_count(&self) -> usize {
        let now = now_timestamp_millis();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    /// Ids of live (unexpired) entries, sorted
    pub fn pending_ids(&self) -> Vec<CommitmentId> {
        let now = now_timestamp_millis();
        let mut ids: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Remove expired entries and re-persist; returns how many were pruned
    pub fn sweep_expired(&self) -> usize {
        let now = now_timestamp_millis();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let pruned = before - entries.len();

        if pruned > 0 {
            tracing::info!(pruned, "Swept expired custody entries");
            if let Err(e) = self.persist(&entries) {
                tracing::warn!("Failed to persist custody mirror after sweep: {}", e);
            }
        }
        pruned
    }

    /// Start the recurring expiry sweep on the current tokio runtime
    ///
    /// The task holds only a weak reference and ends once the custodian is
    /// dropped. Dropping the returned handle also stops it. The configured
    /// `sweep_interval` is the usual argument.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> SweeperHandle {
        let custodian = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match custodian.upgrade() {
                    Some(custodian) => {
                        custodian.sweep_expired();
                    }
                    None => break,
                }
            }
        });

        SweeperHandle { task }
    }

    // ========================================================================
    // MIRROR
    // ========================================================================

    pub(crate) fn snapshot(&self) -> Vec<(CommitmentId, KeyStoreEntry)> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub(crate) fn merge(&self, incoming: Vec<(CommitmentId, KeyStoreEntry)>) -> Result<usize> {
        let now = now_timestamp_millis();
        let mut entries = self.entries.write();
        let mut previous = Vec::new();
        for (id, entry) in incoming {
            if entry.is_expired_at(now) {
                continue;
            }
            let replaced = entries.insert(id.clone(), entry);
            previous.push((id, replaced));
        }

        if previous.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.persist(&entries) {
            // Undo newest first so repeated ids end at their original value
            for (id, replaced) in previous.into_iter().rev() {
                match replaced {
                    Some(entry) => entries.insert(id, entry),
                    None => entries.remove(&id),
                };
            }
            return Err(e);
        }
        Ok(previous.len())
    }

    fn persist(&self, entries: &HashMap<CommitmentId, KeyStoreEntry>) -> Result<()> {
        if entries.is_empty() {
            return self.mirror.remove_item(&self.config.mirror_key);
        }

        let persisted: HashMap<&str, PersistedEntry> = entries
            .iter()
            .map(|(id, entry)| (id.as_str(), PersistedEntry::from_entry(entry)))
            .collect();
        let json = Zeroizing::new(
            serde_json::to_vec(&persisted).map_err(|e| Error::SerializationError(e.to_string()))?,
        );
        let encoded = obfuscation::obfuscate(&json)?;

        self.mirror.set_item(&self.config.mirror_key, &encoded)
    }

    fn load_mirror(
        mirror: &dyn SessionStore,
        mirror_key: &str,
    ) -> Result<HashMap<CommitmentId, KeyStoreEntry>> {
        let encoded = match mirror.get_item(mirror_key)? {
            Some(encoded) => encoded,
            None => return Ok(HashMap::new()),
        };

        let json = Zeroizing::new(obfuscation::deobfuscate(&encoded)?);
        let persisted: HashMap<String, PersistedEntry> = serde_json::from_slice(&json)?;

        persisted
            .into_iter()
            .map(|(id, entry)| Ok((CommitmentId::new(id), entry.into_entry()?)))
            .collect()
    }
}

/// Handle to the background expiry sweep; aborts the task when dropped
#[cfg(not(target_arch = "wasm32"))]
pub struct SweeperHandle {
    task: tokio::task::JoinHandle<()>,
}

#[cfg(not(target_arch = "wasm32"))]
impl SweeperHandle {
    /// Stop the sweep now
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the sweep task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// TESTS
// ============================================================================
