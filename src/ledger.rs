//! # Ledger
//!
//! The authoritative record of registered commitments, the verifier for
//! reveals, and the scoring authority for progressive sessions.
//!
//! ```text
//!   register_commitment ──► CommitmentId
//!   fetch_commitment    ──► CommitmentRecord
//!   submit_reveal       ──► RevealReceipt { verified, scoring }
//!   reveal_outcome_at   ──► OutcomeReveal { index, outcome, matched }
//!   finalize            ──► LedgerFinalization { items, total, matches }
//! ```
//!
//! Progressive commitments are registered with a [`RevealEscrow`]: the ledger
//! can only disclose an outcome at an index if it can open the committed
//! list itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::commitment::{verify, CommitmentHash, Nonce};
use crate::crypto::EncryptionKey;
use crate::envelope::SealedEnvelope;
use crate::error::{Error, Result};
use crate::ids::{CommitmentId, ContentRef};
use crate::store::ContentStore;
use crate::time::now_timestamp_millis;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Secrets handed to the ledger so it can answer per-index reveals
#[derive(Clone)]
pub struct RevealEscrow {
    /// Envelope key
    pub key: EncryptionKey,
    /// Commitment nonce
    pub nonce: Nonce,
}

impl std::fmt::Debug for RevealEscrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RevealEscrow(<redacted>)")
    }
}

/// Registration of a new commitment
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// Hash being committed to
    pub commitment_hash: CommitmentHash,
    /// Where the sealed envelope lives
    pub content_ref: ContentRef,
    /// Caller metadata
    pub metadata: serde_json::Value,
    /// Present for progressive commitments only
    pub escrow: Option<RevealEscrow>,
}

/// What the ledger holds for a commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRecord {
    /// Ledger-assigned id
    pub commitment_id: CommitmentId,
    /// Registered hash
    pub commitment_hash: CommitmentHash,
    /// Sealed envelope location
    pub content_ref: ContentRef,
    /// Caller metadata
    pub metadata: serde_json::Value,
    /// Unix millis at registration
    pub registered_at: i64,
}

/// Ledger response to a submitted reveal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealReceipt {
    /// Whether the ledger's own hash check passed
    pub verified: bool,
    /// Ledger-defined scoring result
    pub scoring: serde_json::Value,
}

/// One committed outcome disclosed by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReveal {
    /// Slot index
    pub index: usize,
    /// Outcome the ledger says was committed at this index
    pub outcome: serde_json::Value,
    /// Whether the participant's choice matched
    pub matched: bool,
}

/// One scored slot as the ledger recorded it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerItem {
    /// Slot index
    pub index: usize,
    /// Participant choice
    pub choice: serde_json::Value,
    /// Committed outcome
    pub outcome: serde_json::Value,
    /// Whether they matched
    pub matched: bool,
}

/// Ledger summary of a progressive session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFinalization {
    /// Recorded slots in index order
    pub items: Vec<LedgerItem>,
    /// Number of scored slots
    pub total: usize,
    /// Number of matched slots
    pub matches: usize,
}

/// Remote authority for commitments
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Ledger: Send + Sync {
    /// Register a commitment and assign its id
    async fn register_commitment(&self, request: RegisterRequest) -> Result<CommitmentId>;

    /// Fetch the registered record
    async fn fetch_commitment(&self, id: &CommitmentId) -> Result<CommitmentRecord>;

    /// Submit a payload and nonce for verification and scoring
    async fn submit_reveal(
        &self,
        id: &CommitmentId,
        payload: &str,
        nonce: &Nonce,
    ) -> Result<RevealReceipt>;

    /// Disclose the committed outcome at `index` and score `choice` against it
    async fn reveal_outcome_at(
        &self,
        id: &CommitmentId,
        index: usize,
        choice: &serde_json::Value,
    ) -> Result<OutcomeReveal>;

    /// Slots scored so far for a progressive commitment, in index order
    async fn scored_items(&self, id: &CommitmentId) -> Result<Vec<LedgerItem>>;

    /// Close a progressive session after `revealed` local reveals
    async fn finalize(&self, id: &CommitmentId, revealed: usize) -> Result<LedgerFinalization>;
}

// ============================================================================
// IN-PROCESS LEDGER
// ============================================================================

struct LedgerEntry {
    record: CommitmentRecord,
    outcomes: Option<Vec<serde_json::Value>>,
    items: Vec<LedgerItem>,
    revealed: bool,
}

/// In-process ledger
///
/// Verifies reveals by recomputing the commitment hash and scores
/// progressive sessions by outcome equality. Opens escrowed commitments
/// from its content store. Includes an availability switch, an artificial
/// latency, a call counter and an outcome override for exercising failure
/// paths.
pub struct MemoryLedger {
    store: Arc<dyn ContentStore>,
    entries: RwLock<HashMap<CommitmentId, LedgerEntry>>,
    available: AtomicBool,
    latency: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl MemoryLedger {
    /// Ledger that opens escrowed envelopes from `store`
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency: RwLock::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// While unavailable every call fails with `LedgerUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Total calls received, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of registered commitments
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Make the ledger disclose `outcome` at `index` from now on
    ///
    /// Models a misbehaving ledger.
    pub fn override_outcome(
        &self,
        id: &CommitmentId,
        index: usize,
        outcome: serde_json::Value,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        let slot = entries
            .get_mut(id)
            .and_then(|entry| entry.outcomes.as_mut())
            .and_then(|outcomes| outcomes.get_mut(index))
            .ok_or_else(|| Error::LedgerRejected(format!("No outcome {} for {}", index, id)))?;
        *slot = outcome;
        Ok(())
    }

    /// Corrupt a recorded item's choice, as a ledger with faulty storage would
    pub fn override_recorded_choice(
        &self,
        id: &CommitmentId,
        index: usize,
        choice: serde_json::Value,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        let item = entries
            .get_mut(id)
            .and_then(|entry| entry.items.get_mut(index))
            .ok_or_else(|| Error::LedgerRejected(format!("No item {} for {}", index, id)))?;
        item.choice = choice;
        Ok(())
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            crate::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::LedgerUnavailable("Ledger offline".into()))
        }
    }

    async fn open_escrow(
        &self,
        request: &RegisterRequest,
        escrow: &RevealEscrow,
    ) -> Result<Vec<serde_json::Value>> {
        let sealed = self.store.get(&request.content_ref).await?;
        let envelope = SealedEnvelope::open(&escrow.key, &sealed, &request.commitment_hash)
            .map_err(|_| Error::LedgerRejected("Escrow key does not open the envelope".into()))?;

        if envelope.nonce != escrow.nonce
            || !verify(&request.commitment_hash, &envelope.payload, &escrow.nonce)
        {
            return Err(Error::LedgerRejected(
                "Escrow does not match the commitment hash".into(),
            ));
        }

        serde_json::from_str(&envelope.payload).map_err(|_| {
            Error::LedgerRejected("Progressive commitment is not an outcome list".into())
        })
    }
}

fn unknown(id: &CommitmentId) -> Error {
    Error::LedgerRejected(format!("Unknown commitment {}", id))
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Ledger for MemoryLedger {
    async fn register_commitment(&self, request: RegisterRequest) -> Result<CommitmentId> {
        self.enter().await?;

        let outcomes = match &request.escrow {
            Some(escrow) => Some(self.open_escrow(&request, escrow).await?),
            None => None,
        };

        let id = CommitmentId::new(uuid::Uuid::new_v4().to_string());
        let record = CommitmentRecord {
            commitment_id: id.clone(),
            commitment_hash: request.commitment_hash,
            content_ref: request.content_ref,
            metadata: request.metadata,
            registered_at: now_timestamp_millis(),
        };

        tracing::debug!(commitment_id = %id, hash = %record.commitment_hash, "Registered commitment");
        self.entries.write().insert(
            id.clone(),
            LedgerEntry {
                record,
                outcomes,
                items: Vec::new(),
                revealed: false,
            },
        );
        Ok(id)
    }

    async fn fetch_commitment(&self, id: &CommitmentId) -> Result<CommitmentRecord> {
        self.enter().await?;
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| unknown(id))
    }

    async fn submit_reveal(
        &self,
        id: &CommitmentId,
        payload: &str,
        nonce: &Nonce,
    ) -> Result<RevealReceipt> {
        self.enter().await?;

        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| unknown(id))?;

        let verified = verify(&entry.record.commitment_hash, payload, nonce);
        if verified {
            entry.revealed = true;
        }

        let scoring = if verified {
            serde_json::json!({
                "status": "verified",
                "contentRef": entry.record.content_ref,
                "revealedAt": now_timestamp_millis(),
            })
        } else {
            serde_json::json!({ "status": "rejected" })
        };

        Ok(RevealReceipt { verified, scoring })
    }

    async fn reveal_outcome_at(
        &self,
        id: &CommitmentId,
        index: usize,
        choice: &serde_json::Value,
    ) -> Result<OutcomeReveal> {
        self.enter().await?;

        let mut entries = self.entries.write();
        let entry = entries.get_mut(id).ok_or_else(|| unknown(id))?;
        let outcomes = entry
            .outcomes
            .as_ref()
            .ok_or_else(|| Error::LedgerRejected(format!("{} is not progressive", id)))?;

        let outcome = outcomes.get(index).cloned().ok_or_else(|| {
            Error::LedgerRejected(format!("Index {} beyond {} outcomes", index, outcomes.len()))
        })?;

        // Repeat of an already scored slot (lost response): answer the same way
        if let Some(item) = entry.items.get(index) {
            if &item.choice == choice {
                return Ok(OutcomeReveal {
                    index,
                    outcome: item.outcome.clone(),
                    matched: item.matched,
                });
            }
            return Err(Error::LedgerRejected(format!(
                "Index {} already scored with a different choice",
                index
            )));
        }

        if index != entry.items.len() {
            return Err(Error::LedgerRejected(format!(
                "Expected index {}, got {}",
                entry.items.len(),
                index
            )));
        }

        let matched = &outcome == choice;
        entry.items.push(LedgerItem {
            index,
            choice: choice.clone(),
            outcome: outcome.clone(),
            matched,
        });

        Ok(OutcomeReveal {
            index,
            outcome,
            matched,
        })
    }

    async fn scored_items(&self, id: &CommitmentId) -> Result<Vec<LedgerItem>> {
        self.enter().await?;

        let entries = self.entries.read();
        let entry = entries.get(id).ok_or_else(|| unknown(id))?;
        if entry.outcomes.is_none() {
            return Err(Error::LedgerRejected(format!(
                "{} is not a progressive commitment",
                id
            )));
        }
        Ok(entry.items.clone())
    }

    async fn finalize(&self, id: &CommitmentId, revealed: usize) -> Result<LedgerFinalization> {
        self.enter().await?;

        let entries = self.entries.read();
        let entry = entries.get(id).ok_or_else(|| unknown(id))?;

        let items = entry.items.clone();
        let matches = items.iter().filter(|item| item.matched).count();
        tracing::debug!(
            commitment_id = %id,
            local_revealed = revealed,
            ledger_items = items.len(),
            "Finalized progressive commitment"
        );

        Ok(LedgerFinalization {
            total: items.len(),
            matches,
            items,
        })
    }
}
