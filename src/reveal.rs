//! # Reveal Orchestrator
//!
//! Drives the full commit/reveal lifecycle over injected collaborators.
//!
//! ## Single-Shot Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           CREATE                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  payload ──► canonical JSON ──┐                                        │
//! │  fresh nonce ─────────────────┼──► commit() ──► commitment hash        │
//! │                               │                       │                 │
//! │  fresh key ──► seal envelope (AAD = hash hex) ◄───────┘                 │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │            ContentStore::put ──► ContentRef                             │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │      Ledger::register_commitment ──► CommitmentId                       │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │       KeyCustodian::store(id, key, nonce)                               │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                           REVEAL                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  custodian.retrieve ── none ──► NonceNotFound (no I/O)                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  fetch record ──► get blob ──► open envelope ──► verify locally         │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │                              submit_reveal ──► purge custodian entry    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The custodian entry is purged only after the ledger confirms. A failed or
//! cancelled reveal leaves it in place, so the reveal can be retried.
//!
//! ## Progressive Flow
//!
//! One commitment covers an ordered list of outcomes. The ledger receives a
//! [`RevealEscrow`] at registration and discloses outcomes one index at a
//! time, strictly in order. Finalizing reconciles the local slots against the
//! ledger's record and fails loudly on any disagreement.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::commitment::{canonical_payload, commit, verify, CommitmentHash, Nonce};
use crate::config::ProtocolConfig;
use crate::crypto::{EncryptionKey, OsRandom, RandomSource};
use crate::custody::{CustodyRecord, KeyCustodian};
use crate::envelope::SealedEnvelope;
use crate::error::{Discrepancy, Error, Result};
use crate::ids::{CommitmentId, ContentRef};
use crate::ledger::{
    CommitmentRecord, Ledger, LedgerFinalization, RegisterRequest, RevealEscrow, RevealReceipt,
};
use crate::store::{put_with_retry, ContentStore};
use crate::time::now_timestamp_millis;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Returned by a successful create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentReceipt {
    /// Ledger-assigned id
    pub commitment_id: CommitmentId,
    /// Registered hash
    pub commitment_hash: CommitmentHash,
    /// Nonce bound into the hash
    pub nonce: Nonce,
    /// Sealed envelope location
    pub content_ref: ContentRef,
}

/// A reveal the ledger has confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedReveal<P> {
    /// Revealed commitment
    pub commitment_id: CommitmentId,
    /// Decoded payload
    pub payload: P,
    /// Metadata stored with the envelope
    pub metadata: serde_json::Value,
    /// Ledger receipt
    pub receipt: RevealReceipt,
}

/// Outcome of [`RevealOrchestrator::reveal_or_fallback`]
#[derive(Debug)]
pub enum RevealStatus<P> {
    /// Ledger verified the reveal
    Verified(VerifiedReveal<P>),
    /// Transport failed; `payload` is the caller's local fallback and
    /// carries no integrity guarantee
    Unverified {
        /// Caller-supplied fallback
        payload: P,
        /// Why verification could not happen
        cause: Error,
    },
}

impl<P> RevealStatus<P> {
    /// Whether the ledger confirmed this result
    pub fn is_verified(&self) -> bool {
        matches!(self, RevealStatus::Verified(_))
    }

    /// The payload, verified or not
    pub fn payload(&self) -> &P {
        match self {
            RevealStatus::Verified(reveal) => &reveal.payload,
            RevealStatus::Unverified { payload, .. } => payload,
        }
    }
}

// ============================================================================
// PROGRESSIVE TYPES
// ============================================================================

/// Settings for a progressive commitment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressiveOptions {
    /// Number of equally likely outcomes per slot, for chance statistics
    pub outcome_space: Option<u32>,
    /// Reveals required before finalize is allowed
    pub min_reveals: usize,
    /// Caller metadata registered with the commitment
    pub metadata: serde_json::Value,
}

impl Default for ProgressiveOptions {
    fn default() -> Self {
        Self {
            outcome_space: None,
            min_reveals: 1,
            metadata: serde_json::Value::Null,
        }
    }
}

/// One slot of a progressive outcome set
///
/// `outcome` and `matched` stay `None` until the slot is revealed.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeSlot<O> {
    /// Position in the committed list
    pub index: usize,
    /// Participant's choice, once made
    pub user_choice: Option<O>,
    /// Committed outcome, once revealed
    pub outcome: Option<O>,
    /// Whether this slot has been revealed; never reverts
    pub revealed: bool,
    /// Whether the choice matched, once revealed
    pub matched: Option<bool>,
}

/// Participant-facing view of a progressive commitment
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveOutcomeSet<O> {
    slots: Vec<OutcomeSlot<O>>,
}

impl<O> ProgressiveOutcomeSet<O> {
    fn hidden(len: usize) -> Self {
        Self {
            slots: (0..len)
                .map(|index| OutcomeSlot {
                    index,
                    user_choice: None,
                    outcome: None,
                    revealed: false,
                    matched: None,
                })
                .collect(),
        }
    }

    /// All slots in index order
    pub fn slots(&self) -> &[OutcomeSlot<O>] {
        &self.slots
    }

    /// Slot at `index`
    pub fn get(&self, index: usize) -> Option<&OutcomeSlot<O>> {
        self.slots.get(index)
    }

    /// Number of committed outcomes
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a session created by the orchestrator
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of revealed slots; reveals are sequential, so these are the
    /// first `revealed_count()` slots
    pub fn revealed_count(&self) -> usize {
        self.slots.iter().take_while(|slot| slot.revealed).count()
    }

    /// Number of revealed slots that matched
    pub fn match_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.matched == Some(true))
            .count()
    }
}

/// State of one progressive commitment
pub struct ProgressiveSession<O> {
    receipt: CommitmentReceipt,
    canonical: String,
    committed: Vec<O>,
    outcomes: ProgressiveOutcomeSet<O>,
    options: ProgressiveOptions,
}

impl<O> ProgressiveSession<O> {
    /// The underlying commitment
    pub fn receipt(&self) -> &CommitmentReceipt {
        &self.receipt
    }

    /// Shorthand for `receipt().commitment_id`
    pub fn commitment_id(&self) -> &CommitmentId {
        &self.receipt.commitment_id
    }

    /// Slots as the participant may see them
    pub fn outcomes(&self) -> &ProgressiveOutcomeSet<O> {
        &self.outcomes
    }

    /// Options the session was created with
    pub fn options(&self) -> &ProgressiveOptions {
        &self.options
    }

    /// Index the next reveal must ask for, or `None` when all are revealed
    pub fn next_index(&self) -> Option<usize> {
        let next = self.outcomes.revealed_count();
        (next < self.outcomes.len()).then_some(next)
    }
}

impl<O> std::fmt::Debug for ProgressiveSession<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Committed outcomes stay hidden
        f.debug_struct("ProgressiveSession")
            .field("commitment_id", &self.receipt.commitment_id)
            .field("len", &self.outcomes.len())
            .field("revealed", &self.outcomes.revealed_count())
            .finish()
    }
}

/// Aggregate of a finalized progressive session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressiveSummary {
    /// Slots revealed and scored
    pub total_influenced: usize,
    /// Matched slots
    pub matches: usize,
    /// `matches / total_influenced`
    pub accuracy: f64,
    /// Chance expectation, when the outcome space is known
    pub expected_matches: Option<f64>,
    /// `matches - expected_matches`
    pub deviation: Option<f64>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Commit/reveal orchestrator over injected collaborators
pub struct RevealOrchestrator {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ContentStore>,
    custodian: Arc<KeyCustodian>,
    random: Arc<dyn RandomSource>,
    config: ProtocolConfig,
}

impl RevealOrchestrator {
    /// Orchestrator drawing randomness from the OS
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn ContentStore>,
        custodian: Arc<KeyCustodian>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            custodian,
            random: Arc::new(OsRandom),
            config,
        }
    }

    /// Replace the randomness source
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// The custodian holding this orchestrator's secrets
    pub fn custodian(&self) -> &Arc<KeyCustodian> {
        &self.custodian
    }

    /// Active configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Single-shot
    // ------------------------------------------------------------------------

    /// Commit to `payload` and register it
    ///
    /// On success the key and nonce are in the custodian and the ledger holds
    /// the hash; the payload itself is only in the sealed envelope. If the
    /// session mirror cannot be written after registration, the secrets are
    /// held in memory only and the receipt is still returned.
    pub async fn create_commitment<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        metadata: serde_json::Value,
    ) -> Result<CommitmentReceipt> {
        let canonical = canonical_payload(payload)?;
        self.seal_and_register(canonical, metadata, false).await
    }

    /// Reveal a commitment created by this participant
    ///
    /// ## Errors
    ///
    /// - `NonceNotFound`: no live local secret; nothing else was attempted
    /// - `DecryptionFailed`: the stored blob does not open with the local key
    /// - `CommitmentMismatch`: local or ledger verification failed
    /// - `StorageUnavailable` / `LedgerUnavailable`: transport; retry later
    pub async fn reveal_commitment<P: DeserializeOwned>(
        &self,
        id: &CommitmentId,
    ) -> Result<VerifiedReveal<P>> {
        let secrets = self
            .custodian
            .retrieve(id)
            .ok_or_else(|| Error::NonceNotFound(id.to_string()))?;

        let (record, envelope) = self.open_registered(id, &secrets).await?;
        let payload: P = serde_json::from_str(&envelope.payload)?;

        let receipt = self
            .ledger_call(
                "submit_reveal",
                self.ledger.submit_reveal(id, &envelope.payload, &secrets.nonce),
            )
            .await?;
        if !receipt.verified {
            tracing::warn!(commitment_id = %id, "Ledger refused to verify reveal");
            return Err(Error::CommitmentMismatch(format!(
                "{}: ledger verification failed",
                id
            )));
        }

        self.purge(id);
        tracing::info!(commitment_id = %id, hash = %record.commitment_hash, "Commitment revealed");

        Ok(VerifiedReveal {
            commitment_id: id.clone(),
            payload,
            metadata: envelope.metadata.clone(),
            receipt,
        })
    }

    /// Reveal, degrading to `fallback` only on transport failure
    ///
    /// Integrity failures still return `Err`; they never produce an
    /// `Unverified` result.
    pub async fn reveal_or_fallback<P: DeserializeOwned>(
        &self,
        id: &CommitmentId,
        fallback: P,
    ) -> Result<RevealStatus<P>> {
        match self.reveal_commitment(id).await {
            Ok(reveal) => Ok(RevealStatus::Verified(reveal)),
            Err(cause) if cause.is_recoverable() => {
                tracing::warn!(commitment_id = %id, "Reveal unverified: {}", cause);
                Ok(RevealStatus::Unverified {
                    payload: fallback,
                    cause,
                })
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Progressive
    // ------------------------------------------------------------------------

    /// Commit to an ordered outcome list before any choice is made
    pub async fn create_progressive<O>(
        &self,
        outcomes: Vec<O>,
        options: ProgressiveOptions,
    ) -> Result<ProgressiveSession<O>>
    where
        O: Serialize + DeserializeOwned + Clone + PartialEq,
    {
        if outcomes.is_empty() {
            return Err(Error::EmptyOutcomeSet);
        }

        let canonical = canonical_payload(&outcomes)?;
        let receipt = self
            .seal_and_register(canonical.clone(), options.metadata.clone(), true)
            .await?;

        tracing::info!(
            commitment_id = %receipt.commitment_id,
            outcomes = outcomes.len(),
            "Progressive commitment created"
        );

        Ok(ProgressiveSession {
            receipt,
            canonical,
            outcomes: ProgressiveOutcomeSet::hidden(outcomes.len()),
            committed: outcomes,
            options,
        })
    }

    /// Rebuild a progressive session from custody and the ledger
    ///
    /// For a session whose in-memory state was lost, e.g. on a page reload.
    /// The committed list comes from the sealed envelope and is checked
    /// against the registered hash. Slots the ledger has already scored are
    /// restored as revealed; each must carry the committed outcome. The
    /// registered metadata replaces `options.metadata`.
    ///
    /// ## Errors
    ///
    /// - `NonceNotFound`: no live local secret; nothing else was attempted
    /// - `OutcomeDiscrepancy`: a scored slot disagrees with the committed list
    pub async fn resume_progressive<O>(
        &self,
        id: &CommitmentId,
        mut options: ProgressiveOptions,
    ) -> Result<ProgressiveSession<O>>
    where
        O: Serialize + DeserializeOwned + Clone + PartialEq,
    {
        let secrets = self
            .custodian
            .retrieve(id)
            .ok_or_else(|| Error::NonceNotFound(id.to_string()))?;

        let (record, envelope) = self.open_registered(id, &secrets).await?;
        let committed: Vec<O> = serde_json::from_str(&envelope.payload)?;
        if committed.is_empty() {
            return Err(Error::EmptyOutcomeSet);
        }

        let scored = self
            .ledger_call("scored_items", self.ledger.scored_items(id))
            .await?;

        let mut outcomes = ProgressiveOutcomeSet::hidden(committed.len());
        for (index, item) in scored.into_iter().enumerate() {
            let outcome = committed
                .get(index)
                .filter(|_| item.index == index)
                .ok_or(Error::OutcomeDiscrepancy(item.index))?;
            if serde_json::to_value(outcome)? != item.outcome {
                tracing::warn!(
                    commitment_id = %id,
                    index,
                    "Ledger recorded an outcome that was not committed"
                );
                return Err(Error::OutcomeDiscrepancy(index));
            }

            let slot = &mut outcomes.slots[index];
            slot.user_choice = Some(serde_json::from_value(item.choice)?);
            slot.outcome = Some(outcome.clone());
            slot.matched = Some(item.matched);
            slot.revealed = true;
        }

        tracing::info!(
            commitment_id = %id,
            outcomes = committed.len(),
            revealed = outcomes.revealed_count(),
            "Progressive commitment resumed"
        );

        options.metadata = record.metadata;
        Ok(ProgressiveSession {
            receipt: CommitmentReceipt {
                commitment_id: id.clone(),
                commitment_hash: record.commitment_hash,
                nonce: secrets.nonce,
                content_ref: record.content_ref,
            },
            canonical: envelope.payload.clone(),
            committed,
            outcomes,
            options,
        })
    }

    /// Make the choice for slot `index` and reveal its outcome
    ///
    /// Slots must be revealed in order. A rejected call leaves the session
    /// unchanged.
    pub async fn reveal_outcome_at<O>(
        &self,
        session: &mut ProgressiveSession<O>,
        index: usize,
        user_choice: O,
    ) -> Result<OutcomeSlot<O>>
    where
        O: Serialize + DeserializeOwned + Clone + PartialEq,
    {
        let len = session.committed.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let expected = session.outcomes.revealed_count();
        if index != expected {
            return Err(Error::OutOfOrderReveal {
                expected,
                requested: index,
            });
        }

        let choice = serde_json::to_value(&user_choice)?;
        let committed = serde_json::to_value(&session.committed[index])?;

        let disclosed = self
            .ledger_call(
                "reveal_outcome_at",
                self.ledger
                    .reveal_outcome_at(session.commitment_id(), index, &choice),
            )
            .await?;

        if disclosed.index != index || disclosed.outcome != committed {
            tracing::warn!(
                commitment_id = %session.commitment_id(),
                index,
                "Ledger disclosed an outcome that was not committed"
            );
            return Err(Error::OutcomeDiscrepancy(index));
        }

        let slot = &mut session.outcomes.slots[index];
        slot.user_choice = Some(user_choice);
        slot.outcome = Some(session.committed[index].clone());
        slot.matched = Some(disclosed.matched);
        slot.revealed = true;

        Ok(slot.clone())
    }

    /// Reconcile with the ledger and compute the aggregate
    ///
    /// Unrevealed slots never contribute. The ledger record is truncated to
    /// the first K locally revealed slots before comparison.
    pub async fn finalize_progressive<O>(
        &self,
        session: &ProgressiveSession<O>,
    ) -> Result<ProgressiveSummary>
    where
        O: Serialize + DeserializeOwned + Clone + PartialEq,
    {
        let id = session.commitment_id();
        let revealed = session.outcomes.revealed_count();
        if revealed < session.options.min_reveals {
            return Err(Error::BelowMinimumReveals {
                required: session.options.min_reveals,
                revealed,
            });
        }

        if !verify(
            &session.receipt.commitment_hash,
            &session.canonical,
            &session.receipt.nonce,
        ) {
            return Err(Error::CommitmentMismatch(id.to_string()));
        }

        let ledger = self
            .ledger_call("finalize", self.ledger.finalize(id, revealed))
            .await?;

        let discrepancies = reconcile(&session.outcomes, revealed, &ledger)?;
        if !discrepancies.is_empty() {
            tracing::warn!(
                commitment_id = %id,
                count = discrepancies.len(),
                "Progressive reconciliation failed"
            );
            return Err(Error::ReconciliationMismatch(discrepancies));
        }

        self.purge(id);

        let matches = session.outcomes.match_count();
        let accuracy = if revealed == 0 {
            0.0
        } else {
            matches as f64 / revealed as f64
        };
        let expected_matches = session
            .options
            .outcome_space
            .filter(|space| *space > 0)
            .map(|space| revealed as f64 / f64::from(space));

        tracing::info!(
            commitment_id = %id,
            revealed,
            matches,
            "Progressive commitment finalized"
        );

        Ok(ProgressiveSummary {
            total_influenced: revealed,
            matches,
            accuracy,
            expected_matches,
            deviation: expected_matches.map(|expected| matches as f64 - expected),
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn seal_and_register(
        &self,
        canonical: String,
        metadata: serde_json::Value,
        escrow: bool,
    ) -> Result<CommitmentReceipt> {
        let nonce = Nonce::generate(self.random.as_ref())?;
        let commitment_hash = commit(&canonical, &nonce);
        let key = EncryptionKey::generate(self.random.as_ref())?;

        let envelope = SealedEnvelope {
            payload: canonical,
            nonce: nonce.clone(),
            metadata: metadata.clone(),
            created_at: now_timestamp_millis(),
        };
        let sealed = envelope.seal_with(self.random.as_ref(), &key, &commitment_hash)?;

        let timed = TimedStore {
            inner: self.store.as_ref(),
            limit: self.config.request_timeout(),
        };
        let content_ref = put_with_retry(&timed, sealed, self.config.upload_retry).await?;

        let request = RegisterRequest {
            commitment_hash,
            content_ref: content_ref.clone(),
            metadata,
            escrow: escrow.then(|| RevealEscrow {
                key: key.clone(),
                nonce: nonce.clone(),
            }),
        };
        let commitment_id = self
            .ledger_call("register_commitment", self.ledger.register_commitment(request))
            .await?;

        // The ledger already holds the commitment; losing the id would orphan it
        if let Err(e) = self.custodian.store(&commitment_id, &key, &nonce) {
            tracing::warn!(
                commitment_id = %commitment_id,
                "Could not mirror custody entry: {}",
                e
            );
            self.custodian.store_unmirrored(&commitment_id, &key, &nonce);
        }

        tracing::info!(
            commitment_id = %commitment_id,
            hash = %commitment_hash,
            "Commitment created"
        );

        Ok(CommitmentReceipt {
            commitment_id,
            commitment_hash,
            nonce,
            content_ref,
        })
    }

    /// Fetch, open and locally verify the envelope of a registered commitment
    async fn open_registered(
        &self,
        id: &CommitmentId,
        secrets: &CustodyRecord,
    ) -> Result<(CommitmentRecord, SealedEnvelope)> {
        let record = self
            .ledger_call("fetch_commitment", self.ledger.fetch_commitment(id))
            .await?;
        let sealed = self
            .store_call("get", self.store.get(&record.content_ref))
            .await?;

        let envelope = SealedEnvelope::open(&secrets.key, &sealed, &record.commitment_hash)?;
        if envelope.nonce != secrets.nonce {
            return Err(Error::CommitmentMismatch(format!(
                "{}: stored nonce differs from the custodied nonce",
                id
            )));
        }
        if !verify(&record.commitment_hash, &envelope.payload, &secrets.nonce) {
            tracing::warn!(commitment_id = %id, "Local verification failed");
            return Err(Error::CommitmentMismatch(id.to_string()));
        }
        Ok((record, envelope))
    }

    fn purge(&self, id: &CommitmentId) {
        // The reveal already succeeded; a mirror write failure is not fatal
        if let Err(e) = self.custodian.remove(id) {
            tracing::warn!(commitment_id = %id, "Failed to persist custody purge: {}", e);
        }
    }

    async fn ledger_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.request_timeout();
        crate::time::timeout(limit, call).await.unwrap_or_else(|| {
            Err(Error::LedgerUnavailable(format!(
                "{} timed out after {:?}",
                operation, limit
            )))
        })
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timed_store_call(self.config.request_timeout(), operation, call).await
    }
}

async fn timed_store_call<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    crate::time::timeout(limit, call).await.unwrap_or_else(|| {
        Err(Error::StorageUnavailable(format!(
            "{} timed out after {:?}",
            operation, limit
        )))
    })
}

/// Bounds every call of the wrapped store
struct TimedStore<'a> {
    inner: &'a dyn ContentStore,
    limit: Duration,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ContentStore for TimedStore<'_> {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentRef> {
        timed_store_call(self.limit, "put", self.inner.put(bytes)).await
    }

    async fn get(&self, reference: &ContentRef) -> Result<Vec<u8>> {
        timed_store_call(self.limit, "get", self.inner.get(reference)).await
    }
}

fn reconcile<O: Serialize>(
    local: &ProgressiveOutcomeSet<O>,
    revealed: usize,
    ledger: &LedgerFinalization,
) -> Result<Vec<Discrepancy>> {
    let mut found = Vec::new();

    let reported_matches = ledger.items.iter().filter(|item| item.matched).count();
    if ledger.total != ledger.items.len() || ledger.matches != reported_matches {
        found.push(Discrepancy {
            index: None,
            field: "totals",
            local: format!("{} items, {} matched", ledger.items.len(), reported_matches),
            ledger: format!("{} items, {} matched", ledger.total, ledger.matches),
        });
    }

    let considered = &ledger.items[..ledger.items.len().min(revealed)];
    if considered.len() < revealed {
        found.push(Discrepancy {
            index: None,
            field: "count",
            local: revealed.to_string(),
            ledger: considered.len().to_string(),
        });
    }

    for (slot, item) in local.slots.iter().zip(considered) {
        let mut differ = |field: &'static str, local: String, ledger: String| {
            if local != ledger {
                found.push(Discrepancy {
                    index: Some(slot.index),
                    field,
                    local,
                    ledger,
                });
            }
        };

        differ("index", slot.index.to_string(), item.index.to_string());
        differ(
            "choice",
            serde_json::to_value(&slot.user_choice)?.to_string(),
            item.choice.to_string(),
        );
        differ(
            "outcome",
            serde_json::to_value(&slot.outcome)?.to_string(),
            item.outcome.to_string(),
        );
        differ(
            "matched",
            slot.matched.unwrap_or(false).to_string(),
            item.matched.to_string(),
        );
    }

    Ok(found)
}

// ============================================================================
// TESTS
// ============================================================================
