//! # Cognosis Commit
//!
//! Commit/reveal integrity core for blind-protocol experiments. A
//! participant commits to an action before a ground-truth outcome exists and
//! later reveals it, so a third party can check that the outcome was fixed
//! before the participant's input.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       COMMIT/REVEAL MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                     Reveal Orchestrator                           │ │
//! │  │  create → commit → seal → store → register → ... → reveal → purge │ │
//! │  │  progressive: per-index reveal, finalize, reconcile               │ │
//! │  └──────┬───────────────┬────────────────┬──────────────────┬────────┘ │
//! │         │               │                │                  │          │
//! │  ┌──────▼──────┐ ┌──────▼───────┐ ┌──────▼──────┐ ┌─────────▼───────┐ │
//! │  │ Commitment  │ │     Key      │ │   Content   │ │     Ledger      │ │
//! │  │             │ │  Custodian   │ │    Store    │ │   (external)    │ │
//! │  │ - commit    │ │ - cache      │ │ - put/get   │ │ - register      │ │
//! │  │ - verify    │ │ - mirror     │ │ - retry     │ │ - verify/score  │ │
//! │  │             │ │ - expiry     │ │ - HTTP      │ │ - finalize      │ │
//! │  └──────┬──────┘ └──────┬───────┘ └─────────────┘ └─────────────────┘ │
//! │         │               │                                              │
//! │  ┌──────▼───────────────▼───────────────────────────────────────────┐ │
//! │  │                           Crypto                                 │ │
//! │  │   SHA-256 · AES-256-GCM · HKDF · PBKDF2 · RandomSource           │ │
//! │  └──────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Hashing, authenticated encryption, key derivation, randomness
//! - [`commitment`] - Commitment hash construction and verification
//! - [`envelope`] - The sealed blob uploaded for each commitment
//! - [`custody`] - Per-commitment key and nonce custody with expiry
//! - [`store`] - Content-addressed blob store clients
//! - [`ledger`] - The ledger contract and an in-process ledger
//! - [`reveal`] - Single-shot and progressive reveal orchestration
//! - [`config`] - Protocol configuration
//!
//! ## Trust Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            TRUST LAYERS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Binding: hash(hex(hash(payload ":" nonce)))                           │
//! │  ───────────────────────────────────────────                            │
//! │  The registered hash fixes the payload. A 256-bit nonce keeps small    │
//! │  payload spaces from being brute-forced before the reveal.             │
//! │                                                                         │
//! │  Confidentiality: AES-256-GCM envelope, AAD = commitment hash          │
//! │  ─────────────────────────────────────────────────────────              │
//! │  The store only ever sees ciphertext. Tampering or swapping blobs      │
//! │  between commitments fails authentication.                             │
//! │                                                                         │
//! │  Custody: session-scoped, not a security boundary                      │
//! │  ─────────────────────────────────────────────                          │
//! │  Keys and nonces live in memory plus an obfuscated session mirror.     │
//! │  They are destroyed on reveal or after seven days.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cognosis_commit::{
//!     KeyCustodian, MemoryContentStore, MemoryLedger, ProtocolConfig, RevealOrchestrator,
//! };
//!
//! # async fn run() -> cognosis_commit::Result<()> {
//! let config = ProtocolConfig::default();
//! let store = Arc::new(MemoryContentStore::new());
//! let ledger = Arc::new(MemoryLedger::new(store.clone()));
//! let custodian = Arc::new(KeyCustodian::in_memory(config.custody.clone()));
//! let orchestrator = RevealOrchestrator::new(ledger, store, custodian, config);
//!
//! let receipt = orchestrator
//!     .create_commitment("red", serde_json::json!({ "game": "colors" }))
//!     .await?;
//! let reveal = orchestrator
//!     .reveal_commitment::<String>(&receipt.commitment_id)
//!     .await?;
//! assert_eq!(reveal.payload, "red");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod commitment;
pub mod config;
pub mod crypto;
pub mod custody;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod reveal;
pub mod store;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use commitment::{commit, verify, CommitmentHash, Nonce};
pub use config::{CustodyConfig, ProtocolConfig, RetryPolicy};
pub use crypto::{EncryptionKey, OsRandom, RandomSource};
pub use custody::guard::{PendingRevealGuard, PendingWarning};
pub use custody::{CustodyRecord, KeyCustodian, MemorySessionStore, SessionStore};
pub use error::{Discrepancy, Error, Result};
pub use ids::{CommitmentId, ContentRef};
pub use ledger::{Ledger, MemoryLedger};
pub use reveal::{
    CommitmentReceipt, OutcomeSlot, ProgressiveOptions, ProgressiveOutcomeSet,
    ProgressiveSession, ProgressiveSummary, RevealOrchestrator, RevealStatus, VerifiedReveal,
};
pub use store::{ContentStore, HttpContentStore, MemoryContentStore};

/// Returns the version of the library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
