//! # Error Handling
//!
//! Error types for the commit/reveal core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Protocol Errors (100-199)                                         │
//! │  │   ├── NonceNotFound          - Local secret missing or expired      │
//! │  │   ├── CommitmentMismatch     - Recomputed hash != registered hash   │
//! │  │   ├── OutOfOrderReveal       - Progressive index out of sequence    │
//! │  │   ├── OutcomeDiscrepancy     - Ledger outcome != committed outcome  │
//! │  │   └── ReconciliationMismatch - Finalize views disagree              │
//! │  │                                                                      │
//! │  ├── Crypto Errors (300-399)                                           │
//! │  │   ├── EncryptionFailed / DecryptionFailed                           │
//! │  │   └── KeyDerivationFailed / InvalidKey / InvalidPassword            │
//! │  │                                                                      │
//! │  ├── Storage Errors (400-499)                                          │
//! │  │   ├── StorageUnavailable     - Transient, retry with backoff        │
//! │  │   ├── NotFound               - Permanent, never retry               │
//! │  │   └── SessionStoreError      - Custody mirror read/write failed     │
//! │  │                                                                      │
//! │  ├── Ledger Errors (500-599)                                           │
//! │  │   ├── LedgerUnavailable      - Transient, local secrets kept        │
//! │  │   └── LedgerRejected         - Ledger refused the request           │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No error in this crate is ever converted into a placeholder outcome. A
//! caller that degrades to a local result must go through
//! [`RevealStatus::Unverified`](crate::reveal::RevealStatus::Unverified).

use thiserror::Error;

/// Result type alias for commit/reveal operations
pub type Result<T> = std::result::Result<T, Error>;

/// One disagreement found while reconciling a progressive session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// Slot index, or `None` for an aggregate-level disagreement
    pub index: Option<usize>,
    /// Which field disagreed ("outcome", "choice", "matched", "count", ...)
    pub field: &'static str,
    /// Locally accumulated value
    pub local: String,
    /// Value reported by the ledger
    pub ledger: String,
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors (100-199)
    // ========================================================================

    /// No live key/nonce for this commitment in the custodian
    #[error("No local secret for commitment {0}; it was never stored, has expired, or was already revealed.")]
    NonceNotFound(String),

    /// Recomputed commitment hash does not match the registered one
    #[error("Commitment hash mismatch for {0}")]
    CommitmentMismatch(String),

    /// Progressive reveal attempted out of sequence
    #[error("Out-of-order reveal: expected index {expected}, got {requested}")]
    OutOfOrderReveal {
        /// Next index the session will accept
        expected: usize,
        /// Index the caller asked for
        requested: usize,
    },

    /// Progressive index beyond the committed outcome list
    #[error("Index {index} out of range for {len} committed outcomes")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of committed outcomes
        len: usize,
    },

    /// Finalize called before the minimum number of reveals
    #[error("At least {required} outcomes must be revealed before finalizing, only {revealed} were")]
    BelowMinimumReveals {
        /// Configured minimum
        required: usize,
        /// Revealed so far
        revealed: usize,
    },

    /// Ledger disclosed an outcome different from the committed one
    #[error("Ledger outcome at index {0} differs from the committed outcome")]
    OutcomeDiscrepancy(usize),

    /// Local and ledger views of a progressive session disagree
    #[error("Ledger and local view disagree in {} place(s)", .0.len())]
    ReconciliationMismatch(Vec<Discrepancy>),

    /// Malformed commitment hash
    #[error("Invalid commitment hash: {0}")]
    InvalidCommitmentHash(String),

    /// Progressive commitment over zero outcomes
    #[error("A progressive commitment needs at least one outcome")]
    EmptyOutcomeSet,

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, corrupted or tampered ciphertext)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Unusable backup password
    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Content store could not be reached or refused the upload
    #[error("Content store unavailable: {0}")]
    StorageUnavailable(String),

    /// Content reference does not exist in the store
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Session-scoped custody mirror failed
    #[error("Session store error: {0}")]
    SessionStoreError(String),

    // ========================================================================
    // Ledger Errors (500-599)
    // ========================================================================

    /// Network or service failure talking to the ledger
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Ledger refused the request
    #[error("Ledger rejected request: {0}")]
    LedgerRejected(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Numeric error code, grouped by category:
    /// - 100-199: Protocol
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Ledger
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Protocol (100-199)
            Error::NonceNotFound(_) => 100,
            Error::CommitmentMismatch(_) => 101,
            Error::OutOfOrderReveal { .. } => 102,
            Error::IndexOutOfRange { .. } => 103,
            Error::BelowMinimumReveals { .. } => 104,
            Error::OutcomeDiscrepancy(_) => 105,
            Error::ReconciliationMismatch(_) => 106,
            Error::InvalidCommitmentHash(_) => 107,
            Error::EmptyOutcomeSet => 108,

            // Crypto (300-399)
            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::KeyDerivationFailed(_) => 302,
            Error::InvalidKey(_) => 303,
            Error::InvalidPassword(_) => 304,
            Error::RngFailed => 305,

            // Storage (400-499)
            Error::StorageUnavailable(_) => 400,
            Error::NotFound(_) => 401,
            Error::SessionStoreError(_) => 402,

            // Ledger (500-599)
            Error::LedgerUnavailable(_) => 500,
            Error::LedgerRejected(_) => 501,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only transport failures qualify. Retrying one of these never loses
    /// local secrets, so a later retry of the same reveal stays possible
    /// until the custody entry expires.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::LedgerUnavailable(_)
        )
    }

    /// Check if this error signals a possible integrity violation
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::CommitmentMismatch(_)
                | Error::DecryptionFailed(_)
                | Error::OutcomeDiscrepancy(_)
                | Error::ReconciliationMismatch(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NonceNotFound("c1".into()).code(), 100);
        assert_eq!(Error::DecryptionFailed("test".into()).code(), 301);
        assert_eq!(Error::StorageUnavailable("test".into()).code(), 400);
        assert_eq!(Error::NotFound("test".into()).code(), 401);
        assert_eq!(Error::LedgerUnavailable("test".into()).code(), 500);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::StorageUnavailable("down".into()).is_recoverable());
        assert!(Error::LedgerUnavailable("down".into()).is_recoverable());
        assert!(!Error::NotFound("cid".into()).is_recoverable());
        assert!(!Error::NonceNotFound("c1".into()).is_recoverable());
        assert!(!Error::CommitmentMismatch("c1".into()).is_recoverable());
    }

    #[test]
    fn test_integrity_violations() {
        assert!(Error::CommitmentMismatch("c1".into()).is_integrity_violation());
        assert!(Error::DecryptionFailed("tag".into()).is_integrity_violation());
        assert!(!Error::LedgerUnavailable("down".into()).is_integrity_violation());
    }

    #[test]
    fn test_reconciliation_message_counts_discrepancies() {
        let err = Error::ReconciliationMismatch(vec![
            Discrepancy {
                index: Some(3),
                field: "outcome",
                local: "4".into(),
                ledger: "5".into(),
            },
            Discrepancy {
                index: None,
                field: "count",
                local: "10".into(),
                ledger: "9".into(),
            },
        ]);
        assert!(err.to_string().contains("2 place(s)"));
    }

    #[test]
    fn test_json_decode_error_maps_to_deserialization() {
        let err: Error = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.code(), 902);
    }
}
