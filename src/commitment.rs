//! # Commitment Builder
//!
//! Binds a payload to a public value the committer cannot change after
//! disclosure.
//!
//! ## Construction
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      COMMITMENT HASH                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   payload ──┐                                                           │
//! │             ├──► payload + ":" + nonce                                  │
//! │   nonce ────┘            │                                              │
//! │                          ▼                                              │
//! │                   inner = SHA-256(...)                                  │
//! │                          │                                              │
//! │                          ▼  (lowercase hex, 64 chars)                   │
//! │                   outer = SHA-256(hex(inner))  ──► commitment hash      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The nonce makes equal payloads commit to different hashes, so small
//! payload spaces (a dice face, a card colour) cannot be brute-forced from
//! the published hash. Nonce freshness is the orchestrator's job; nothing
//! here detects reuse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{hash, random_array, Digest, RandomSource, DIGEST_SIZE};
use crate::error::{Error, Result};

/// Number of random bytes in a generated nonce (256 bits)
pub const NONCE_BYTES: usize = 32;

/// Separator between payload and nonce in the hash pre-image
const SEPARATOR: &str = ":";

/// Single-use random value mixed into a commitment hash
///
/// Generated nonces are 64 lowercase hex characters. Arbitrary strings are
/// accepted when verifying commitments made elsewhere.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from the given randomness source
    pub fn generate(source: &dyn RandomSource) -> Result<Self> {
        let bytes: [u8; NONCE_BYTES] = random_array(source)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Wrap an existing nonce string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The nonce as disclosed at reveal time
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce(<redacted>)")
    }
}

/// The double-hash digest binding `(payload, nonce)`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitmentHash(Digest);

impl CommitmentHash {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(Digest(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        self.0.as_bytes()
    }

    /// Lowercase hex rendering (64 chars)
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Constant-time comparison
    pub fn ct_eq(&self, other: &CommitmentHash) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentHash({})", self.to_hex())
    }
}

impl FromStr for CommitmentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidCommitmentHash(e.to_string()))?;
        let bytes: [u8; DIGEST_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidCommitmentHash(format!("expected {} hex chars", DIGEST_SIZE * 2))
        })?;
        Ok(Self::from_bytes(bytes))
    }
}

impl Serialize for CommitmentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CommitmentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the commitment hash for a serialized payload
pub fn commit(payload: &str, nonce: &Nonce) -> CommitmentHash {
    let mut preimage = String::with_capacity(payload.len() + SEPARATOR.len() + nonce.0.len());
    preimage.push_str(payload);
    preimage.push_str(SEPARATOR);
    preimage.push_str(nonce.as_str());

    let inner = hash(preimage.as_bytes());
    preimage.zeroize();

    CommitmentHash(hash(inner.to_hex().as_bytes()))
}

/// Recompute and compare against a published commitment hash
pub fn verify(commitment: &CommitmentHash, payload: &str, nonce: &Nonce) -> bool {
    commit(payload, nonce).ct_eq(commitment)
}

/// Canonical serialization of a payload before hashing
///
/// Payloads are committed as their compact `serde_json` rendering; the same
/// string is what gets disclosed at reveal.
pub fn canonical_payload<P: Serialize + ?Sized>(payload: &P) -> Result<String> {
    serde_json::to_string(payload).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Commit to a serializable payload
pub fn commit_value<P: Serialize + ?Sized>(payload: &P, nonce: &Nonce) -> Result<CommitmentHash> {
    Ok(commit(&canonical_payload(payload)?, nonce))
}

/// Verify a serializable payload against a commitment
pub fn verify_value<P: Serialize + ?Sized>(
    commitment: &CommitmentHash,
    payload: &P,
    nonce: &Nonce,
) -> Result<bool> {
    Ok(verify(commitment, &canonical_payload(payload)?, nonce))
}

// ============================================================================
// TESTS
// ============================================================================
