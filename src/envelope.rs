//! The encrypted blob uploaded to the content store for every commitment.
//!
//! The payload travels as its canonical JSON text, the exact string the
//! commitment hash was computed over, so verification never depends on
//! re-serializing a decoded value. The commitment hash hex is the AEAD
//! associated data: a blob only opens against the commitment it was sealed
//! for.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::commitment::{CommitmentHash, Nonce};
use crate::crypto::{decrypt, encrypt_with, EncryptionKey, OsRandom, RandomSource};
use crate::error::{Error, Result};

/// Plaintext of a sealed commitment blob
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedEnvelope {
    /// Canonical JSON of the committed payload
    pub payload: String,
    /// Nonce bound into the commitment hash
    pub nonce: Nonce,
    /// Caller metadata, stored alongside but not committed
    pub metadata: serde_json::Value,
    /// Unix millis at creation
    pub created_at: i64,
}

impl SealedEnvelope {
    /// Encrypt for the given commitment
    pub fn seal(&self, key: &EncryptionKey, commitment: &CommitmentHash) -> Result<Vec<u8>> {
        self.seal_with(&OsRandom, key, commitment)
    }

    /// [`seal`](Self::seal) with the IV drawn from `source`
    pub fn seal_with(
        &self,
        source: &dyn RandomSource,
        key: &EncryptionKey,
        commitment: &CommitmentHash,
    ) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(self).map_err(|e| Error::SerializationError(e.to_string()))?,
        );
        encrypt_with(source, key, &plaintext, commitment.to_hex().as_bytes())
    }

    /// Decrypt a blob sealed for `commitment`
    ///
    /// Fails with `DecryptionFailed` for the wrong key, a tampered blob, or a
    /// blob sealed for a different commitment.
    pub fn open(key: &EncryptionKey, sealed: &[u8], commitment: &CommitmentHash) -> Result<Self> {
        let plaintext = Zeroizing::new(decrypt(key, sealed, commitment.to_hex().as_bytes())?);
        serde_json::from_slice(&plaintext).map_err(|e| {
            Error::DecryptionFailed(format!("Envelope did not decode: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::commit;

    fn envelope() -> (SealedEnvelope, CommitmentHash) {
        let nonce = Nonce::generate(&OsRandom).unwrap();
        let payload = r#"{"choice":"red"}"#.to_string();
        let hash = commit(&payload, &nonce);
        (
            SealedEnvelope {
                payload,
                nonce,
                metadata: serde_json::json!({ "experiment": "colors" }),
                created_at: 1_700_000_000_000,
            },
            hash,
        )
    }

    #[test]
    fn test_seal_open() {
        let key = EncryptionKey::generate(&OsRandom).unwrap();
        let (original, hash) = envelope();

        let sealed = original.seal(&key, &hash).unwrap();
        let opened = SealedEnvelope::open(&key, &sealed, &hash).unwrap();

        assert_eq!(opened.payload, original.payload);
        assert_eq!(opened.nonce, original.nonce);
        assert_eq!(opened.metadata, original.metadata);
        assert_eq!(opened.created_at, original.created_at);
    }

    #[test]
    fn test_bound_to_commitment() {
        let key = EncryptionKey::generate(&OsRandom).unwrap();
        let (original, hash) = envelope();
        let (_, other_hash) = envelope();

        let sealed = original.seal(&key, &hash).unwrap();
        assert!(matches!(
            SealedEnvelope::open(&key, &sealed, &other_hash),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_blob_hides_payload() {
        let key = EncryptionKey::generate(&OsRandom).unwrap();
        let (original, hash) = envelope();
        let sealed = original.seal(&key, &hash).unwrap();

        let needle = b"red";
        assert!(!sealed.windows(needle.len()).any(|w| w == needle));
    }
}
