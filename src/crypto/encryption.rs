//! # Envelope Encryption
//!
//! AES-256-GCM sealing of commitment envelopes before they leave the
//! participant for the content-addressed store.
//!
//! ## Sealed Blob Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SEALED BLOB                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────┬───────────────────────────────┬──────────────────┐   │
//! │  │  IV (12 B)   │  Ciphertext (len(plaintext))  │  Tag (16 B)      │   │
//! │  └──────────────┴───────────────────────────────┴──────────────────┘   │
//! │                                                                         │
//! │  • IV: random per encryption, never reused with the same key           │
//! │  • AAD: commitment hash hex (not stored, supplied on both sides)       │
//! │  • Tag: authenticates IV-bound ciphertext + AAD                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Opening a blob with the wrong key, the wrong AAD, or after any bit flip
//! fails with [`Error::DecryptionFailed`]. The orchestrator relies on that to
//! detect a lost or mismatched key; a garbage plaintext is never returned.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::random::{random_array, OsRandom, RandomSource};
use crate::error::{Error, Result};

/// Size of the AES-GCM IV in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// An AES-256-GCM encryption key
///
/// Protects a payload at rest in the content store. Independent from the
/// commitment nonce, which only exists for hash binding.
///
/// Zeroized when dropped for security.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a fresh key from the given randomness source
    pub fn generate(source: &dyn RandomSource) -> Result<Self> {
        Ok(Self(random_array(source)?))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from lowercase or uppercase hex
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKey(format!("Expected {} bytes", KEY_SIZE)))?;
        Ok(Self(bytes))
    }

    /// Hex rendering (for the custody mirror and escrow only)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypt with AES-256-GCM, returning `iv || ciphertext_with_tag`
///
/// The IV comes from [`OsRandom`]; see [`encrypt_with`] to supply the source.
///
/// ## Parameters
///
/// - `key`: 256-bit encryption key
/// - `plaintext`: Bytes to seal (may be empty)
/// - `aad`: Additional authenticated data (not encrypted, but authenticated)
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    encrypt_with(&OsRandom, key, plaintext, aad)
}

/// [`encrypt`] with the IV drawn from `source`
pub fn encrypt_with(
    source: &dyn RandomSource,
    key: &EncryptionKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let iv: [u8; IV_SIZE] = random_array(source)?;

    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&iv), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(IV_SIZE + ciphertext.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a blob produced by [`encrypt`]
///
/// ## Errors
///
/// Returns `DecryptionFailed` if:
/// - The blob is shorter than IV + tag
/// - The ciphertext was tampered with
/// - The AAD doesn't match
/// - The key is wrong
pub fn decrypt(key: &EncryptionKey, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < IV_SIZE + TAG_SIZE {
        return Err(Error::DecryptionFailed(format!(
            "Sealed blob too short: {} bytes",
            sealed.len()
        )));
    }

    let (iv, ciphertext) = sealed.split_at(IV_SIZE);
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(AesNonce::from_slice(iv), payload)
        .map_err(|_| {
            Error::DecryptionFailed("Decryption failed: authentication tag mismatch".into())
        })
}

// ============================================================================
// TESTS
// ============================================================================
