//! # Key Derivation Functions
//!
//! Two derivations live here, and neither touches commitment keys (those are
//! always fresh random keys, see [`EncryptionKey::generate`]).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KEY DERIVATION USES                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Password backup (opt-in)                                              │
//! │  ────────────────────────                                               │
//! │  PBKDF2-HMAC-SHA256(password, salt = 16 random bytes, iterations)      │
//! │      → 32-byte AES-256-GCM key for the exported custody envelope       │
//! │                                                                         │
//! │  Session mirror keystream                                              │
//! │  ────────────────────────                                               │
//! │  HKDF-SHA256(ikm = fixed label, info = "cognosis-mirror-keystream-v1") │
//! │      → fixed 64-byte XOR keystream                                     │
//! │                                                                         │
//! │  The keystream is a public constant. It defeats casual inspection of   │
//! │  the session store and nothing more.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`EncryptionKey::generate`]: super::EncryptionKey::generate

use hkdf::Hkdf;
use sha2::Sha256;

use super::encryption::{EncryptionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Input key material for the session mirror keystream
    pub const MIRROR_IKM: &[u8] = b"cognosis-session-mirror";

    /// Info string for the session mirror keystream
    pub const MIRROR_KEYSTREAM: &[u8] = b"cognosis-mirror-keystream-v1";
}

/// Length of the session mirror keystream in bytes
pub const MIRROR_KEYSTREAM_LEN: usize = 64;

/// Default PBKDF2 iteration count for password backups
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 210_000;

/// Size of the random salt used for password backups
pub const PASSWORD_SALT_SIZE: usize = 16;

/// The fixed XOR keystream used to obfuscate the custody mirror
pub fn mirror_keystream() -> Result<[u8; MIRROR_KEYSTREAM_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(None, domain::MIRROR_IKM);
    let mut keystream = [0u8; MIRROR_KEYSTREAM_LEN];
    hkdf.expand(domain::MIRROR_KEYSTREAM, &mut keystream)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive mirror keystream".into()))?;
    Ok(keystream)
}

/// Derive an AES-256-GCM key from a human-chosen password
///
/// Only used by the custody backup subsystem. A password is a much weaker
/// secret than a generated key; callers should treat a backup as exactly
/// as strong as the password protecting it.
pub fn derive_password_key(password: &str, salt: &[u8], iterations: u32) -> Result<EncryptionKey> {
    if password.is_empty() {
        return Err(Error::InvalidPassword("Password must not be empty".into()));
    }
    if iterations == 0 {
        return Err(Error::KeyDerivationFailed(
            "PBKDF2 iteration count must be positive".into(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    Ok(EncryptionKey::from_bytes(key))
}

// ============================================================================
// TESTS
// ============================================================================
