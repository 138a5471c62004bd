//! Password-protected export and import of custody entries.
//!
//! Separate from the session mirror: this is the only way to carry unrevealed
//! secrets past the end of a browsing session. The backup is a JSON envelope
//! whose `sealed` field is the AES-256-GCM encryption of the entry map under
//! a PBKDF2-HMAC-SHA256 key.
//!
//! ```text
//! {
//!   "version": 1,
//!   "kdf": "pbkdf2-hmac-sha256",
//!   "iterations": 210000,
//!   "salt": "<base64, 16 bytes>",
//!   "sealed": "<base64, iv || ciphertext || tag>"
//! }
//! ```

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{KeyCustodian, PersistedEntry};
use crate::crypto::kdf::{derive_password_key, PASSWORD_SALT_SIZE};
use crate::crypto::{decrypt, encrypt, random_array, OsRandom};
use crate::error::{Error, Result};
use crate::ids::CommitmentId;

const BACKUP_VERSION: u32 = 1;
const BACKUP_KDF: &str = "pbkdf2-hmac-sha256";
const BACKUP_AAD: &[u8] = b"cognosis-custody-backup-v1";

#[derive(Debug, Serialize, Deserialize)]
struct BackupEnvelope {
    version: u32,
    kdf: String,
    iterations: u32,
    salt: String,
    sealed: String,
}

impl KeyCustodian {
    /// Export every live entry sealed under `password`
    pub fn export_encrypted(&self, password: &str) -> Result<String> {
        let iterations = self.config.backup_iterations;
        let salt: [u8; PASSWORD_SALT_SIZE] = random_array(&OsRandom)?;
        let key = derive_password_key(password, &salt, iterations)?;

        let now = crate::time::now_timestamp_millis();
        let entries: HashMap<String, PersistedEntry> = self
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(id, entry)| (id.as_str().to_string(), PersistedEntry::from_entry(&entry)))
            .collect();

        let plaintext = Zeroizing::new(
            serde_json::to_vec(&entries).map_err(|e| Error::SerializationError(e.to_string()))?,
        );
        let sealed = encrypt(&key, &plaintext, BACKUP_AAD)?;

        let envelope = BackupEnvelope {
            version: BACKUP_VERSION,
            kdf: BACKUP_KDF.to_string(),
            iterations,
            salt: STANDARD.encode(salt),
            sealed: STANDARD.encode(sealed),
        };

        tracing::info!(entries = entries.len(), "Exported custody backup");
        serde_json::to_string(&envelope).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Import a backup produced by [`export_encrypted`](Self::export_encrypted)
    ///
    /// Expired entries are skipped; an entry whose id is already held is
    /// replaced. Returns the number of entries merged.
    pub fn import_encrypted(&self, blob: &str, password: &str) -> Result<usize> {
        let envelope: BackupEnvelope = serde_json::from_str(blob)?;

        if envelope.version != BACKUP_VERSION {
            return Err(Error::DeserializationError(format!(
                "Unsupported backup version {}",
                envelope.version
            )));
        }
        if envelope.kdf != BACKUP_KDF {
            return Err(Error::KeyDerivationFailed(format!(
                "Unsupported backup kdf {}",
                envelope.kdf
            )));
        }

        let salt = STANDARD
            .decode(&envelope.salt)
            .map_err(|e| Error::DeserializationError(format!("Invalid backup salt: {}", e)))?;
        let sealed = STANDARD
            .decode(&envelope.sealed)
            .map_err(|e| Error::DeserializationError(format!("Invalid backup body: {}", e)))?;

        let key = derive_password_key(password, &salt, envelope.iterations)?;
        let plaintext = Zeroizing::new(decrypt(&key, &sealed, BACKUP_AAD)?);

        let persisted: HashMap<String, PersistedEntry> = serde_json::from_slice(&plaintext)?;
        let incoming = persisted
            .into_iter()
            .map(|(id, entry)| Ok((CommitmentId::new(id), entry.into_entry()?)))
            .collect::<Result<Vec<_>>>()?;

        let merged = self.merge(incoming)?;
        tracing::info!(merged, "Imported custody backup");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::Nonce;
    use crate::config::CustodyConfig;
    use crate::crypto::EncryptionKey;
    use crate::custody::MemorySessionStore;
    use crate::time::now_timestamp_millis;
    use std::sync::Arc;

    fn fast_config() -> CustodyConfig {
        CustodyConfig {
            backup_iterations: 1_000,
            ..CustodyConfig::default()
        }
    }

    fn secrets() -> (EncryptionKey, Nonce) {
        (
            EncryptionKey::generate(&OsRandom).unwrap(),
            Nonce::generate(&OsRandom).unwrap(),
        )
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = KeyCustodian::in_memory(fast_config());
        let (key, nonce) = secrets();
        let id = CommitmentId::new("c-backup");
        source.store(&id, &key, &nonce).unwrap();

        let blob = source.export_encrypted("hunter2").unwrap();

        let target = KeyCustodian::in_memory(fast_config());
        assert_eq!(target.import_encrypted(&blob, "hunter2").unwrap(), 1);

        let record = target.retrieve(&id).unwrap();
        assert_eq!(record.key.as_bytes(), key.as_bytes());
        assert_eq!(record.nonce, nonce);
    }

    #[test]
    fn test_blob_hides_secrets() {
        let custodian = KeyCustodian::in_memory(fast_config());
        let (key, nonce) = secrets();
        custodian.store(&"c".into(), &key, &nonce).unwrap();

        let blob = custodian.export_encrypted("pw").unwrap();
        assert!(!blob.contains(&key.to_hex()));
        assert!(!blob.contains(nonce.as_str()));

        let envelope: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(envelope["version"], 1);
        assert_eq!(envelope["kdf"], BACKUP_KDF);
        assert_eq!(envelope["iterations"], 1_000);
    }

    #[test]
    fn test_wrong_password_fails() {
        let custodian = KeyCustodian::in_memory(fast_config());
        let (key, nonce) = secrets();
        custodian.store(&"c".into(), &key, &nonce).unwrap();
        let blob = custodian.export_encrypted("right").unwrap();

        let target = KeyCustodian::in_memory(fast_config());
        assert!(matches!(
            target.import_encrypted(&blob, "wrong"),
            Err(Error::DecryptionFailed(_))
        ));
        assert_eq!(target.pending_count(), 0);
    }

    #[test]
    fn test_empty_password_rejected() {
        let custodian = KeyCustodian::in_memory(fast_config());
        assert!(matches!(
            custodian.export_encrypted(""),
            Err(Error::InvalidPassword(_))
        ));
    }

    #[test]
    fn test_import_skips_expired() {
        let source = KeyCustodian::in_memory(fast_config());
        let (key, nonce) = secrets();
        let now = now_timestamp_millis();
        source.store(&"live".into(), &key, &nonce).unwrap();
        // Expires after export, before import
        source
            .store_with_expiry(&"brief".into(), &key, &nonce, now + 50)
            .unwrap();

        let blob = source.export_encrypted("pw").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(80));

        let target = KeyCustodian::in_memory(fast_config());
        assert_eq!(target.import_encrypted(&blob, "pw").unwrap(), 1);
        assert_eq!(target.pending_ids(), vec![CommitmentId::new("live")]);
    }

    #[test]
    fn test_import_replaces_same_id() {
        let source = KeyCustodian::in_memory(fast_config());
        let (k1, n1) = secrets();
        let id = CommitmentId::new("shared");
        source.store(&id, &k1, &n1).unwrap();
        let blob = source.export_encrypted("pw").unwrap();

        let target = KeyCustodian::in_memory(fast_config());
        let (k2, n2) = secrets();
        target.store(&id, &k2, &n2).unwrap();

        target.import_encrypted(&blob, "pw").unwrap();
        assert_eq!(target.pending_count(), 1);
        assert_eq!(target.retrieve(&id).unwrap().nonce, n1);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let custodian = KeyCustodian::in_memory(fast_config());
        let blob = r#"{"version":9,"kdf":"pbkdf2-hmac-sha256","iterations":1000,"salt":"","sealed":""}"#;
        assert!(matches!(
            custodian.import_encrypted(blob, "pw"),
            Err(Error::DeserializationError(_))
        ));
    }

    #[test]
    fn test_failed_import_changes_nothing() {
        let source = KeyCustodian::in_memory(fast_config());
        let (k1, n1) = secrets();
        source.store(&"shared".into(), &k1, &n1).unwrap();
        source.store(&"new".into(), &k1, &n1).unwrap();
        let blob = source.export_encrypted("pw").unwrap();

        let mirror = MemorySessionStore::new();
        let target = KeyCustodian::restore(Arc::new(mirror.clone()), fast_config());
        let (k2, n2) = secrets();
        target.store(&"shared".into(), &k2, &n2).unwrap();

        mirror.set_writable(false);
        assert!(matches!(
            target.import_encrypted(&blob, "pw"),
            Err(Error::SessionStoreError(_))
        ));
        assert_eq!(target.pending_ids(), vec![CommitmentId::new("shared")]);
        assert_eq!(target.retrieve(&"shared".into()).unwrap().nonce, n2);
    }
}
