//! Protocol configuration.
//!
//! All durations are in milliseconds so the whole struct round-trips through
//! JSON unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::DEFAULT_PASSWORD_ITERATIONS;
use crate::error::Result;
use crate::time::DAY_MILLIS;

/// Default lifetime of an unrevealed custody entry (7 days)
pub const DEFAULT_KEY_TTL_MS: i64 = 7 * DAY_MILLIS;

/// Default interval of the background expiry sweep
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Default bound on a single ledger or content-store call
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Session store key under which the custody mirror lives
pub const DEFAULT_MIRROR_KEY: &str = "cognosis.keystore.v1";

/// Key custody settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustodyConfig {
    /// Lifetime applied when `store` is called without an explicit expiry
    pub key_ttl_ms: i64,
    /// Period of the background expiry sweep
    pub sweep_interval_ms: u64,
    /// Session store key for the obfuscated mirror
    pub mirror_key: String,
    /// PBKDF2 work factor for password backups
    pub backup_iterations: u32,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            key_ttl_ms: DEFAULT_KEY_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            mirror_key: DEFAULT_MIRROR_KEY.to_string(),
            backup_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }
}

impl CustodyConfig {
    /// Sweep interval as a [`Duration`]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Retry policy for idempotent content-store uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every failure
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Top-level configuration for the commit/reveal core
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolConfig {
    /// Key custodian settings
    pub custody: CustodyConfig,
    /// Bound on each ledger or content-store call
    pub request_timeout_ms: Option<u64>,
    /// Upload retry policy
    pub upload_retry: RetryPolicy,
}

impl ProtocolConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Per-call timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}
