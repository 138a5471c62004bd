//! Randomness capability.
//!
//! The core never produces entropy itself; it asks a [`RandomSource`] for
//! bytes. Production code uses [`OsRandom`], tests may inject a
//! deterministic source.

use rand::RngCore;

use crate::error::{Error, Result};

/// Supplier of cryptographically secure random bytes
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely with random bytes
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG (`getrandom` under the hood)
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        rand::rngs::OsRng
            .try_fill_bytes(dest)
            .map_err(|_| Error::RngFailed)
    }
}

/// Draw `N` random bytes from a source
pub fn random_array<const N: usize>(source: &dyn RandomSource) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    source.fill_bytes(&mut bytes)?;
    Ok(bytes)
}
