//! Opaque identifiers handed out by the collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned by the ledger when a commitment is registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitmentId(String);

impl CommitmentId {
    /// Wrap a ledger-issued id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of an encrypted blob in the content-addressed store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    /// Wrap a store-issued reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Borrow the reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
