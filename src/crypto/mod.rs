//! # Cryptography Module
//!
//! Hash and cipher primitives used by the commit/reveal core.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC PRIMITIVES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  hash(bytes)          SHA-256, one-way, deterministic                  │
//! │                                                                         │
//! │  encrypt / decrypt    AES-256-GCM                                      │
//! │                       • 256-bit key (fresh per commitment)             │
//! │                       • 96-bit IV (random per encryption)              │
//! │                       • 128-bit tag, wrong key = hard failure          │
//! │                                                                         │
//! │  RandomSource         OS CSPRNG by default, injectable                 │
//! │                                                                         │
//! │  kdf                  PBKDF2 (password backup), HKDF (mirror stream)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices & Rationale
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | SHA-256 | Commitment hash | Pre-image resistant, universally available |
//! | AES-256-GCM | Envelope sealing | AEAD, tamper and wrong-key detection |
//! | PBKDF2-HMAC-SHA256 | Password backup | Salted, tunable work factor |
//! | HKDF-SHA256 | Mirror keystream | Domain-separated constant derivation |

mod encryption;
mod hash;
pub mod kdf;
mod random;

pub use encryption::{decrypt, encrypt, encrypt_with, EncryptionKey, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub use hash::{hash, Digest, DIGEST_SIZE};
pub use random::{random_array, OsRandom, RandomSource};
