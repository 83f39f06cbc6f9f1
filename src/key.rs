//! Key digests derived from reconciled bit strings

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::reconcile::BitVector;

/// Hex characters in a full SHA-256 digest
pub const MAX_DIGEST_LENGTH: usize = 64;

/// Short hex prefix of SHA-256 over the bit bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct KeyDigest(String);

impl KeyDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash one byte per bit and keep the first `digest_length` hex characters
/// (at most 64). An empty bit vector hashes the empty byte string.
pub fn derive_key(bits: &BitVector, digest_length: usize) -> KeyDigest {
    let digest = Sha256::digest(bits.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(digest_length.min(MAX_DIGEST_LENGTH));
    KeyDigest(hex)
}
