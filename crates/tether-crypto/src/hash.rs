//! SHA-256 hashing.

use sha2::{Digest, Sha256};

/// SHA-256 output (32 bytes).
pub type Digest256 = [u8; 32];

/// Compute the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> Digest256 {
    Sha256::digest(data).into()
}
