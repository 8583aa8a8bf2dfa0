//! Directed-query sealing.
//!
//! `toId` is the target's id sealed under the pairing key and base64
//! encoded. A fresh nonce per query keeps two queries for the same peer
//! unlinkable.

use tether_crypto::CryptoError;
use tether_crypto::aead::AeadKey;

/// Seal `target_id` for a directed query.
///
/// # Errors
///
/// Returns an error if the CSPRNG or cipher fails.
pub fn seal_target(key: &AeadKey, target_id: &str) -> Result<String, CryptoError> {
    key.seal_to_base64(target_id)
}

/// Whether `sealed` opens under `key` to exactly `own_id`.
#[must_use]
pub fn addressed_to(key: &AeadKey, sealed: &str, own_id: &str) -> bool {
    key.open_from_base64(sealed)
        .is_ok_and(|target| target == own_id)
}
