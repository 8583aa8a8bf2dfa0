//! X25519 key agreement for pairing (RFC 7748).
//!
//! Each pairing attempt uses a fresh ephemeral keypair. Both sides run
//! Diffie-Hellman against the other's public key and hash the result with
//! SHA-256 to obtain the long-lived per-pairing [`AeadKey`]:
//!
//! ```text
//! K = SHA-256(X25519(sk_local, pk_remote))
//! ```

use crate::CryptoError;
use crate::aead::AeadKey;
use crate::hash::sha256;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ephemeral X25519 private key.
#[derive(Clone, ZeroizeOnDrop, Zeroize)]
pub struct PrivateKey(x25519_dalek::StaticSecret);

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

/// Raw X25519 shared secret. Only ever consumed by [`derive_symmetric_key`].
#[derive(ZeroizeOnDrop, Zeroize)]
pub struct SharedSecret(x25519_dalek::SharedSecret);

impl PrivateKey {
    /// Generate a fresh ephemeral key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(x25519_dalek::StaticSecret::random_from_rng(rng))
    }

    /// Public half of this key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Diffie-Hellman with the peer's public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyAgreementFailed`] if the peer sent a
    /// low-order point (all-zero shared secret).
    pub fn diffie_hellman(&self, peer_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.0.diffie_hellman(&peer_public.0);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyAgreementFailed);
        }
        Ok(SharedSecret(shared))
    }

    /// Import from raw scalar bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::StaticSecret::from(bytes))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.public_key())
            .finish()
    }
}

impl PublicKey {
    /// Import from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Import from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] unless the slice is 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: crate::X25519_PUBLIC_KEY_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decode from the base64 form carried in pairing messages.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64 or a wrong length.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        Self::from_slice(&crate::decode_base64(text)?)
    }

    /// Base64 form for pairing messages.
    #[must_use]
    pub fn to_base64(&self) -> String {
        crate::encode_base64(self.0.as_bytes())
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl SharedSecret {
    /// Raw shared secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

/// Derive the per-pairing symmetric key: `SHA-256(shared_secret)`.
#[must_use]
pub fn derive_symmetric_key(shared: &SharedSecret) -> AeadKey {
    AeadKey::new(sha256(shared.as_bytes()))
}

/// Run Diffie-Hellman and derive the symmetric key in one step.
///
/// # Errors
///
/// Returns [`CryptoError::KeyAgreementFailed`] for a low-order peer key.
pub fn agree(local: &PrivateKey, remote: &PublicKey) -> Result<AeadKey, CryptoError> {
    let shared = local.diffie_hellman(remote)?;
    Ok(derive_symmetric_key(&shared))
}
