//! `ChaCha20-Poly1305` AEAD encryption.
//!
//! Every paired device pair shares one 256-bit key. Messages encrypted under
//! that key use a fresh random 96-bit nonce which travels in front of the
//! ciphertext:
//!
//! ```text
//! sealed = nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! ## Usage
//!
//! ```
//! use tether_crypto::aead::AeadKey;
//! use rand_core::OsRng;
//!
//! let key = AeadKey::generate(&mut OsRng);
//! let sealed = key.seal(b"hello peer").unwrap();
//! assert_eq!(key.open(&sealed).unwrap(), b"hello peer");
//! ```

use crate::CryptoError;
use crate::random::fill_random;
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// ChaCha20-Poly1305 nonce size (12 bytes / 96 bits).
pub const NONCE_SIZE: usize = 12;

/// AEAD key size (32 bytes / 256 bits).
pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce (12 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Generate a random nonce from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; NONCE_SIZE];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::Nonce {
        chacha20poly1305::Nonce::from_slice(&self.0)
    }
}

/// AEAD encryption key (32 bytes).
///
/// This is the per-pairing symmetric key. It is zeroized on drop and never
/// printed by `Debug`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Only the peer store should ever see these bytes; they must never be
    /// put on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Constant-time key comparison.
    #[must_use]
    pub fn ct_eq(&self, other: &AeadKey) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Encrypt plaintext with an explicit nonce and associated data.
    ///
    /// Returns ciphertext with appended authentication tag (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new((&self.0).into());
        cipher
            .encrypt(
                nonce.as_generic(),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext (with trailing tag) using an explicit nonce.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on authentication failure.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let cipher = ChaCha20Poly1305::new((&self.0).into());
        cipher
            .decrypt(
                nonce.as_generic(),
                Payload {
                    msg: ciphertext_and_tag,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt under a fresh random nonce and prefix the nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSPRNG or the cipher fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::random()?;
        let ciphertext = self.encrypt(&nonce, plaintext, &[])?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(nonce.as_bytes());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a buffer produced by [`AeadKey::seal`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if the input is truncated,
    /// tampered with, or sealed under a different key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce).ok_or(CryptoError::DecryptionFailed)?;
        self.decrypt(&nonce, ciphertext, &[])
    }

    /// Seal a UTF-8 string and return base64 text, the form used inside JSON packets.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails.
    pub fn seal_to_base64(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(crate::encode_base64(&self.seal(plaintext.as_bytes())?))
    }

    /// Reverse of [`AeadKey::seal_to_base64`].
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64, failed authentication, or non-UTF-8 plaintext.
    pub fn open_from_base64(&self, text: &str) -> Result<String, CryptoError> {
        let sealed = crate::decode_base64(text)?;
        let plaintext = self.open(&sealed)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = AeadKey::generate(&mut OsRng);
        let sealed = key.seal(b"hello peer").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + 10 + TAG_SIZE);
        assert_eq!(key.open(&sealed).unwrap(), b"hello peer");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let key = AeadKey::generate(&mut OsRng);
        let a = key.seal(b"same").unwrap();
        let b = key.seal(b"same").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let key1 = AeadKey::generate(&mut OsRng);
        let key2 = AeadKey::generate(&mut OsRng);

        let sealed = key1.seal(b"secret").unwrap();
        assert_eq!(key2.open(&sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_open_tampered_fails() {
        let key = AeadKey::generate(&mut OsRng);
        let mut sealed = key.seal(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(key.open(&sealed).is_err());
    }

    #[test]
    fn test_open_truncated_fails() {
        let key = AeadKey::generate(&mut OsRng);
        assert!(key.open(&[]).is_err());
        assert!(key.open(&[0u8; NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_explicit_nonce_wrong_aad_fails() {
        let key = AeadKey::generate(&mut OsRng);
        let nonce = Nonce::random().unwrap();

        let ciphertext = key.encrypt(&nonce, b"secret", b"aad1").unwrap();
        assert!(key.decrypt(&nonce, &ciphertext, b"aad2").is_err());
        assert_eq!(key.decrypt(&nonce, &ciphertext, b"aad1").unwrap(), b"secret");
    }

    #[test]
    fn test_base64_roundtrip() {
        let key = AeadKey::generate(&mut OsRng);
        let text = key.seal_to_base64("device-42").unwrap();
        assert_eq!(key.open_from_base64(&text).unwrap(), "device-42");
        assert!(key.open_from_base64("not base64!").is_err());
    }

    #[test]
    fn test_key_from_slice_length() {
        assert!(AeadKey::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(
            AeadKey::from_slice(&[0u8; 31]).unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = AeadKey::new([0xAB; 32]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("171"));
        assert!(!debug.to_lowercase().contains("ab"));
    }

    #[test]
    fn test_nonce_from_slice() {
        let bytes = [0x42u8; NONCE_SIZE];
        assert_eq!(Nonce::from_slice(&bytes).unwrap().as_bytes(), &bytes);
        assert!(Nonce::from_slice(&[0u8; 24]).is_none());
    }
}
