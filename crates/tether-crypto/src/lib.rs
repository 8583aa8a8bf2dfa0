//! # Tether Crypto
//!
//! Cryptographic primitives for Tether device pairing and peer messaging.
//!
//! This crate provides:
//! - `ChaCha20-Poly1305` AEAD with a random 96-bit nonce prefixed to the ciphertext
//! - X25519 key agreement and the SHA-256 pairing key derivation
//! - Ed25519 signatures for message authenticity
//! - A single signed-message verifier with timestamp tolerance (anti-replay)
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Agreement | X25519 | 128-bit |
//! | Key Derivation | SHA-256(shared secret) | 128-bit |
//! | AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Signatures | Ed25519 | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod agreement;
pub mod error;
pub mod hash;
pub mod random;
pub mod signatures;
pub mod verify;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 key size
pub const AEAD_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size
pub const AEAD_NONCE_SIZE: usize = 12;

/// SHA-256 output size
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 secret key size
pub const ED25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Encode bytes as standard base64, the encoding used for keys on the wire.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidEncoding`] if the input is not valid base64.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CryptoError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}
