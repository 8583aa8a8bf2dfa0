//! Fuzz target for cryptographic operations
//!
//! Tests that the AEAD encrypt/decrypt operations and the base64 sealing used
//! by directed discovery handle arbitrary input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_crypto::aead::{AeadKey, Nonce};

#[derive(Debug, Arbitrary)]
struct CryptoInput {
    key: [u8; 32],
    nonce: [u8; 12],
    plaintext: Vec<u8>,
    aad: Vec<u8>,
    sealed_text: String,
}

fuzz_target!(|input: CryptoInput| {
    let key = AeadKey::new(input.key);
    let nonce = Nonce::from_bytes(input.nonce);

    if let Ok(ciphertext) = key.encrypt(&nonce, &input.plaintext, &input.aad) {
        let opened = key.decrypt(&nonce, &ciphertext, &input.aad);
        assert_eq!(opened.ok().as_deref(), Some(input.plaintext.as_slice()));
    }

    // arbitrary ciphertext must be rejected, never panic
    let _ = key.decrypt(&nonce, &input.plaintext, &input.aad);
    let _ = key.open(&input.plaintext);
    let _ = key.open_from_base64(&input.sealed_text);
});
