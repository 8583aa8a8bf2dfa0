//! Fuzz target for RPC envelopes
//!
//! Opens arbitrary bodies under an arbitrary key, and checks that sealed
//! envelopes always open and verify.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use tether_core::messaging::envelope::{open_envelope, seal_envelope};
use tether_crypto::aead::AeadKey;
use tether_crypto::signatures::SigningKey;

#[derive(Debug, Arbitrary)]
struct EnvelopeInput {
    key: [u8; 32],
    signer: [u8; 32],
    timestamp: i64,
    payload: Vec<u8>,
    body: Vec<u8>,
}

fuzz_target!(|input: EnvelopeInput| {
    let key = AeadKey::new(input.key);
    let _ = open_envelope(&key, &input.body);

    let signer = SigningKey::from_bytes(&input.signer);
    if let Ok(sealed) = seal_envelope(&key, &signer, &input.payload, input.timestamp) {
        let envelope = open_envelope(&key, &sealed).expect("sealed envelope opens");
        assert_eq!(envelope.payload, input.payload);
        assert!(
            envelope
                .verify(&signer.verifying_key(), input.timestamp, Duration::ZERO)
                .is_valid()
        );
    }
});
