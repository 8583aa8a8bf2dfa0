//! Known-answer tests for the primitives used by pairing and messaging.
//!
//! - RFC 7748 (X25519)
//! - RFC 8439 (ChaCha20-Poly1305 AEAD)
//! - FIPS 180-2 (SHA-256)

use tether_crypto::aead::{AeadKey, Nonce};
use tether_crypto::agreement::{PrivateKey, PublicKey, agree, derive_symmetric_key};
use tether_crypto::hash::sha256;

fn decode_hex(text: &str) -> Vec<u8> {
    hex::decode(text).unwrap()
}

fn array32(text: &str) -> [u8; 32] {
    decode_hex(text).try_into().unwrap()
}

// ============================================================================
// RFC 7748 (X25519)
// ============================================================================

const ALICE_PRIVATE: &str = "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
const ALICE_PUBLIC: &str = "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a";
const BOB_PRIVATE: &str = "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb";
const BOB_PUBLIC: &str = "de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f";
const SHARED: &str = "4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742";

#[test]
fn test_x25519_rfc7748_public_keys() {
    let alice = PrivateKey::from_bytes(array32(ALICE_PRIVATE));
    let bob = PrivateKey::from_bytes(array32(BOB_PRIVATE));

    assert_eq!(alice.public_key().as_bytes(), &array32(ALICE_PUBLIC));
    assert_eq!(bob.public_key().as_bytes(), &array32(BOB_PUBLIC));
}

#[test]
fn test_x25519_rfc7748_shared_secret() {
    let alice = PrivateKey::from_bytes(array32(ALICE_PRIVATE));
    let bob_public = PublicKey::from_bytes(array32(BOB_PUBLIC));

    let shared = alice.diffie_hellman(&bob_public).unwrap();
    assert_eq!(shared.as_bytes(), &array32(SHARED));
}

#[test]
fn test_pairing_key_from_rfc7748_secret() {
    let alice = PrivateKey::from_bytes(array32(ALICE_PRIVATE));
    let bob = PrivateKey::from_bytes(array32(BOB_PRIVATE));

    let k_alice = agree(&alice, &bob.public_key()).unwrap();
    let k_bob = agree(&bob, &alice.public_key()).unwrap();

    assert_eq!(k_alice.as_bytes(), &sha256(&array32(SHARED)));
    assert!(k_alice.ct_eq(&k_bob));

    let shared = alice.diffie_hellman(&bob.public_key()).unwrap();
    assert!(derive_symmetric_key(&shared).ct_eq(&k_alice));
}

// ============================================================================
// RFC 8439 Section 2.8.2 (ChaCha20-Poly1305)
// ============================================================================

const SUNSCREEN: &[u8] = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";

#[test]
fn test_chacha20poly1305_rfc8439() {
    let key = AeadKey::new(array32(
        "808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f",
    ));
    let nonce = Nonce::from_slice(&decode_hex("070000004041424344454647")).unwrap();
    let aad = decode_hex("50515253c0c1c2c3c4c5c6c7");

    let sealed = key.encrypt(&nonce, SUNSCREEN, &aad).unwrap();

    assert_eq!(sealed.len(), SUNSCREEN.len() + 16);
    assert_eq!(
        hex::encode(&sealed[..16]),
        "d31a8d34648e60db7b86afbc53ef7ec2"
    );
    assert_eq!(
        hex::encode(&sealed[sealed.len() - 16..]),
        "1ae10b594f09e26a7e902ecbd0600691"
    );
    assert_eq!(key.decrypt(&nonce, &sealed, &aad).unwrap(), SUNSCREEN);
}

// ============================================================================
// SHA-256
// ============================================================================

#[test]
fn test_sha256_two_block_message() {
    assert_eq!(
        hex::encode(sha256(
            b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"
        )),
        "248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1"
    );
}
