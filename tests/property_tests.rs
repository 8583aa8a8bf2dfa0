//! Property-based tests for Tether
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;
use std::time::Duration;

const TOLERANCE: Duration = Duration::from_secs(30);

// ============================================================================
// Packet Framing Properties
// ============================================================================

mod packet_properties {
    use super::*;
    use tether_transport::{Packet, PacketType};

    fn any_kind() -> impl Strategy<Value = PacketType> {
        prop::sample::select(PacketType::ALL.to_vec())
    }

    proptest! {
        /// Decoding never panics, whatever arrives on the socket
        #[test]
        fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = Packet::decode(&data);
        }

        /// The body keeps every byte after the first colon, colons included
        #[test]
        fn body_survives_framing(kind in any_kind(), body in "\\PC{0,200}") {
            let packet = Packet { kind, body: body.clone() };
            let decoded = Packet::decode(&packet.encode()).unwrap();
            prop_assert_eq!(decoded.kind, kind);
            prop_assert_eq!(decoded.body, body);
        }

        /// Unknown tags are rejected rather than guessed
        #[test]
        fn unknown_tags_rejected(tag in "[a-z_]{1,16}", body in "[a-z{}:]{0,20}") {
            let datagram = format!("{tag}:{body}");
            prop_assert!(Packet::decode(datagram.as_bytes()).is_err());
        }
    }
}

// ============================================================================
// Signed Message Properties
// ============================================================================

mod signature_properties {
    use super::*;
    use tether_core::pairing::{PairingRequest, PairingResponse, SignedMessage};
    use tether_core::{DeviceContext, DeviceIdentity};
    use tether_crypto::agreement::PrivateKey;

    fn ctx(name: &str, port: u16) -> DeviceContext {
        DeviceContext::new(DeviceIdentity::generate(), name, port).with_device_type("laptop")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A fresh request verifies; any change to a signed field breaks it
        #[test]
        fn request_signature_covers_fields(
            name in "[^|]{1,32}",
            other in "[^|]{1,32}",
            port in 1u16..,
            ts in 1_600_000_000_000i64..1_900_000_000_000,
        ) {
            let ecdh = PrivateKey::generate(&mut rand_core::OsRng).public_key();
            let request = PairingRequest::new(&ctx(&name, port), &ecdh, ts);
            prop_assert!(request.verify(ts, TOLERANCE).is_valid());

            let mut renamed = request.clone();
            renamed.from_name = other.clone();
            prop_assert_eq!(renamed.verify(ts, TOLERANCE).is_valid(), other == name);

            let mut moved = request.clone();
            moved.port = port.wrapping_add(1);
            prop_assert!(!moved.verify(ts, TOLERANCE).is_valid());
        }

        /// Freshness is symmetric around the receiver's clock
        #[test]
        fn request_freshness_window(skew_ms in 0i64..120_000, ahead in any::<bool>()) {
            let now = 1_700_000_000_000i64;
            let ts = if ahead { now + skew_ms } else { now - skew_ms };
            let ecdh = PrivateKey::generate(&mut rand_core::OsRng).public_key();
            let request = PairingRequest::new(&ctx("desk", 8443), &ecdh, ts);
            let fresh = skew_ms <= TOLERANCE.as_millis() as i64;
            prop_assert_eq!(request.verify(now, TOLERANCE).is_valid(), fresh);
        }

        /// Declines are signed too and cannot be flipped to accepts
        #[test]
        fn decline_cannot_be_flipped(to_id in "[a-f0-9-]{8,36}") {
            let ts = 1_700_000_000_000i64;
            let declined = PairingResponse::decline(&ctx("desk", 8443), &to_id, ts);
            prop_assert!(declined.verify(ts, TOLERANCE).is_valid());

            let mut flipped = declined;
            flipped.accepted = true;
            prop_assert!(!flipped.verify(ts, TOLERANCE).is_valid());
        }
    }
}

// ============================================================================
// Envelope Properties
// ============================================================================

mod envelope_properties {
    use super::*;
    use tether_core::messaging::envelope::{open_envelope, seal_envelope};
    use tether_crypto::aead::AeadKey;
    use tether_crypto::signatures::SigningKey;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Sealing then opening yields the payload and a valid signature
        #[test]
        fn sealed_payload_verifies(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
            let key = AeadKey::generate(&mut rand_core::OsRng);
            let signer = SigningKey::generate(&mut rand_core::OsRng);
            let ts = 1_700_000_000_000i64;

            let sealed = seal_envelope(&key, &signer, &payload, ts).unwrap();
            let envelope = open_envelope(&key, &sealed).unwrap();
            prop_assert_eq!(&envelope.payload, &payload);
            prop_assert_eq!(envelope.timestamp, ts);
            prop_assert!(envelope.verify(&signer.verifying_key(), ts, TOLERANCE).is_valid());

            let stranger = SigningKey::generate(&mut rand_core::OsRng);
            prop_assert!(!envelope.verify(&stranger.verifying_key(), ts, TOLERANCE).is_valid());
        }

        /// Any flipped ciphertext bit is caught by the AEAD tag
        #[test]
        fn tampered_envelope_rejected(
            payload in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = AeadKey::generate(&mut rand_core::OsRng);
            let signer = SigningKey::generate(&mut rand_core::OsRng);
            let mut sealed = seal_envelope(&key, &signer, &payload, 1).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= 1 << bit;
            prop_assert!(open_envelope(&key, &sealed).is_err());
        }

        /// Opening arbitrary bytes fails cleanly
        #[test]
        fn garbage_never_opens(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let key = AeadKey::generate(&mut rand_core::OsRng);
            prop_assert!(open_envelope(&key, &data).is_err());
        }
    }
}

// ============================================================================
// File Reference Properties
// ============================================================================

mod file_properties {
    use super::*;
    use tether_core::files::{DirFileStore, LocalFileStore, file_uri, parse_file_uri};

    proptest! {
        /// `fid:` references carry any non-empty id unchanged
        #[test]
        fn file_uri_roundtrip(id in "\\PC{1,64}") {
            let uri = file_uri(&id);
            prop_assert_eq!(parse_file_uri(&uri), Some(id.as_str()));
        }

        /// Plain paths are never mistaken for remote references
        #[test]
        fn paths_are_not_file_ids(path in "/[a-z/]{0,40}") {
            prop_assert_eq!(parse_file_uri(&path), None);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Peer-chosen names always land directly inside the download directory
        #[test]
        fn downloads_stay_in_directory(name in "\\PC{0,40}") {
            let dir = tempfile::tempdir().unwrap();
            let store = DirFileStore::new(dir.path().join("dl"));
            let path = store.allocate_download_path(&name).unwrap();
            prop_assert_eq!(path.parent(), Some(store.download_dir()));
            prop_assert!(path.is_file());
        }
    }
}

// ============================================================================
// LAN Scope Properties
// ============================================================================

mod lan_properties {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tether_transport::lan::is_lan_scoped;

    proptest! {
        /// RFC 1918 ranges are LAN
        #[test]
        fn private_ranges_are_lan(b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            prop_assert!(is_lan_scoped(IpAddr::V4(Ipv4Addr::new(10, b, c, d))));
            prop_assert!(is_lan_scoped(IpAddr::V4(Ipv4Addr::new(192, 168, c, d))));
            prop_assert!(is_lan_scoped(IpAddr::V4(Ipv4Addr::new(172, 16 + (b % 16), c, d))));
        }

        /// Public unicast addresses are not
        #[test]
        fn public_ranges_are_not_lan(a in 11u8..100, b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            prop_assert!(!is_lan_scoped(IpAddr::V4(Ipv4Addr::new(a, b, c, d))));
        }

        /// IPv4-mapped IPv6 is classified like its IPv4 form
        #[test]
        fn mapped_addresses_match_v4(raw in any::<u32>()) {
            let v4 = Ipv4Addr::from(raw);
            prop_assert_eq!(
                is_lan_scoped(IpAddr::V6(v4.to_ipv6_mapped())),
                is_lan_scoped(IpAddr::V4(v4))
            );
        }
    }
}
