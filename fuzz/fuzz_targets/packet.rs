//! Fuzz target for datagram decoding
//!
//! Every UDP datagram goes through `Packet::decode` and then a typed body
//! parse. Neither may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use tether_core::pairing::{PairingCancel, PairingRequest, PairingResponse, SignedMessage};
use tether_discovery::{DiscoveryReply, DiscoveryRequest};
use tether_transport::{Packet, PacketType};

const TOLERANCE: Duration = Duration::from_secs(30);

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = Packet::decode(data) else {
        return;
    };

    match packet.kind {
        PacketType::Discover => {
            let _ = packet.parse::<DiscoveryRequest>();
        }
        PacketType::DiscoverReply => {
            let _ = packet.parse::<DiscoveryReply>();
        }
        PacketType::PairRequest => {
            if let Ok(request) = packet.parse::<PairingRequest>() {
                let _ = request.verify(request.timestamp, TOLERANCE);
            }
        }
        PacketType::PairResponse => {
            if let Ok(response) = packet.parse::<PairingResponse>() {
                let _ = response.verify(response.timestamp, TOLERANCE);
            }
        }
        PacketType::PairCancel => {
            let _ = packet.parse::<PairingCancel>();
        }
    }

    // re-encoding a decoded packet reproduces the input
    assert_eq!(packet.encode(), data);
});
