//! # Tether Core
//!
//! Pairing, trust and data exchange between companion devices on a LAN.
//!
//! This crate provides:
//! - The peer store holding paired devices and their keys
//! - The pairing handshake (X25519 + Ed25519 with replay tolerance)
//! - The secure peer RPC channel and chat delivery on top of it
//! - The transfer manager downloading files referenced in messages
//! - The [`Node`](node::Node) wiring all of it around one [`DeviceContext`]
//! - The peer HTTP endpoints (`/peer_graphql`, `/fs`) served over TLS with warp
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         Node                             │
//! │   (unicast socket, packet dispatch, device context)     │
//! ├──────────────┬──────────────┬──────────────┬────────────┤
//! │  Discovery   │   Pairing    │  Messaging   │ Transfers  │
//! ├──────────────┴──────────────┴──────────────┴────────────┤
//! │                      Peer Store                          │
//! ├─────────────────────────────────────────────────────────┤
//! │          Crypto          │          Transport            │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod files;
pub mod http;
pub mod identity;
pub mod messaging;
pub mod node;
pub mod pairing;
pub mod store;
pub mod transfer;

pub use config::NodeConfig;
pub use context::DeviceContext;
pub use error::{Result, TetherError};
pub use events::{Event, EventSink};
pub use identity::DeviceIdentity;
pub use node::{Node, NodeServices};
pub use store::{PairingState, PeerRecord, PeerStore};
