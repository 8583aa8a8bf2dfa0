//! # Tether Discovery
//!
//! LAN peer discovery for Tether.
//!
//! Devices find each other with two independently cancellable loops:
//!
//! - a **broadcaster** sending a `DISCOVER` datagram to the multicast group
//!   at a fixed interval, and
//! - a **listener** on the group answering requests with a unicast
//!   `DISCOVER_REPLY` when the device is discoverable.
//!
//! A paired device that is *not* discoverable can still be found by its
//! partner through a **directed query**: the sender puts its own id in clear
//! and the target's id sealed under the pairing key. Only the target can open
//! it and recognize itself; everybody else sees an opaque blob.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_discovery::{DiscoveryConfig, DiscoveryEngine, DeviceInfo, StaticDevice, NoPairedKeys};
//! use tether_transport::udp_async::AsyncUdpTransport;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(AsyncUdpTransport::bind("0.0.0.0:52353".parse::<std::net::SocketAddr>()?).await?);
//! let (found_tx, mut found_rx) = mpsc::unbounded_channel();
//! let device = Arc::new(StaticDevice::new(DeviceInfo::new("dev-1", "Desk", 8443), true));
//!
//! let engine = DiscoveryEngine::new(
//!     DiscoveryConfig::default(),
//!     device,
//!     Arc::new(NoPairedKeys),
//!     Arc::new(found_tx),
//!     transport,
//! );
//! engine.start_listener().await?;
//! engine.start_broadcast().await;
//! while let Some(device) = found_rx.recv().await {
//!     println!("found {} at {}", device.name, device.ip);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directed;
pub mod engine;
pub mod error;
pub mod messages;

pub use engine::{DiscoveryConfig, DiscoveryEngine};
pub use error::DiscoveryError;
pub use messages::{DeviceInfo, DiscoveredDevice, DiscoveryReply, DiscoveryRequest};

use std::sync::atomic::{AtomicBool, Ordering};
use tether_crypto::aead::AeadKey;
use tokio::sync::mpsc;

/// The local device as seen by discovery.
pub trait LocalDevice: Send + Sync {
    /// Identity advertised in replies.
    fn info(&self) -> DeviceInfo;

    /// Whether generic (undirected) requests should be answered.
    fn is_discoverable(&self) -> bool;
}

/// Lookup of pairing keys, used to open directed queries.
pub trait PeerKeyLookup: Send + Sync {
    /// Symmetric key shared with `peer_id`, if paired.
    fn shared_key(&self, peer_id: &str) -> Option<AeadKey>;
}

/// Receiver of "device found" notifications.
pub trait DiscoverySink: Send + Sync {
    /// Called once per received reply.
    fn device_found(&self, device: DiscoveredDevice);
}

impl DiscoverySink for mpsc::UnboundedSender<DiscoveredDevice> {
    fn device_found(&self, device: DiscoveredDevice) {
        // Receiver gone means nobody is interested anymore.
        let _ = self.send(device);
    }
}

/// A [`LocalDevice`] with fixed info and a toggleable discoverable flag.
#[derive(Debug)]
pub struct StaticDevice {
    info: DeviceInfo,
    discoverable: AtomicBool,
}

impl StaticDevice {
    /// Create a device.
    #[must_use]
    pub fn new(info: DeviceInfo, discoverable: bool) -> Self {
        Self {
            info,
            discoverable: AtomicBool::new(discoverable),
        }
    }

    /// Toggle discoverability.
    pub fn set_discoverable(&self, discoverable: bool) {
        self.discoverable.store(discoverable, Ordering::Relaxed);
    }
}

impl LocalDevice for StaticDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn is_discoverable(&self) -> bool {
        self.discoverable.load(Ordering::Relaxed)
    }
}

/// A [`PeerKeyLookup`] that knows no peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPairedKeys;

impl PeerKeyLookup for NoPairedKeys {
    fn shared_key(&self, _peer_id: &str) -> Option<AeadKey> {
        None
    }
}
