//! Discovery wire messages.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Body of a `DISCOVER` datagram.
///
/// Both fields absent means a generic broadcast. A directed query carries the
/// sender's id in clear and the target's id sealed under the pairing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    /// Sender device id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,
    /// Sealed target device id (base64 of nonce || ciphertext)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
}

impl DiscoveryRequest {
    /// A generic broadcast.
    #[must_use]
    pub fn broadcast() -> Self {
        Self::default()
    }

    /// Whether this is a directed query.
    #[must_use]
    pub fn is_directed(&self) -> bool {
        self.from_id.is_some() && self.to_id.is_some()
    }
}

/// What a device says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable device id
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Port of the device's HTTP service (RPC and file endpoint)
    pub port: u16,
    /// Device type, e.g. "phone" or "desktop"
    pub device_type: String,
    /// Application version
    pub version: String,
    /// Operating system / platform
    pub platform: String,
}

impl DeviceInfo {
    /// Info with default type, version and platform.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            port,
            device_type: "desktop".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: std::env::consts::OS.to_owned(),
        }
    }
}

/// Body of a `DISCOVER_REPLY` datagram.
pub type DiscoveryReply = DeviceInfo;

/// A device seen on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Device id
    pub id: String,
    /// Device name
    pub name: String,
    /// Source address of the reply
    pub ip: IpAddr,
    /// Socket the reply came from; pairing messages go here
    pub address: SocketAddr,
    /// Device type
    pub device_type: String,
    /// Application version
    pub version: String,
    /// Platform
    pub platform: String,
    /// HTTP service port
    pub port: u16,
    /// When the reply arrived (ms since Unix epoch)
    pub last_seen: i64,
}

impl DiscoveredDevice {
    /// Build from a reply received from `from` at `now_ms`.
    #[must_use]
    pub fn from_reply(reply: DiscoveryReply, from: SocketAddr, now_ms: i64) -> Self {
        Self {
            id: reply.id,
            name: reply.name,
            ip: from.ip(),
            address: from,
            device_type: reply.device_type,
            version: reply.version,
            platform: reply.platform,
            port: reply.port,
            last_seen: now_ms,
        }
    }
}
