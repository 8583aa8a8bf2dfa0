//! In-flight pairing handshakes.

use std::net::SocketAddr;
use std::time::Instant;
use tether_crypto::agreement::PrivateKey;

/// Which side of the handshake we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We sent the request
    Initiator,
    /// We received the request
    Responder,
}

/// One handshake in progress. Never persisted.
#[derive(Debug)]
pub struct PairingSession {
    /// Remote device id
    pub device_id: String,
    /// Remote device name
    pub device_name: String,
    /// Remote unicast address
    pub address: SocketAddr,
    /// Our ephemeral X25519 key for this handshake
    pub private_key: PrivateKey,
    /// Side of the handshake
    pub role: Role,
    /// When the session was created
    pub created_at: Instant,
    /// Distinguishes this session from a later one for the same device
    pub(crate) serial: u64,
}

impl PairingSession {
    pub(crate) fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        address: SocketAddr,
        private_key: PrivateKey,
        role: Role,
        serial: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            address,
            private_key,
            role,
            created_at: Instant::now(),
            serial,
        }
    }

    /// Time since the session was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Read-only view of a session for callers outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Remote device id
    pub device_id: String,
    /// Remote device name
    pub device_name: String,
    /// Remote unicast address
    pub address: SocketAddr,
    /// Side of the handshake
    pub role: Role,
}

impl From<&PairingSession> for SessionInfo {
    fn from(session: &PairingSession) -> Self {
        Self {
            device_id: session.device_id.clone(),
            device_name: session.device_name.clone(),
            address: session.address,
            role: session.role,
        }
    }
}
