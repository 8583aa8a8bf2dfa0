//! # Tether Transport
//!
//! Network transport layer for Tether.
//!
//! This crate provides:
//! - An async UDP transport behind the [`Transport`](transport::Transport) trait
//! - A multicast channel for discovery traffic
//! - The `<TYPE>:<json>` packet codec shared by discovery and pairing
//! - LAN address helpers (local interface addresses, LAN-scope checks)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lan;
pub mod multicast;
pub mod packet;
pub mod transport;
pub mod udp_async;

pub use packet::{Packet, PacketType};
pub use transport::{Transport, TransportError, TransportResult};

/// Largest datagram any Tether packet may occupy.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Socket buffer sizes for UDP sockets.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// Receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// Send buffer size in bytes
    pub send_buffer_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
            send_buffer_size: 256 * 1024,
        }
    }
}
