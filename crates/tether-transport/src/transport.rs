//! Transport trait and errors.
//!
//! Discovery and pairing only ever need "send this datagram there" and
//! "give me the next datagram", so that is all the trait offers. Engines
//! hold an `Arc<dyn Transport>` and tests can swap in any implementation.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("transport is closed")]
    Closed,

    /// Address binding failed
    #[error("failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind
        addr: SocketAddr,
        /// Underlying failure
        reason: String,
    },

    /// Joining a multicast group failed
    #[error("failed to join multicast group {group}: {reason}")]
    JoinFailed {
        /// Group address
        group: String,
        /// Underlying failure
        reason: String,
    },

    /// Packet could not be decoded or encoded
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Interface enumeration failed
    #[error("interface lookup failed: {0}")]
    Interfaces(String),
}

impl TransportError {
    /// Whether this error concerns a single packet rather than the socket.
    ///
    /// Listeners drop such packets and keep running.
    #[must_use]
    pub fn is_packet_level(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Async datagram transport.
///
/// # Examples
///
/// ```no_run
/// use tether_transport::transport::Transport;
/// use tether_transport::udp_async::AsyncUdpTransport;
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>()?).await?;
/// transport.send_to(b"DISCOVER:{}", "127.0.0.1:52352".parse()?).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a datagram to `addr`, returning the number of bytes sent.
    ///
    /// # Errors
    /// Returns `TransportError` if the send operation fails
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize>;

    /// Receive the next datagram into `buf`.
    ///
    /// # Errors
    /// Returns `TransportError` if the receive operation fails
    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    /// Local address this transport is bound to.
    ///
    /// # Errors
    /// Returns `TransportError` if the address cannot be determined
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Mark the transport closed. Subsequent operations return
    /// [`TransportError::Closed`].
    fn close(&self);

    /// Check if the transport is closed.
    fn is_closed(&self) -> bool;

    /// Transport statistics.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total datagrams sent
    pub packets_sent: u64,
    /// Total datagrams received
    pub packets_received: u64,
    /// Send errors
    pub send_errors: u64,
    /// Receive errors
    pub recv_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_level_classification() {
        assert!(TransportError::Malformed("x".into()).is_packet_level());
        assert!(!TransportError::Closed.is_packet_level());
        assert!(!TransportError::Io(io::Error::other("boom")).is_packet_level());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::BindFailed {
            addr: "127.0.0.1:52353".parse().unwrap(),
            reason: "in use".into(),
        };
        assert_eq!(err.to_string(), "failed to bind to 127.0.0.1:52353: in use");
    }
}
