//! Multicast channel for discovery traffic.
//!
//! The listener side binds the group port on all interfaces and joins the
//! group. Group addresses that are not multicast (a plain loopback address in
//! tests, for instance) are bound without joining, which keeps the same code
//! path usable on hosts without multicast routing.

use crate::SocketOptions;
use crate::transport::{Transport, TransportError, TransportResult, TransportStats};
use crate::udp_async::{AsyncUdpTransport, bind_socket};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::debug;

/// A socket bound to a discovery group.
#[derive(Clone)]
pub struct MulticastChannel {
    group: SocketAddrV4,
    inner: AsyncUdpTransport,
}

impl MulticastChannel {
    /// Bind the group port and join `group` on `interface`.
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` if the port cannot be bound, or `JoinFailed` if
    /// the group cannot be joined.
    pub fn join(group: SocketAddrV4, interface: Ipv4Addr) -> TransportResult<Self> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, group.port()));
        let socket = bind_socket(bind_addr, SocketOptions::default(), true)?;

        if group.ip().is_multicast() {
            let join_err = |e: std::io::Error| TransportError::JoinFailed {
                group: group.to_string(),
                reason: e.to_string(),
            };
            socket
                .join_multicast_v4(group.ip(), &interface)
                .map_err(join_err)?;
            socket.set_multicast_loop_v4(true).map_err(join_err)?;
            debug!(%group, %interface, "joined multicast group");
        } else {
            debug!(%group, "group is not multicast, bound without joining");
        }

        Ok(Self {
            group,
            inner: AsyncUdpTransport::from_socket2(socket, bind_addr)?,
        })
    }

    /// The group this channel listens on.
    #[must_use]
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    /// Send `payload` to the group through another transport, so that replies
    /// come back to that transport's address rather than to the group socket.
    ///
    /// # Errors
    ///
    /// Returns the sending transport's error.
    pub async fn send_via(&self, transport: &dyn Transport, payload: &[u8]) -> TransportResult<usize> {
        transport.send_to(payload, SocketAddr::V4(self.group)).await
    }
}

#[async_trait]
impl Transport for MulticastChannel {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        self.inner.send_to(buf, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.inner.local_addr()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }
}
