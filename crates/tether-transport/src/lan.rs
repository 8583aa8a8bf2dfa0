//! LAN address helpers.
//!
//! Peers are only ever contacted on LAN-scoped addresses, and discovery
//! traffic that originates from one of our own interfaces is ignored.

use crate::transport::{TransportError, TransportResult};
use local_ip_address::list_afinet_netifas;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// All addresses assigned to local interfaces, loopback included.
///
/// # Errors
///
/// Returns `TransportError::Interfaces` if the interface list cannot be read.
pub fn local_addresses() -> TransportResult<Vec<IpAddr>> {
    let interfaces = list_afinet_netifas().map_err(|e| TransportError::Interfaces(e.to_string()))?;
    let mut addrs: Vec<IpAddr> = interfaces.into_iter().map(|(_, ip)| ip).collect();
    addrs.sort();
    addrs.dedup();
    debug!(count = addrs.len(), "enumerated local addresses");
    Ok(addrs)
}

/// Whether `ip` belongs to this host.
#[must_use]
pub fn is_local_source(ip: IpAddr, local: &[IpAddr]) -> bool {
    ip.is_loopback() || local.contains(&ip)
}

/// Whether `ip` is an address a LAN peer could plausibly have: private,
/// link-local, loopback or (IPv6) unique-local.
#[must_use]
pub fn is_lan_scoped(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_lan_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_lan_v4(v4),
            None => is_lan_v6(v6),
        },
    }
}

fn is_lan_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local() || ip.is_loopback()
}

fn is_lan_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Choose the first private IPv4 interface address, used to pick the
/// multicast interface.
#[must_use]
pub fn primary_lan_ipv4(local: &[IpAddr]) -> Option<Ipv4Addr> {
    local.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if v4.is_private() => Some(*v4),
        _ => None,
    })
}
