//! Advertised address selection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Heuristic to decide whether a local address is worth advertising to a
/// remote peer.
///
/// Drops unspecified, loopback, link-local and container bridge gateway
/// (`172.16-31.0.1`) addresses.
#[must_use]
pub fn is_useful_address(ip: &IpAddr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            if v4.is_link_local() {
                return false;
            }
            !(o[0] == 172 && (16..=31).contains(&o[1]) && o[2] == 0 && o[3] == 1)
        }
        IpAddr::V6(v6) => v6.segments()[0] & 0xffc0 != 0xfe80,
    }
}

/// Primary outbound addresses of this host.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
#[must_use]
pub fn local_addresses() -> Vec<IpAddr> {
    let probes: [(IpAddr, SocketAddr); 2] = [
        (
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::from(([192, 0, 2, 1], 9)),
        ),
        (
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            SocketAddr::from(([0x2001, 0xdb8, 0, 0, 0, 0, 0, 1], 9)),
        ),
    ];

    let mut found = Vec::new();
    for (bind_ip, probe) in probes {
        let socket = match UdpSocket::bind(SocketAddr::new(bind_ip, 0)) {
            Ok(s) => s,
            Err(e) => {
                debug!("Address probe bind on {bind_ip} failed: {e}");
                continue;
            }
        };
        if let Err(e) = socket.connect(probe) {
            debug!("No route for {probe}: {e}");
            continue;
        }
        if let Ok(local) = socket.local_addr() {
            if !found.contains(&local.ip()) {
                found.push(local.ip());
            }
        }
    }
    found
}

/// Addresses a listener bound to `bound` should advertise.
///
/// A specific bind IP is advertised as-is. An unspecified bind is replaced by
/// the useful local addresses, keeping the bound port.
#[must_use]
pub fn advertised_addresses(bound: SocketAddr) -> Vec<SocketAddr> {
    if !bound.ip().is_unspecified() {
        return vec![bound];
    }

    let addrs: Vec<SocketAddr> = local_addresses()
        .into_iter()
        .filter(is_useful_address)
        .filter(|ip| ip.is_ipv4() == bound.is_ipv4() || bound.is_ipv6())
        .map(|ip| SocketAddr::new(ip, bound.port()))
        .collect();

    debug!("Advertising {} address(es) for {bound}", addrs.len());
    addrs
}
