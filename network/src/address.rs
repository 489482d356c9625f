// Copyright (C) 2019-2021 Aleo Systems Inc.
// This file is part of the meshring library.

// The meshring library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The meshring library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the meshring library. If not, see <https://www.gnu.org/licenses/>.

use crate::NetworkError;

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    str::FromStr,
};

/// The identity of a node on the overlay: its IPv4 address and listening port.
///
/// The port is always the peer's *listening* port, never the ephemeral source
/// port of a stream; peers address one another by the port they announce
/// inside every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    ip: Ipv4Addr,
    port: u16,
}

impl NodeAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    #[inline]
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves a `host:port` string into a node address.
    ///
    /// The host may be a hostname or a dotted quad; it is resolved to an IPv4
    /// address. A resolution that lands on loopback is swapped for this
    /// host's non-loopback IPv4 when one exists, so that the address remains
    /// meaningful when handed to remote peers.
    pub fn resolve(s: &str) -> Result<Self, NetworkError> {
        let (host, port) = split_host_port(s)?;

        let mut candidates = (host, port)
            .to_socket_addrs()
            .map_err(|_| NetworkError::AddressResolution(s.to_owned()))?;
        let ip = candidates
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| NetworkError::AddressResolution(s.to_owned()))?;

        let ip = if ip.is_loopback() {
            local_ipv4().unwrap_or(ip)
        } else {
            ip
        };

        Ok(Self::new(ip, port))
    }

    /// Parses the `a.b.c.d:port` form produced by `Display`; no resolution.
    pub fn from_literal(s: &str) -> Option<Self> {
        let (host, port) = split_host_port(s).ok()?;
        let ip = host.parse::<Ipv4Addr>().ok()?;
        Some(Self::new(ip, port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl From<NodeAddress> for SocketAddr {
    fn from(address: NodeAddress) -> Self {
        SocketAddr::V4(SocketAddrV4::new(address.ip, address.port))
    }
}

fn split_host_port(s: &str) -> Result<(&str, u16), NetworkError> {
    let mut parts = s.rsplitn(2, ':');
    let port = parts
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| NetworkError::InvalidAddress(s.to_owned()))?;
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| NetworkError::InvalidAddress(s.to_owned()))?;

    Ok((host, port))
}

/// Returns this host's primary non-loopback IPv4, if any.
///
/// Uses the local address of a connected UDP socket; no datagram is sent.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.254.254.254:1").ok()?;

    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_loopback() => Some(*addr.ip()),
        _ => None,
    }
}

/// Renders a neighbor list in its wire form: `ip:port;…;`, or `;` alone when
/// the list is empty.
pub fn encode_neighbor_list(addresses: &[NodeAddress]) -> String {
    if addresses.is_empty() {
        return ";".to_owned();
    }

    let mut encoded = String::new();
    for address in addresses {
        encoded.push_str(&address.to_string());
        encoded.push(';');
    }
    encoded
}

/// Parses the wire form produced by `encode_neighbor_list`; unparsable
/// entries are skipped.
pub fn parse_neighbor_list(payload: &str) -> Vec<NodeAddress> {
    payload
        .split(';')
        .filter(|entry| !entry.is_empty())
        .filter_map(NodeAddress::from_literal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trip() {
        let address = NodeAddress::new(Ipv4Addr::new(192, 168, 1, 42), 5000);

        assert_eq!(address.to_string(), "192.168.1.42:5000");
        assert_eq!(NodeAddress::from_literal("192.168.1.42:5000"), Some(address));
    }

    #[test]
    fn literal_rejects_garbage() {
        assert_eq!(NodeAddress::from_literal("not-an-ip:5000"), None);
        assert_eq!(NodeAddress::from_literal("1.2.3.4"), None);
        assert_eq!(NodeAddress::from_literal("1.2.3.4:notaport"), None);
        assert_eq!(NodeAddress::from_literal(""), None);
    }

    #[test]
    fn equality_uses_both_fields() {
        let a = NodeAddress::new(Ipv4Addr::new(10, 0, 0, 1), 5000);
        let b = NodeAddress::new(Ipv4Addr::new(10, 0, 0, 1), 5001);
        let c = NodeAddress::new(Ipv4Addr::new(10, 0, 0, 2), 5000);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, NodeAddress::new(Ipv4Addr::new(10, 0, 0, 1), 5000));
    }

    #[test]
    fn resolve_dotted_quad() {
        let address = NodeAddress::resolve("192.0.2.1:9000").unwrap();

        assert_eq!(address.ip(), Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(address.port(), 9000);
    }

    #[test]
    fn resolve_rejects_missing_port() {
        assert!(NodeAddress::resolve("192.0.2.1").is_err());
        assert!(NodeAddress::resolve(":9000").is_err());
    }

    #[test]
    fn neighbor_list_round_trip() {
        let neighbors = vec![
            NodeAddress::new(Ipv4Addr::new(10, 0, 0, 1), 5001),
            NodeAddress::new(Ipv4Addr::new(10, 0, 0, 2), 5002),
        ];

        let encoded = encode_neighbor_list(&neighbors);
        assert_eq!(encoded, "10.0.0.1:5001;10.0.0.2:5002;");
        assert_eq!(parse_neighbor_list(&encoded), neighbors);
    }

    #[test]
    fn empty_neighbor_list_is_a_lone_separator() {
        assert_eq!(encode_neighbor_list(&[]), ";");
        assert!(parse_neighbor_list(";").is_empty());
    }
}
