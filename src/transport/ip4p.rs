//! IP4P address rewriting
//!
//! An IP4P AAAA record publishes an IPv4 endpoint behind NAT as
//! `2001:0000:<port>:<ipv4>::`-style IPv6 data: bytes 10..12 carry the port
//! and bytes 12..16 the IPv4 address. The dial target is rewritten to that
//! endpoint when such a record is found.

use crate::constants::IP4P_PREFIX;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};
use tracing::{debug, warn};

/// Decode an IP4P-encoded IPv6 address.
pub fn decode(addr: &Ipv6Addr) -> Option<SocketAddrV4> {
    let octets = addr.octets();
    if octets[..4] != IP4P_PREFIX {
        return None;
    }
    let port = u16::from_be_bytes([octets[10], octets[11]]);
    let ip = Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]);
    Some(SocketAddrV4::new(ip, port))
}

/// Resolve `addr` and rewrite it to the IPv4 endpoint of the first IP4P
/// answer.
///
/// Anything that is not a `host:port` with a resolvable host name comes back
/// unchanged.
pub async fn lookup_ip4p(addr: &str) -> String {
    let Some((host, _port)) = addr.rsplit_once(':') else {
        warn!("[ip4p] not a host:port address: {}", addr);
        return addr.to_string();
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.parse::<IpAddr>().is_ok() {
        return addr.to_string();
    }

    let resolved = match tokio::net::lookup_host(addr).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("[ip4p] lookup of {} failed: {}", host, e);
            return addr.to_string();
        }
    };

    for candidate in resolved {
        if let SocketAddr::V6(v6) = candidate {
            if let Some(endpoint) = decode(v6.ip()) {
                debug!("[ip4p] {} rewritten to {}", addr, endpoint);
                return endpoint.to_string();
            }
        }
    }
    addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ip4p_address() {
        // port 8080 (0x1f90), address 192.168.1.1
        let addr: Ipv6Addr = "2001:0:0:0:0:1f90:c0a8:101".parse().unwrap();
        assert_eq!(decode(&addr), Some("192.168.1.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_decode_rejects_other_prefixes() {
        let addr: Ipv6Addr = "2001:db8::1f90:c0a8:101".parse().unwrap();
        assert_eq!(decode(&addr), None);
        assert_eq!(decode(&Ipv6Addr::LOCALHOST), None);
    }

    #[tokio::test]
    async fn test_literal_addresses_unchanged() {
        assert_eq!(lookup_ip4p("1.2.3.4:443").await, "1.2.3.4:443");
        assert_eq!(lookup_ip4p("[::1]:443").await, "[::1]:443");
        assert_eq!(lookup_ip4p(":443").await, ":443");
    }

    #[tokio::test]
    async fn test_malformed_address_unchanged() {
        assert_eq!(lookup_ip4p("no-port").await, "no-port");
    }

    #[tokio::test]
    async fn test_non_ip4p_host_unchanged() {
        assert_eq!(lookup_ip4p("localhost:8388").await, "localhost:8388");
    }
}
