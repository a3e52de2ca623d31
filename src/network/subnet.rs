//! Subnet calculation and utilities

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Checks if an IP address is a network or broadcast address
pub fn is_special_address(ip: Ipv4Addr, subnet: &Ipv4Network) -> bool {
    ip == subnet.network() || ip == subnet.broadcast()
}

/// Scannable host addresses of `subnet`, capped at `max_hosts`
///
/// Network and broadcast addresses are excluded. When the subnet is larger
/// than the cap, the window is centered on `anchor` (usually the local IP).
pub fn calculate_subnet_ips(
    subnet: &Ipv4Network,
    anchor: Option<Ipv4Addr>,
    max_hosts: usize,
) -> Vec<Ipv4Addr> {
    // u64 so a /0 broadcast plus one cannot overflow
    let network = u64::from(u32::from(subnet.network()));
    let broadcast = u64::from(u32::from(subnet.broadcast()));
    if broadcast < network + 2 {
        return Vec::new();
    }
    let first = network + 1;
    let last = broadcast - 1;
    let host_count = last - first + 1;
    let cap = max_hosts as u64;

    let to_addrs = |from: u64, to: u64| -> Vec<Ipv4Addr> {
        (from..=to)
            .filter_map(|raw| u32::try_from(raw).ok())
            .map(Ipv4Addr::from)
            .collect()
    };

    if host_count <= cap {
        return to_addrs(first, last);
    }
    if cap == 0 {
        return Vec::new();
    }

    tracing::warn!(
        "Subnet {} has {} hosts, limiting sweep to {} hosts",
        subnet,
        host_count,
        max_hosts
    );

    let center = anchor
        .map(|ip| u64::from(u32::from(ip)))
        .filter(|raw| (first..=last).contains(raw))
        .unwrap_or(first + host_count / 2);

    let mut start = center.saturating_sub(cap / 2).max(first);
    if start + cap > last + 1 {
        start = last + 1 - cap;
    }

    to_addrs(start, start + cap - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_special_address() {
        let subnet: Ipv4Network = "192.168.1.0/24".parse().unwrap();
        assert!(is_special_address("192.168.1.0".parse().unwrap(), &subnet));
        assert!(is_special_address("192.168.1.255".parse().unwrap(), &subnet));
        assert!(!is_special_address("192.168.1.100".parse().unwrap(), &subnet));
    }

    #[test]
    fn test_class_c_yields_254_hosts() {
        let subnet: Ipv4Network = "192.168.1.0/24".parse().unwrap();
        let ips = calculate_subnet_ips(&subnet, None, 254);
        assert_eq!(ips.len(), 254);
        assert_eq!(ips[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(ips[253], Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn test_large_subnet_window_contains_anchor() {
        let subnet: Ipv4Network = "10.0.0.0/22".parse().unwrap();
        let anchor = Ipv4Addr::new(10, 0, 2, 10);
        let ips = calculate_subnet_ips(&subnet, Some(anchor), 254);
        assert_eq!(ips.len(), 254);
        assert!(ips.contains(&anchor));
    }

    #[test]
    fn test_window_clamps_at_subnet_end() {
        let subnet: Ipv4Network = "10.0.0.0/23".parse().unwrap();
        let anchor = Ipv4Addr::new(10, 0, 1, 254);
        let ips = calculate_subnet_ips(&subnet, Some(anchor), 100);
        assert_eq!(ips.len(), 100);
        assert_eq!(*ips.last().unwrap(), anchor);
    }

    #[test]
    fn test_class_a_window_stays_bounded() {
        let subnet: Ipv4Network = "10.0.0.0/8".parse().unwrap();
        let anchor = Ipv4Addr::new(10, 42, 7, 9);
        let ips = calculate_subnet_ips(&subnet, Some(anchor), 254);
        assert_eq!(ips.len(), 254);
        assert!(ips.contains(&anchor));
        assert!(ips.windows(2).all(|pair| u32::from(pair[1]) == u32::from(pair[0]) + 1));
    }

    #[test]
    fn test_whole_address_space_without_anchor() {
        let subnet: Ipv4Network = "0.0.0.0/0".parse().unwrap();
        let ips = calculate_subnet_ips(&subnet, None, 16);
        assert_eq!(ips.len(), 16);
        assert_eq!(ips[8], Ipv4Addr::new(128, 0, 0, 0));
    }

    #[test]
    fn test_point_to_point_has_no_hosts() {
        let subnet: Ipv4Network = "10.0.0.0/31".parse().unwrap();
        assert!(calculate_subnet_ips(&subnet, None, 254).is_empty());
    }
}
