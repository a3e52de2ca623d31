//! Local interface detection
//!
//! Picks the IPv4 interface whose subnet seeds the SNMP sweep.

use anyhow::{Result, anyhow};
use pnet::datalink;
use pnet::ipnetwork::IpNetwork;
use std::net::Ipv4Addr;

/// IPv4 interface candidate for the sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
}

fn is_virtual_adapter_name(name_lower: &str) -> bool {
    name_lower.contains("hyper-v")
        || name_lower.contains("vmware")
        || name_lower.contains("virtualbox")
        || name_lower.contains("docker")
        || name_lower.contains("vethernet")
        || name_lower.contains("wsl")
}

fn is_usable_ipv4(ip: Ipv4Addr, prefix: u8) -> bool {
    // Skip unassigned placeholders and link-local (169.254.x.x)
    !ip.is_unspecified() && !ip.is_link_local() && prefix > 0
}

fn collect_candidates(interfaces: &[datalink::NetworkInterface]) -> Vec<InterfaceInfo> {
    let mut candidates = Vec::new();

    for iface in interfaces {
        if iface.is_loopback() || !iface.is_up() {
            continue;
        }
        if is_virtual_adapter_name(&iface.name.to_lowercase()) {
            tracing::debug!("Skipping virtual adapter: {}", iface.name);
            continue;
        }

        for network in &iface.ips {
            if let IpNetwork::V4(v4) = network
                && is_usable_ipv4(v4.ip(), v4.prefix())
            {
                candidates.push(InterfaceInfo {
                    name: iface.name.clone(),
                    ip: v4.ip(),
                    prefix_len: v4.prefix(),
                });
            }
        }
    }

    candidates
}

/// Finds the best IPv4 interface for the sweep
pub fn find_valid_interface() -> Result<InterfaceInfo> {
    let interfaces = datalink::interfaces();
    let mut candidates = collect_candidates(&interfaces);
    candidates.sort_by_key(|c| std::cmp::Reverse(interface_score(&c.ip)));

    candidates.into_iter().next().ok_or_else(|| {
        anyhow!("No valid IPv4 network interface found. Ensure you have an active network connection.")
    })
}

/// Scores an IP address for interface selection priority
pub fn interface_score(ip: &Ipv4Addr) -> u32 {
    let octets = ip.octets();
    match octets[0] {
        192 if octets[1] == 168 => 100, // typical home/office LAN
        10 => 90,
        172 if (16..=31).contains(&octets[1]) => 50, // often virtual bridges
        _ => 70,
    }
}
