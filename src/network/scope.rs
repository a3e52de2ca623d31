//! SNMP sweep scope
//!
//! The address range and community list used by the sweep. Expansion is
//! monotonic: the prefix only shrinks (range only grows), the host cap only
//! rises and communities are only appended.

use anyhow::{Context, Result, bail};
use ipnetwork::Ipv4Network;
use serde::Serialize;
use std::net::Ipv4Addr;

use super::interface::find_valid_interface;
use super::subnet::calculate_subnet_ips;
use crate::config::{
    DEFAULT_PREFIX_LEN, FALLBACK_SUBNET, MIN_SCOPE_PREFIX_LEN, SNMP_FALLBACK_COMMUNITIES,
    max_scan_hosts, scan_subnet_override, snmp_communities,
};

/// Hard ceiling for the host cap after expansion (one /22)
const MAX_EXPANDED_HOSTS: usize = 1022;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanScope {
    network: Ipv4Network,
    anchor: Option<Ipv4Addr>,
    communities: Vec<String>,
    max_hosts: usize,
    expansions: u32,
}

impl ScanScope {
    pub fn new(
        network: Ipv4Network,
        anchor: Option<Ipv4Addr>,
        communities: Vec<String>,
        max_hosts: usize,
    ) -> Result<Self> {
        let normalized = Ipv4Network::new(network.network(), network.prefix())
            .context("Failed to normalize scan network")?;
        let scope = Self {
            network: normalized,
            anchor,
            communities,
            max_hosts: max_hosts.max(1),
            expansions: 0,
        };
        scope.validate()?;
        Ok(scope)
    }

    /// Scope for this host: `NEXUS_SCAN_SUBNET`, else the best local
    /// interface, else the fallback /24
    pub fn detect() -> Result<Self> {
        let communities = snmp_communities();
        let max_hosts = max_scan_hosts();

        if let Some(raw) = scan_subnet_override() {
            let network: Ipv4Network = raw
                .parse()
                .with_context(|| format!("Invalid NEXUS_SCAN_SUBNET value '{}'", raw))?;
            return Self::new(network, None, communities, max_hosts);
        }

        match find_valid_interface() {
            Ok(iface) => {
                let prefix = if iface.prefix_len == 0 {
                    DEFAULT_PREFIX_LEN
                } else {
                    iface.prefix_len
                };
                let network = Ipv4Network::new(iface.ip, prefix)
                    .context("Failed to build network from interface")?;
                tracing::info!("Sweep scope seeded from {} ({}/{})", iface.name, iface.ip, prefix);
                Self::new(network, Some(iface.ip), communities, max_hosts)
            }
            Err(e) => {
                tracing::warn!("{}; falling back to {}", e, FALLBACK_SUBNET);
                let network: Ipv4Network = FALLBACK_SUBNET
                    .parse()
                    .context("Invalid fallback subnet")?;
                Self::new(network, None, communities, max_hosts)
            }
        }
    }

    /// Rejects configurations the sweep cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.communities.is_empty() {
            bail!("SNMP sweep scope has no community strings");
        }
        if let Some(bad) = self.communities.iter().find(|c| c.trim().is_empty() || c.len() > 64) {
            bail!("Malformed SNMP community string '{}'", bad);
        }
        Ok(())
    }

    /// Addresses to sweep this cycle
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        calculate_subnet_ips(&self.network, self.anchor, self.max_hosts)
    }

    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    pub fn communities(&self) -> &[String] {
        &self.communities
    }

    pub fn max_hosts(&self) -> usize {
        self.max_hosts
    }

    pub fn expansions(&self) -> u32 {
        self.expansions
    }

    /// Widen the range by one prefix bit and append the next fallback
    /// community. Returns false once neither can grow.
    pub fn expand(&mut self) -> bool {
        let mut changed = false;

        if self.network.prefix() > MIN_SCOPE_PREFIX_LEN {
            let prefix = self.network.prefix() - 1;
            if let Ok(wider) = Ipv4Network::new(self.network.network(), prefix)
                .and_then(|n| Ipv4Network::new(n.network(), prefix))
            {
                self.network = wider;
                self.max_hosts = (self.max_hosts * 2).min(MAX_EXPANDED_HOSTS).max(self.max_hosts);
                changed = true;
            }
        }

        if let Some(next) = SNMP_FALLBACK_COMMUNITIES
            .iter()
            .find(|c| !self.communities.iter().any(|existing| existing == *c))
        {
            self.communities.push(next.to_string());
            changed = true;
        }

        if changed {
            self.expansions += 1;
        }
        changed
    }
}
