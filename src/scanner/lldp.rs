//! LLDP neighbors via `lldpctl`
//!
//! Only runs when lldpd's client is installed. Neighbors come from the
//! key/value output format (`lldp.<iface>.<path>=<value>`).

use anyhow::Result;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use super::tooling::{find_tool, run_tool};
use super::{ProbeReport, ProtocolProbe};
use crate::config::tool_timeout;
use crate::models::{DiscoveredDevice, DiscoveryProtocol};
use crate::network::{ScanScope, classify_device_kind};
use crate::{log_debug, log_warn};

const LLDPCTL: &str = "lldpctl";

/// Parse `lldpctl -f keyvalue` output into devices; neighbors without a
/// management address are skipped
pub fn parse_lldp_keyvalue(output: &str) -> Vec<DiscoveredDevice> {
    let mut neighbors: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let mut parts = key.trim().splitn(3, '.');
        let (Some("lldp"), Some(iface), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        neighbors
            .entry(iface)
            .or_default()
            // first value wins for repeated keys (multiple mgmt-ip lines)
            .entry(path)
            .or_insert(value.trim());
    }

    neighbors
        .values()
        .filter_map(|fields| {
            let address: IpAddr = fields.get("chassis.mgmt-ip")?.parse().ok()?;
            let mut device = DiscoveredDevice::new(address, DiscoveryProtocol::Lldp);
            if let Some(name) = fields.get("chassis.name") {
                device.display_name = name.to_string();
            }
            if let Some(descr) = fields.get("chassis.descr") {
                device.device_kind = classify_device_kind(descr);
                device.description = Some(descr.to_string());
            }
            device.hardware_id = fields.get("chassis.mac").map(|mac| mac.to_lowercase());
            Some(device)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct LldpProbe {
    tool: Option<PathBuf>,
    timeout: Duration,
}

impl LldpProbe {
    pub fn new() -> Self {
        Self {
            tool: find_tool(LLDPCTL),
            timeout: tool_timeout(),
        }
    }

    async fn query(&self) -> Result<ProbeReport> {
        let Some(tool) = &self.tool else {
            return Ok(ProbeReport::unavailable(DiscoveryProtocol::Lldp, "lldpctl not installed"));
        };

        match run_tool(tool, &["-f", "keyvalue"], self.timeout).await {
            Ok(output) => {
                let devices = parse_lldp_keyvalue(&output);
                log_debug!("LLDP: {} neighbors with management addresses", devices.len());
                let evidence = json!({
                    "tool": tool.display().to_string(),
                    "neighbors": devices.len(),
                });
                Ok(ProbeReport::new(DiscoveryProtocol::Lldp, devices, evidence))
            }
            Err(e) => {
                log_warn!("LLDP query failed: {}", e);
                Ok(ProbeReport::new(
                    DiscoveryProtocol::Lldp,
                    Vec::new(),
                    json!({ "tool": tool.display().to_string(), "error": e.to_string() }),
                ))
            }
        }
    }
}

impl Default for LldpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolProbe for LldpProbe {
    fn protocol(&self) -> DiscoveryProtocol {
        DiscoveryProtocol::Lldp
    }

    fn is_available(&self) -> bool {
        self.tool.is_some()
    }

    fn discover<'a>(
        &'a self,
        _scope: &'a ScanScope,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
        Box::pin(self.query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceKind;

    const SAMPLE: &str = "\
lldp.eth0.via=LLDP
lldp.eth0.rid=1
lldp.eth0.age=0 day, 00:12:31
lldp.eth0.chassis.mac=00:1B:54:AA:10:01
lldp.eth0.chassis.name=access-sw-1
lldp.eth0.chassis.descr=Cisco IOS Software, C2960 Software
lldp.eth0.chassis.mgmt-ip=192.168.1.2
lldp.eth0.chassis.mgmt-ip=fe80::21b:54ff:feaa:1001
lldp.eth0.port.ifname=Gi0/1
lldp.eth1.via=LLDP
lldp.eth1.chassis.name=no-mgmt
";

    #[test]
    fn test_parses_neighbors_with_management_address() {
        let devices = parse_lldp_keyvalue(SAMPLE);
        assert_eq!(devices.len(), 1);

        let device = &devices[0];
        assert_eq!(device.address.to_string(), "192.168.1.2");
        assert_eq!(device.display_name, "access-sw-1");
        assert_eq!(device.device_kind, DeviceKind::Switch);
        assert_eq!(device.hardware_id.as_deref(), Some("00:1b:54:aa:10:01"));
        assert_eq!(device.discovery_protocol, DiscoveryProtocol::Lldp);
    }

    #[test]
    fn test_garbage_output_yields_nothing() {
        assert!(parse_lldp_keyvalue("").is_empty());
        assert!(parse_lldp_keyvalue("not=lldp\nfoo").is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_not_an_error() {
        let probe = LldpProbe {
            tool: None,
            timeout: Duration::from_millis(100),
        };
        let scope = ScanScope::new("10.0.0.0/30".parse().unwrap(), None, vec!["public".to_string()], 254).unwrap();

        let report = probe.discover(&scope).await.unwrap();
        assert!(!probe.is_available());
        assert!(!report.available);
    }
}
