//! Scanner module - SNMP sweep, MNDP listener, LLDP and CDP probes
//!
//! Every probe implements [`ProtocolProbe`]. Transient trouble (timeouts,
//! unreachable hosts, missing tools) never becomes an `Err`; it shows up as
//! an empty report or `available = false`. Only configuration problems fail.

mod cdp;
mod lldp;
mod mndp;
mod snmp;
mod tooling;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::models::{DiscoveredDevice, DiscoveryProtocol};
use crate::network::ScanScope;

pub use cdp::{CdpProbe, parse_cdp_verbose};
pub use lldp::{LldpProbe, parse_lldp_keyvalue};
pub use mndp::{MndpProbe, MndpPacket};
pub use snmp::{SnmpProbe, query_host_snmp};
pub use tooling::{find_tool, run_tool};

/// Result of one probe pass
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub protocol: DiscoveryProtocol,
    /// False when the probe could not run here (tool missing, port busy)
    pub available: bool,
    pub devices: Vec<DiscoveredDevice>,
    /// Opaque protocol-specific evidence attached to findings
    pub evidence: serde_json::Value,
}

impl ProbeReport {
    pub fn new(protocol: DiscoveryProtocol, devices: Vec<DiscoveredDevice>, evidence: serde_json::Value) -> Self {
        Self {
            protocol,
            available: true,
            devices,
            evidence,
        }
    }

    pub fn unavailable(protocol: DiscoveryProtocol, reason: impl Into<String>) -> Self {
        Self {
            protocol,
            available: false,
            devices: Vec::new(),
            evidence: json!({ "available": false, "reason": reason.into() }),
        }
    }
}

/// A discovery strategy for one protocol
pub trait ProtocolProbe: Send + Sync {
    fn protocol(&self) -> DiscoveryProtocol;

    /// Whether the probe can run on this host without touching the network
    fn is_available(&self) -> bool {
        true
    }

    fn discover<'a>(
        &'a self,
        scope: &'a ScanScope,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>>;
}

/// Probe that replays a fixed report; used by test mode and tests
#[derive(Debug, Clone)]
pub struct StaticProbe {
    report: ProbeReport,
}

impl StaticProbe {
    pub fn new(report: ProbeReport) -> Self {
        Self { report }
    }

    /// Available probe that finds nothing
    pub fn empty(protocol: DiscoveryProtocol) -> Self {
        Self::new(ProbeReport::new(protocol, Vec::new(), json!({ "offline": true })))
    }
}

impl ProtocolProbe for StaticProbe {
    fn protocol(&self) -> DiscoveryProtocol {
        self.report.protocol
    }

    fn is_available(&self) -> bool {
        self.report.available
    }

    fn discover<'a>(
        &'a self,
        _scope: &'a ScanScope,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
        Box::pin(async move { Ok(self.report.clone()) })
    }
}

/// The live probe set: SNMP, MNDP, LLDP, CDP
pub fn default_probes() -> Vec<Arc<dyn ProtocolProbe>> {
    vec![
        Arc::new(SnmpProbe::new()),
        Arc::new(MndpProbe::new()),
        Arc::new(LldpProbe::new()),
        Arc::new(CdpProbe::new()),
    ]
}

/// Offline stand-ins for every protocol; LLDP/CDP mirror local tool presence
pub fn offline_probes() -> Vec<Arc<dyn ProtocolProbe>> {
    DiscoveryProtocol::ALL
        .into_iter()
        .map(|protocol| {
            let available = match protocol {
                DiscoveryProtocol::Lldp => LldpProbe::new().is_available(),
                DiscoveryProtocol::Cdp => CdpProbe::new().is_available(),
                _ => true,
            };
            let probe = if available {
                StaticProbe::empty(protocol)
            } else {
                StaticProbe::new(ProbeReport::unavailable(protocol, "tool not installed"))
            };
            Arc::new(probe) as Arc<dyn ProtocolProbe>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_probe_replays_report() {
        let scope = ScanScope::new(
            "10.0.0.0/30".parse().unwrap(),
            None,
            vec!["public".to_string()],
            254,
        )
        .unwrap();
        let device = DiscoveredDevice::new("10.0.0.1".parse().unwrap(), DiscoveryProtocol::Snmp);
        let probe = StaticProbe::new(ProbeReport::new(
            DiscoveryProtocol::Snmp,
            vec![device],
            serde_json::Value::Null,
        ));

        let report = probe.discover(&scope).await.unwrap();
        assert_eq!(probe.protocol(), DiscoveryProtocol::Snmp);
        assert_eq!(report.devices.len(), 1);
    }

    #[test]
    fn test_offline_probes_cover_every_protocol() {
        let protocols: Vec<_> = offline_probes().iter().map(|p| p.protocol()).collect();
        assert_eq!(protocols, DiscoveryProtocol::ALL.to_vec());
    }

    #[test]
    fn test_unavailable_report_is_empty() {
        let report = ProbeReport::unavailable(DiscoveryProtocol::Cdp, "tcpdump not found");
        assert!(!report.available);
        assert!(report.devices.is_empty());
        assert_eq!(report.evidence["reason"], "tcpdump not found");
    }
}
