//! Static feature catalog
//!
//! Every research topic the engine knows about, with its fixed description,
//! base priority and dedup window class. Network-discovery topics sit at 7-9
//! so they clear the adaptation gate; intelligence topics stay below it.

use serde::Serialize;

use crate::cache::TopicClass;
use crate::models::{DiscoveryProtocol, FindingCategory, FindingKind};
use FindingKind::*;
use TopicClass::{BehaviorPattern, Feature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub kind: FindingKind,
    /// Stable topic id, also the cache key
    pub feature: &'static str,
    pub description: &'static str,
    pub priority: u8,
    pub class: TopicClass,
    /// Emit only when the backing probe can run on this host
    pub requires_probe: bool,
}

const fn entry(
    kind: FindingKind,
    feature: &'static str,
    description: &'static str,
    priority: u8,
    class: TopicClass,
    requires_probe: bool,
) -> CatalogEntry {
    CatalogEntry {
        kind,
        feature,
        description,
        priority,
        class,
        requires_probe,
    }
}

pub const FEATURE_CATALOG: &[CatalogEntry] = &[
    // SNMP
    entry(SnmpImprovement, "snmp_v3", "Add SNMPv3 authentication and privacy support", 9, Feature, false),
    entry(SnmpImprovement, "snmp_trap_listener", "Listen for SNMP traps from managed devices", 9, BehaviorPattern, false),
    entry(SnmpImprovement, "snmp_walk_optimization", "Optimize SNMP walks of large MIB subtrees", 9, Feature, false),
    entry(SnmpImprovement, "snmp_bulk_operations", "Use GETBULK for table retrieval", 9, Feature, false),
    // MNDP
    entry(MndpEnhancement, "mndp_packet_parser", "Decode MNDP announcement TLVs", 8, Feature, false),
    entry(MndpEnhancement, "mndp_device_database", "Keep MikroTik neighbors in the device registry", 8, Feature, false),
    entry(MndpEnhancement, "mndp_auto_discovery", "Auto-discover MikroTik devices from MNDP broadcasts", 8, Feature, false),
    entry(MndpEnhancement, "mndp_monitoring", "Track MNDP announcement patterns over time", 8, BehaviorPattern, false),
    // LLDP / CDP
    entry(LldpDiscovery, "lldp_integration", "Integrate LLDP neighbor discovery", 7, Feature, true),
    entry(CdpDiscovery, "cdp_integration", "Capture and decode CDP neighbor frames", 7, Feature, true),
    // Web intelligence
    entry(WebIntelligence, "webgl_improvements", "Review WebGL rendering improvements for topology views", 5, Feature, false),
    entry(WebIntelligence, "performance_optimizations", "Review dashboard performance optimizations", 6, Feature, false),
    // Technology trends
    entry(TechnologyTrend, "ai_integration", "Track AI-assisted network operations tooling", 5, Feature, false),
    entry(TechnologyTrend, "iot_integration", "Track IoT device management protocols", 5, Feature, false),
    // Security
    entry(SecurityAdvisory, "vulnerability_feed", "Review new network device vulnerabilities", 6, BehaviorPattern, false),
    entry(SecurityAdvisory, "security_best_practices", "Review SNMP and management-plane hardening guidance", 4, Feature, false),
];

/// Finding kind produced by a protocol probe
pub fn kind_for_protocol(protocol: DiscoveryProtocol) -> FindingKind {
    match protocol {
        DiscoveryProtocol::Snmp => SnmpImprovement,
        DiscoveryProtocol::Mndp => MndpEnhancement,
        DiscoveryProtocol::Lldp => LldpDiscovery,
        DiscoveryProtocol::Cdp => CdpDiscovery,
    }
}

pub fn entries_for_kind(catalog: &[CatalogEntry], kind: FindingKind) -> Vec<CatalogEntry> {
    catalog.iter().filter(|e| e.kind == kind).copied().collect()
}

pub fn entries_for_category(catalog: &[CatalogEntry], category: FindingCategory) -> Vec<CatalogEntry> {
    catalog
        .iter()
        .filter(|e| e.kind.category() == category)
        .copied()
        .collect()
}
