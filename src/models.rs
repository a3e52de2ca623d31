//! Data models for the research loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::{ADAPTATION_PRIORITY_THRESHOLD, MAX_FINDING_PRIORITY};

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Router,
    Switch,
    Server,
    Controller,
    Unknown,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Router => "router",
            DeviceKind::Switch => "switch",
            DeviceKind::Server => "server",
            DeviceKind::Controller => "controller",
            DeviceKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "router" => Ok(DeviceKind::Router),
            "switch" => Ok(DeviceKind::Switch),
            "server" => Ok(DeviceKind::Server),
            "controller" => Ok(DeviceKind::Controller),
            "unknown" => Ok(DeviceKind::Unknown),
            _ => Err(format!("Unknown device kind: {}", s)),
        }
    }
}

/// Protocol that produced a discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscoveryProtocol {
    Snmp,
    Mndp,
    Lldp,
    Cdp,
}

impl DiscoveryProtocol {
    pub const ALL: [DiscoveryProtocol; 4] = [
        DiscoveryProtocol::Snmp,
        DiscoveryProtocol::Mndp,
        DiscoveryProtocol::Lldp,
        DiscoveryProtocol::Cdp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryProtocol::Snmp => "SNMP",
            DiscoveryProtocol::Mndp => "MNDP",
            DiscoveryProtocol::Lldp => "LLDP",
            DiscoveryProtocol::Cdp => "CDP",
        }
    }
}

impl std::fmt::Display for DiscoveryProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiscoveryProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SNMP" => Ok(DiscoveryProtocol::Snmp),
            "MNDP" => Ok(DiscoveryProtocol::Mndp),
            "LLDP" => Ok(DiscoveryProtocol::Lldp),
            "CDP" => Ok(DiscoveryProtocol::Cdp),
            _ => Err(format!("Unknown discovery protocol: {}", s)),
        }
    }
}

/// Registry lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Stale,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Stale => "stale",
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DeviceStatus::Active),
            "stale" => Ok(DeviceStatus::Stale),
            _ => Err(format!("Unknown device status: {}", s)),
        }
    }
}

/// Protocol-specific credentials that produced a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    Snmp { community: String, version: String },
}

/// A network device found by one of the protocol probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Primary identity
    pub address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    pub display_name: String,
    pub device_kind: DeviceKind,
    pub discovery_protocol: DiscoveryProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_used: Option<Credentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub status: DeviceStatus,
}

impl DiscoveredDevice {
    pub fn new(address: IpAddr, protocol: DiscoveryProtocol) -> Self {
        Self {
            address,
            hardware_id: None,
            display_name: address.to_string(),
            device_kind: DeviceKind::Unknown,
            discovery_protocol: protocol,
            credentials_used: None,
            description: None,
            location: None,
            last_seen: Utc::now(),
            status: DeviceStatus::Active,
        }
    }

    /// True while the name is still the address default from `new`
    pub fn has_placeholder_name(&self) -> bool {
        self.display_name == self.address.to_string()
    }
}

/// Research area a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    NetworkDiscovery,
    WebIntelligence,
    TechnologyTrend,
    Security,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::NetworkDiscovery => "network-discovery",
            FindingCategory::WebIntelligence => "web-intelligence",
            FindingCategory::TechnologyTrend => "technology-trend",
            FindingCategory::Security => "security",
        }
    }
}

/// Finer-grained source of a finding; adaptation handlers are keyed on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    SnmpImprovement,
    MndpEnhancement,
    LldpDiscovery,
    CdpDiscovery,
    WebIntelligence,
    TechnologyTrend,
    SecurityAdvisory,
}

impl FindingKind {
    pub fn category(&self) -> FindingCategory {
        match self {
            FindingKind::SnmpImprovement
            | FindingKind::MndpEnhancement
            | FindingKind::LldpDiscovery
            | FindingKind::CdpDiscovery => FindingCategory::NetworkDiscovery,
            FindingKind::WebIntelligence => FindingCategory::WebIntelligence,
            FindingKind::TechnologyTrend => FindingCategory::TechnologyTrend,
            FindingKind::SecurityAdvisory => FindingCategory::Security,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::SnmpImprovement => "snmp-improvement",
            FindingKind::MndpEnhancement => "mndp-enhancement",
            FindingKind::LldpDiscovery => "lldp-discovery",
            FindingKind::CdpDiscovery => "cdp-discovery",
            FindingKind::WebIntelligence => "web-intelligence",
            FindingKind::TechnologyTrend => "technology-trend",
            FindingKind::SecurityAdvisory => "security-advisory",
        }
    }
}

/// A candidate improvement or discovered fact with a priority score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FindingCategory,
    pub kind: FindingKind,
    /// Stable identifier, also the research cache topic
    pub feature: String,
    pub description: String,
    /// 0..=10, higher is more urgent
    pub priority: u8,
    /// Opaque protocol-specific evidence
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Finding {
    /// Build a finding; priority is clamped into 0..=10
    pub fn new(
        kind: FindingKind,
        feature: impl Into<String>,
        description: impl Into<String>,
        priority: u8,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            category: kind.category(),
            kind,
            feature: feature.into(),
            description: description.into(),
            priority: priority.min(MAX_FINDING_PRIORITY),
            payload,
        }
    }

    /// True when the finding is urgent enough to be adapted
    pub fn is_actionable(&self) -> bool {
        self.priority >= ADAPTATION_PRIORITY_THRESHOLD
    }
}

/// Outcome of applying one finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationResult {
    pub finding: Finding,
    pub success: bool,
    pub detail: String,
    pub applied_at: DateTime<Utc>,
}

impl AdaptationResult {
    pub fn succeeded(finding: &Finding, detail: impl Into<String>) -> Self {
        Self {
            finding: finding.clone(),
            success: true,
            detail: detail.into(),
            applied_at: Utc::now(),
        }
    }

    pub fn failed(finding: &Finding, detail: impl Into<String>) -> Self {
        Self {
            finding: finding.clone(),
            success: false,
            detail: detail.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Result of the Verify stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub errors_fixed: u32,
    pub critical_errors: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Stage of a cycle, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Research,
    Adapt,
    Verify,
    Log,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleStage::Research => write!(f, "research"),
            CycleStage::Adapt => write!(f, "adapt"),
            CycleStage::Verify => write!(f, "verify"),
            CycleStage::Log => write!(f, "log"),
        }
    }
}

/// A recoverable failure absorbed by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFailure {
    pub stage: CycleStage,
    pub message: String,
}

/// Immutable record of one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_number: u32,
    pub findings_count: usize,
    /// Successful adaptations
    pub adaptations_count: usize,
    pub adaptations_failed: usize,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub errors_fixed: u32,
    pub critical_errors: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub scope_expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<CycleFailure>,
    /// Backoff chosen before the next cycle; `None` when the run ended here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_delay_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HaltStatus {
    /// The cycle budget was exhausted
    Completed { cycles: u32, max_cycles: u32 },
    /// Verify reported critical errors
    CriticalError { cycle: u32, reason: String },
    /// The Verify stage itself failed
    SafetyCheckFailed { cycle: u32, reason: String },
    /// External cancellation at a stage boundary
    Cancelled { cycle: u32 },
}

impl HaltStatus {
    /// True for any stop other than normal budget exhaustion
    pub fn is_safety_stop(&self) -> bool {
        matches!(
            self,
            HaltStatus::CriticalError { .. } | HaltStatus::SafetyCheckFailed { .. }
        )
    }

    /// Process exit code for operators and supervisors
    pub fn exit_code(&self) -> i32 {
        match self {
            HaltStatus::Completed { .. } => 0,
            HaltStatus::CriticalError { .. } => 2,
            HaltStatus::SafetyCheckFailed { .. } => 3,
            HaltStatus::Cancelled { .. } => 130,
        }
    }
}

impl std::fmt::Display for HaltStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltStatus::Completed { cycles, max_cycles } => {
                write!(f, "completed {}/{} normally", cycles, max_cycles)
            }
            HaltStatus::CriticalError { cycle, reason } => {
                write!(f, "halted at cycle {} due to critical error: {}", cycle, reason)
            }
            HaltStatus::SafetyCheckFailed { cycle, reason } => {
                write!(f, "halted at cycle {} due to safety check failure: {}", cycle, reason)
            }
            HaltStatus::Cancelled { cycle } => write!(f, "cancelled after cycle {}", cycle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_priority_is_clamped() {
        let finding = Finding::new(
            FindingKind::SecurityAdvisory,
            "cve_feed",
            "Review CVE feed",
            42,
            serde_json::Value::Null,
        );
        assert_eq!(finding.priority, 10);
        assert_eq!(finding.category, FindingCategory::Security);
    }

    #[test]
    fn test_actionable_threshold_is_seven() {
        let low = Finding::new(FindingKind::SnmpImprovement, "a", "a", 6, serde_json::Value::Null);
        let high = Finding::new(FindingKind::SnmpImprovement, "b", "b", 7, serde_json::Value::Null);
        assert!(!low.is_actionable());
        assert!(high.is_actionable());
    }

    #[test]
    fn test_halt_status_wording() {
        let critical = HaltStatus::CriticalError {
            cycle: 3,
            reason: "safety switch tripped".to_string(),
        };
        assert!(critical.to_string().starts_with("halted at cycle 3 due to critical error"));
        assert!(critical.is_safety_stop());

        let done = HaltStatus::Completed {
            cycles: 3,
            max_cycles: 3,
        };
        assert_eq!(done.to_string(), "completed 3/3 normally");
        assert_eq!(done.exit_code(), 0);
    }

    #[test]
    fn test_protocol_round_trips_through_str() {
        for protocol in DiscoveryProtocol::ALL {
            let parsed: DiscoveryProtocol = protocol.as_str().parse().unwrap();
            assert_eq!(parsed, protocol);
        }
    }

    #[test]
    fn test_device_serializes_protocol_uppercase() {
        let device = DiscoveredDevice::new("10.0.0.1".parse().unwrap(), DiscoveryProtocol::Snmp);
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"discovery_protocol\":\"SNMP\""));
        assert!(json.contains("\"status\":\"active\""));
    }
}
