//! JSON export functionality
//!
//! Export run reports and the device inventory to JSON format

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::database::Database;
use crate::models::DiscoveredDevice;
use crate::report::RunReport;

/// Device inventory export format
#[derive(Debug, Serialize)]
pub struct DeviceInventoryExport<'a> {
    pub export_date: String,
    pub total_devices: usize,
    /// Device count per discovery protocol
    pub by_protocol: BTreeMap<&'static str, usize>,
    /// Device count per kind
    pub by_kind: BTreeMap<&'static str, usize>,
    pub devices: &'a [DiscoveredDevice],
}

/// Export the registry contents to JSON
pub fn export_device_inventory_json(devices: &[DiscoveredDevice]) -> Result<String> {
    let mut by_protocol = BTreeMap::new();
    let mut by_kind = BTreeMap::new();
    for device in devices {
        *by_protocol.entry(device.discovery_protocol.as_str()).or_insert(0) += 1;
        *by_kind.entry(device.device_kind.as_str()).or_insert(0) += 1;
    }

    let export = DeviceInventoryExport {
        export_date: chrono::Utc::now().to_rfc3339(),
        total_devices: devices.len(),
        by_protocol,
        by_kind,
        devices,
    };

    let json = serde_json::to_string_pretty(&export)?;
    Ok(json)
}

/// Export a run report to JSON
pub fn export_run_report_json(report: &RunReport) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(json)
}

/// Default directory for run reports
pub fn reports_dir() -> PathBuf {
    Database::data_dir().join("reports")
}

/// Write `research_report_<timestamp>.json` into `dir`
pub fn write_run_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let file_name = format!(
        "research_report_{}.json",
        report.ended_at.format("%Y-%m-%d_%H-%M-%S")
    );
    let path = dir.join(file_name);
    let json = export_run_report_json(report)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write run report {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceKind, DiscoveryProtocol, HaltStatus};
    use chrono::Utc;

    fn report() -> RunReport {
        let now = Utc::now();
        let halt = HaltStatus::Completed {
            cycles: 0,
            max_cycles: 0,
        };
        RunReport {
            run_id: "run-test".to_string(),
            total_cycles: 0,
            max_cycles: 0,
            total_findings: 0,
            total_adaptations: 0,
            failed_adaptations: 0,
            halt_message: halt.to_string(),
            halt,
            summaries: Vec::new(),
            recommendations: Vec::new(),
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn test_export_device_inventory_json() {
        let mut router = DiscoveredDevice::new("192.168.1.1".parse().unwrap(), DiscoveryProtocol::Snmp);
        router.device_kind = DeviceKind::Router;
        let neighbor = DiscoveredDevice::new("192.168.1.2".parse().unwrap(), DiscoveryProtocol::Mndp);

        let json = export_device_inventory_json(&[router, neighbor]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["total_devices"], 2);
        assert_eq!(parsed["by_protocol"]["SNMP"], 1);
        assert_eq!(parsed["by_kind"]["router"], 1);
    }

    #[test]
    fn test_write_run_report_creates_named_file() {
        let dir = std::env::temp_dir().join(format!("nexus-research-reports-{}", std::process::id()));
        let path = write_run_report(&report(), &dir).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("research_report_"));
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["halt"]["status"], "completed");
        assert_eq!(parsed["halt_message"], "completed 0/0 normally");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
