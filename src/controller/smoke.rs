//! Offline self-check
//!
//! Exercises every subsystem once against in-memory stores and canned
//! probes, then drives one controller cycle. Nothing touches the network.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::sync::Arc;

use crate::adapt::{AdaptationEngine, RecordingDeviceManager};
use crate::cache::ResearchCache;
use crate::config::LoopSettings;
use crate::database::DeviceFilter;
use crate::models::{DiscoveredDevice, DiscoveryProtocol, Finding, FindingKind, HaltStatus};
use crate::network::ScanScope;
use crate::registry::{DeviceRegistry, MemoryRegistry};
use crate::report::SmokeTestReport;
use crate::research::ResearchEngine;
use crate::scanner::{ProtocolProbe, offline_probes};
use crate::verify::{SafetyVerifier, VerifyInput, VerifyStage};

use super::{CycleController, RecordingPacer};

/// Documentation range; never swept for real
const SMOKE_SUBNET: &str = "192.0.2.0/24";
const SMOKE_TOPIC: &str = "smoke_test_topic";

pub async fn smoke_test() -> SmokeTestReport {
    let mut report = SmokeTestReport::default();

    let registry: Arc<dyn DeviceRegistry> = Arc::new(MemoryRegistry::new());
    let cache = ResearchCache::in_memory();

    report.record("registry", check_registry(registry.as_ref()));
    report.record("cache", check_cache(&cache));

    let probes = offline_probes();
    let scope = match smoke_scope() {
        Ok(scope) => scope,
        Err(e) => {
            report.record("scope", Err(e));
            return report;
        }
    };
    for probe in &probes {
        let name = format!("probe:{}", probe.protocol());
        report.record(&name, check_probe(probe.as_ref(), &scope).await);
    }

    let engine = ResearchEngine::new(Arc::clone(&registry), cache.clone(), probes, scope);
    let findings = engine.conduct_research().await;
    report.record(
        "research",
        findings
            .as_ref()
            .map(|f| format!("{} findings", f.len()))
            .map_err(|e| anyhow::anyhow!("{:#}", e)),
    );

    let manager = Arc::new(RecordingDeviceManager::new());
    let adaptation = AdaptationEngine::new(manager.clone());
    let results = adaptation.adapt(&[smoke_finding()]).await;
    let adapted = match results.first() {
        Some(result) if result.success => Ok(format!(
            "{} handled, {} intents queued",
            result.finding.feature,
            manager.accepted().len()
        )),
        Some(result) => Err(anyhow::anyhow!("{}", result.detail)),
        None => Err(anyhow::anyhow!("priority gate dropped an actionable finding")),
    };
    report.record("adaptation", adapted);

    let verifier = SafetyVerifier::new(Arc::clone(&registry), cache).with_stop_file(None);
    let verified = verifier
        .verify(VerifyInput {
            cycle: 1,
            findings: findings.as_deref().unwrap_or_default(),
            adaptations: &results,
            failure: None,
        })
        .await
        .and_then(|verify| {
            if verify.critical_errors > 0 {
                bail!("{} critical errors: {}", verify.critical_errors, verify.notes.join("; "));
            }
            Ok(format!(
                "{} passed, {} failed",
                verify.tests_passed, verify.tests_failed
            ))
        });
    report.record("verify", verified);

    report.record("controller", check_controller().await);

    report
}

/// One full cycle through the controller on fresh stores
async fn check_controller() -> Result<String> {
    let registry: Arc<dyn DeviceRegistry> = Arc::new(MemoryRegistry::new());
    let cache = ResearchCache::in_memory();
    let research = ResearchEngine::new(Arc::clone(&registry), cache.clone(), offline_probes(), smoke_scope()?);
    let verifier = SafetyVerifier::new(Arc::clone(&registry), cache).with_stop_file(None);

    let controller = CycleController::new(
        Arc::new(research),
        AdaptationEngine::new(Arc::new(RecordingDeviceManager::new())),
        Arc::new(verifier),
        registry,
    )
    .with_pacer(Arc::new(RecordingPacer::new()));

    let settings = LoopSettings {
        max_cycles: 1,
        ..LoopSettings::default()
    };
    let run = controller.run(&settings).await;

    match (&run.halt, run.summaries.as_slice()) {
        (HaltStatus::Completed { cycles: 1, .. }, [summary]) => Ok(format!(
            "1 cycle, {} findings, {} adaptations",
            summary.findings_count, summary.adaptations_count
        )),
        (halt, summaries) => bail!("{} after {} summaries", halt, summaries.len()),
    }
}

fn smoke_scope() -> Result<ScanScope> {
    let network = SMOKE_SUBNET.parse().context("Invalid smoke-test subnet")?;
    ScanScope::new(network, None, vec!["public".to_string()], 16)
}

fn check_registry(registry: &dyn DeviceRegistry) -> Result<String> {
    let address = "192.0.2.1".parse().context("Invalid smoke-test address")?;
    let device = DiscoveredDevice::new(address, DiscoveryProtocol::Snmp);
    registry.upsert(&device)?;
    registry.upsert(&device)?;

    let devices = registry.list(&DeviceFilter::all())?;
    if devices.len() != 1 {
        bail!("expected 1 device after repeated upsert, found {}", devices.len());
    }
    Ok("upsert keyed by address".to_string())
}

fn check_cache(cache: &ResearchCache) -> Result<String> {
    if !cache.should_research(SMOKE_TOPIC)? {
        bail!("unseen topic reported as cached");
    }
    cache.record(SMOKE_TOPIC, None)?;
    if cache.should_research(SMOKE_TOPIC)? {
        bail!("topic recorded at {} still due", Utc::now());
    }
    Ok("window enforced".to_string())
}

async fn check_probe(probe: &dyn ProtocolProbe, scope: &ScanScope) -> Result<String> {
    let report = probe.discover(scope).await?;
    if report.available {
        Ok(format!("{} devices", report.devices.len()))
    } else {
        Ok("unavailable on this host".to_string())
    }
}

fn smoke_finding() -> Finding {
    Finding::new(
        FindingKind::SnmpImprovement,
        "smoke_snmp_capability",
        "Synthetic finding for the adaptation path",
        9,
        serde_json::Value::Null,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_smoke_test_passes_offline() {
        let report = smoke_test().await;
        let failed: Vec<_> = report.checks.iter().filter(|c| !c.passed).collect();
        assert!(failed.is_empty(), "failed checks: {:?}", failed);
        assert!(report.checks.iter().any(|c| c.subsystem == "probe:SNMP"));
        assert!(report.checks.iter().any(|c| c.subsystem == "verify"));
        assert!(report.checks.iter().any(|c| c.subsystem == "controller" && c.passed));
    }
}
