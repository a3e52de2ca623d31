//! Research engine
//!
//! Produces the findings of one cycle. Categories run in a fixed order
//! (network discovery, web intelligence, technology trends, security); only
//! topics outside a live cache window are researched, and every researched
//! topic is written back to the cache whether or not anything was found.

pub mod catalog;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::cache::ResearchCache;
use crate::models::{Finding, FindingCategory};
use crate::network::ScanScope;
use crate::registry::DeviceRegistry;
use crate::scanner::{ProbeReport, ProtocolProbe};
use crate::{log_debug, log_stderr, log_warn};
use catalog::{CatalogEntry, FEATURE_CATALOG, entries_for_category, entries_for_kind, kind_for_protocol};

/// The Research stage as seen by the cycle controller
pub trait ResearchStage: Send + Sync {
    fn research<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Finding>>> + Send + 'a>>;

    /// Widen probe scope after an empty cycle; false once it cannot grow
    fn expand_scope(&self) -> bool;
}

pub struct ResearchEngine {
    registry: Arc<dyn DeviceRegistry>,
    cache: ResearchCache,
    probes: Vec<Arc<dyn ProtocolProbe>>,
    scope: RwLock<ScanScope>,
    catalog: Vec<CatalogEntry>,
}

impl ResearchEngine {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        cache: ResearchCache,
        probes: Vec<Arc<dyn ProtocolProbe>>,
        scope: ScanScope,
    ) -> Self {
        Self {
            registry,
            cache,
            probes,
            scope: RwLock::new(scope),
            catalog: FEATURE_CATALOG.to_vec(),
        }
    }

    /// Replace the static catalog (tests, restricted deployments)
    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn cache(&self) -> &ResearchCache {
        &self.cache
    }

    pub fn probes(&self) -> &[Arc<dyn ProtocolProbe>] {
        &self.probes
    }

    pub fn scope_snapshot(&self) -> Result<ScanScope> {
        self.scope
            .read()
            .map(|scope| scope.clone())
            .map_err(|_| anyhow!("Scan scope lock poisoned"))
    }

    /// Widen the SNMP sweep range and credential set; never shrinks
    pub fn expand_research_scope(&self) -> Result<bool> {
        let mut scope = self
            .scope
            .write()
            .map_err(|_| anyhow!("Scan scope lock poisoned"))?;
        let expanded = scope.expand();
        if expanded {
            log_stderr!(
                "Research scope expanded to {} with {} communities",
                scope.network(),
                scope.communities().len()
            );
        } else {
            log_debug!("Research scope already at its widest ({})", scope.network());
        }
        Ok(expanded)
    }

    /// All four categories, concatenated in order
    pub async fn conduct_research(&self) -> Result<Vec<Finding>> {
        let mut findings = self.research_network_discovery().await?;
        findings.extend(self.research_web_intelligence()?);
        findings.extend(self.research_technology_trends()?);
        findings.extend(self.research_security_threats()?);

        log_stderr!("Research produced {} findings", findings.len());
        Ok(findings)
    }

    fn due_topics(&self, entries: Vec<CatalogEntry>) -> Result<Vec<CatalogEntry>> {
        let mut due = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.cache.should_research_class(entry.feature, entry.class)? {
                due.push(entry);
            }
        }
        Ok(due)
    }

    /// Runs the probes that have due topics concurrently, then turns their
    /// reports into findings in probe order. Every probe is awaited before
    /// anything is cached; a failing probe leaves all topics due for the next
    /// cycle while the devices the other probes saw are still stored.
    pub async fn research_network_discovery(&self) -> Result<Vec<Finding>> {
        let scope = self.scope_snapshot()?;

        let mut handles = Vec::new();
        for probe in &self.probes {
            let kind = kind_for_protocol(probe.protocol());
            let due = self.due_topics(entries_for_kind(&self.catalog, kind))?;
            if due.is_empty() {
                log_debug!("{} topics cached, skipping probe", probe.protocol());
                continue;
            }

            let probe = Arc::clone(probe);
            let scope = scope.clone();
            let protocol = probe.protocol();
            let handle = tokio::spawn(async move { probe.discover(&scope).await });
            handles.push((protocol, due, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (protocol, due, handle) in handles {
            let outcome = handle
                .await
                .map_err(|e| anyhow!("{} probe task failed: {}", protocol, e))
                .and_then(|result| result.with_context(|| format!("{} probe failed", protocol)));
            match outcome {
                Ok(report) => {
                    self.store_devices(&report)?;
                    reports.push((report, due));
                }
                Err(e) => {
                    log_warn!("{:#}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let mut findings = Vec::new();
        for (report, due) in &reports {
            findings.extend(self.findings_from_report(report, due)?);
        }
        Ok(findings)
    }

    fn store_devices(&self, report: &ProbeReport) -> Result<()> {
        for device in &report.devices {
            self.registry
                .upsert(device)
                .with_context(|| format!("Failed to store device {}", device.address))?;
        }
        if !report.devices.is_empty() {
            log_stderr!("{}: {} devices recorded", report.protocol, report.devices.len());
        }
        Ok(())
    }

    fn findings_from_report(&self, report: &ProbeReport, due: &[CatalogEntry]) -> Result<Vec<Finding>> {
        let payload = json!({
            "protocol": report.protocol,
            "available": report.available,
            "devices_found": report.devices.len(),
            "evidence": report.evidence,
        });

        let mut findings = Vec::new();
        for entry in due {
            // recorded even when nothing is emitted so absent tools are not re-probed
            self.cache.record(entry.feature, Some(&payload))?;

            if entry.requires_probe && !report.available {
                log_debug!("{} unavailable, no finding for {}", report.protocol, entry.feature);
                continue;
            }
            findings.push(finding_for(entry, payload.clone()));
        }
        Ok(findings)
    }

    fn research_catalog_category(&self, category: FindingCategory) -> Result<Vec<Finding>> {
        let due = self.due_topics(entries_for_category(&self.catalog, category))?;
        let payload = json!({ "source": "catalog", "category": category });

        let mut findings = Vec::with_capacity(due.len());
        for entry in &due {
            self.cache.record(entry.feature, Some(&payload))?;
            findings.push(finding_for(entry, payload.clone()));
        }
        Ok(findings)
    }

    pub fn research_web_intelligence(&self) -> Result<Vec<Finding>> {
        self.research_catalog_category(FindingCategory::WebIntelligence)
    }

    pub fn research_technology_trends(&self) -> Result<Vec<Finding>> {
        self.research_catalog_category(FindingCategory::TechnologyTrend)
    }

    pub fn research_security_threats(&self) -> Result<Vec<Finding>> {
        self.research_catalog_category(FindingCategory::Security)
    }
}

fn finding_for(entry: &CatalogEntry, payload: serde_json::Value) -> Finding {
    Finding::new(entry.kind, entry.feature, entry.description, entry.priority, payload)
}

impl ResearchStage for ResearchEngine {
    fn research<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<Finding>>> + Send + 'a>> {
        Box::pin(self.conduct_research())
    }

    fn expand_scope(&self) -> bool {
        match self.expand_research_scope() {
            Ok(expanded) => expanded,
            Err(e) => {
                log_warn!("Scope expansion failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DeviceFilter;
    use crate::models::{DiscoveredDevice, DiscoveryProtocol, FindingKind};
    use crate::registry::MemoryRegistry;
    use crate::scanner::StaticProbe;

    fn scope() -> ScanScope {
        ScanScope::new("10.9.0.0/24".parse().unwrap(), None, vec!["public".to_string()], 254).unwrap()
    }

    fn engine_with(probes: Vec<Arc<dyn ProtocolProbe>>) -> (ResearchEngine, Arc<MemoryRegistry>) {
        let registry = Arc::new(MemoryRegistry::new());
        let engine = ResearchEngine::new(registry.clone(), ResearchCache::in_memory(), probes, scope());
        (engine, registry)
    }

    fn all_probes(lldp_available: bool) -> Vec<Arc<dyn ProtocolProbe>> {
        let device = DiscoveredDevice::new("10.9.0.1".parse().unwrap(), DiscoveryProtocol::Snmp);
        let lldp = if lldp_available {
            StaticProbe::empty(DiscoveryProtocol::Lldp)
        } else {
            StaticProbe::new(ProbeReport::unavailable(DiscoveryProtocol::Lldp, "lldpctl not installed"))
        };
        vec![
            Arc::new(StaticProbe::new(ProbeReport::new(
                DiscoveryProtocol::Snmp,
                vec![device],
                serde_json::Value::Null,
            ))),
            Arc::new(StaticProbe::empty(DiscoveryProtocol::Mndp)),
            Arc::new(lldp),
            Arc::new(StaticProbe::empty(DiscoveryProtocol::Cdp)),
        ]
    }

    #[tokio::test]
    async fn test_first_pass_covers_whole_catalog_in_category_order() {
        let (engine, registry) = engine_with(all_probes(true));
        let findings = engine.conduct_research().await.unwrap();

        assert_eq!(findings.len(), FEATURE_CATALOG.len());
        let categories: Vec<_> = findings.iter().map(|f| f.category).collect();
        let mut sorted = categories.clone();
        sorted.sort_by_key(|c| match c {
            FindingCategory::NetworkDiscovery => 0,
            FindingCategory::WebIntelligence => 1,
            FindingCategory::TechnologyTrend => 2,
            FindingCategory::Security => 3,
        });
        assert_eq!(categories, sorted);
        assert_eq!(registry.list(&DeviceFilter::all()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_inside_window_is_empty() {
        let (engine, _) = engine_with(all_probes(true));
        engine.conduct_research().await.unwrap();
        let again = engine.conduct_research().await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_tool_gives_no_finding_but_is_cached() {
        let (engine, _) = engine_with(all_probes(false));
        let findings = engine.research_network_discovery().await.unwrap();

        assert!(findings.iter().all(|f| f.kind != FindingKind::LldpDiscovery));
        assert!(!engine.cache().should_research("lldp_integration").unwrap());
    }

    #[tokio::test]
    async fn test_probe_config_error_surfaces() {
        struct BrokenProbe;
        impl ProtocolProbe for BrokenProbe {
            fn protocol(&self) -> DiscoveryProtocol {
                DiscoveryProtocol::Snmp
            }
            fn discover<'a>(
                &'a self,
                _scope: &'a ScanScope,
            ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
                Box::pin(async { Err(anyhow!("Malformed SNMP community string")) })
            }
        }

        let (engine, _) = engine_with(vec![Arc::new(BrokenProbe)]);
        let err = engine.conduct_research().await.unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed"));
    }

    /// MNDP config error on the first call only
    struct FlakyMndp {
        failed: std::sync::atomic::AtomicBool,
    }

    impl ProtocolProbe for FlakyMndp {
        fn protocol(&self) -> DiscoveryProtocol {
            DiscoveryProtocol::Mndp
        }
        fn discover<'a>(
            &'a self,
            _scope: &'a ScanScope,
        ) -> Pin<Box<dyn Future<Output = Result<ProbeReport>> + Send + 'a>> {
            let first = !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async move {
                if first {
                    Err(anyhow!("MNDP bind address rejected"))
                } else {
                    Ok(ProbeReport::new(DiscoveryProtocol::Mndp, Vec::new(), serde_json::Value::Null))
                }
            })
        }
    }

    #[tokio::test]
    async fn test_failed_probe_does_not_swallow_other_findings() {
        let device = DiscoveredDevice::new("10.9.0.7".parse().unwrap(), DiscoveryProtocol::Snmp);
        let snmp = StaticProbe::new(ProbeReport::new(
            DiscoveryProtocol::Snmp,
            vec![device],
            serde_json::Value::Null,
        ));
        let (engine, registry) = engine_with(vec![
            Arc::new(snmp),
            Arc::new(FlakyMndp {
                failed: std::sync::atomic::AtomicBool::new(false),
            }),
        ]);

        assert!(engine.research_network_discovery().await.is_err());
        // devices kept, topics left due
        assert_eq!(registry.list(&DeviceFilter::all()).unwrap().len(), 1);
        assert!(engine.cache().should_research("snmp_v3").unwrap());

        let findings = engine.research_network_discovery().await.unwrap();
        assert!(findings.iter().any(|f| f.feature == "snmp_v3"));
        assert!(findings.iter().any(|f| f.kind == FindingKind::MndpEnhancement));
    }

    #[test]
    fn test_expand_scope_is_monotonic() {
        let (engine, _) = engine_with(Vec::new());
        let before = engine.scope_snapshot().unwrap();
        assert!(engine.expand_scope());
        let after = engine.scope_snapshot().unwrap();
        assert!(after.network().prefix() < before.network().prefix());
        assert!(after.communities().len() > before.communities().len());
    }
}
