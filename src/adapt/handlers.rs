//! Adaptation handlers
//!
//! Handlers are thin: they turn a finding into an intent, hand it to the
//! device manager and report whether that call succeeded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::manager::{AdaptationIntent, DeviceManager};
use crate::models::{AdaptationResult, Finding, FindingKind};

pub trait AdaptationHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply<'a>(
        &'a self,
        finding: &'a Finding,
    ) -> Pin<Box<dyn Future<Output = AdaptationResult> + Send + 'a>>;
}

/// Forwards an intent with a fixed action to the device manager
pub struct DelegatingHandler {
    name: &'static str,
    action: &'static str,
    manager: Arc<dyn DeviceManager>,
}

impl DelegatingHandler {
    pub fn new(name: &'static str, action: &'static str, manager: Arc<dyn DeviceManager>) -> Self {
        Self {
            name,
            action,
            manager,
        }
    }

    pub fn snmp_improvement(manager: Arc<dyn DeviceManager>) -> Self {
        Self::new("snmp-improvement", "enable-snmp-capability", manager)
    }

    pub fn mndp_enhancement(manager: Arc<dyn DeviceManager>) -> Self {
        Self::new("mndp-enhancement", "enable-mndp-capability", manager)
    }

    pub fn lldp_integration(manager: Arc<dyn DeviceManager>) -> Self {
        Self::new("lldp-integration", "integrate-lldp-neighbors", manager)
    }

    pub fn cdp_integration(manager: Arc<dyn DeviceManager>) -> Self {
        Self::new("cdp-integration", "integrate-cdp-neighbors", manager)
    }
}

impl AdaptationHandler for DelegatingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply<'a>(
        &'a self,
        finding: &'a Finding,
    ) -> Pin<Box<dyn Future<Output = AdaptationResult> + Send + 'a>> {
        Box::pin(async move {
            let intent = AdaptationIntent {
                kind: finding.kind,
                feature: finding.feature.clone(),
                action: self.action.to_string(),
                priority: finding.priority,
            };
            match self.manager.submit(&intent) {
                Ok(ack) => AdaptationResult::succeeded(finding, format!("{} {}: {}", self.action, finding.feature, ack)),
                Err(e) => AdaptationResult::failed(finding, format!("{} {}: {:#}", self.action, finding.feature, e)),
            }
        })
    }
}

/// Fallback for kinds without a registered handler; always reports failure
pub struct NoopHandler;

impl AdaptationHandler for NoopHandler {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn apply<'a>(
        &'a self,
        finding: &'a Finding,
    ) -> Pin<Box<dyn Future<Output = AdaptationResult> + Send + 'a>> {
        Box::pin(async move {
            AdaptationResult::failed(finding, format!("no adaptation handler for {}", finding.kind.as_str()))
        })
    }
}

/// Default handler set keyed by finding kind
pub fn default_handlers(manager: Arc<dyn DeviceManager>) -> Vec<(FindingKind, Arc<dyn AdaptationHandler>)> {
    let handlers: [(FindingKind, DelegatingHandler); 4] = [
        (
            FindingKind::SnmpImprovement,
            DelegatingHandler::snmp_improvement(Arc::clone(&manager)),
        ),
        (
            FindingKind::MndpEnhancement,
            DelegatingHandler::mndp_enhancement(Arc::clone(&manager)),
        ),
        (
            FindingKind::LldpDiscovery,
            DelegatingHandler::lldp_integration(Arc::clone(&manager)),
        ),
        (FindingKind::CdpDiscovery, DelegatingHandler::cdp_integration(manager)),
    ];

    handlers
        .into_iter()
        .map(|(kind, handler)| (kind, Arc::new(handler) as Arc<dyn AdaptationHandler>))
        .collect()
}
