//! Adaptation engine
//!
//! Promotes findings at or above the priority threshold and dispatches each
//! to the handler registered for its kind. Findings below the threshold never
//! reach a handler.

mod handlers;
mod manager;

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{AdaptationResult, Finding, FindingKind};
use crate::{log_debug, log_stderr, log_warn};

pub use handlers::{AdaptationHandler, DelegatingHandler, NoopHandler, default_handlers};
pub use manager::{AdaptationIntent, DeviceManager, RecordingDeviceManager, SqliteDeviceManager};

pub struct AdaptationEngine {
    handlers: HashMap<FindingKind, Arc<dyn AdaptationHandler>>,
    fallback: Arc<dyn AdaptationHandler>,
}

impl AdaptationEngine {
    /// Engine with the default network-discovery handlers
    pub fn new(manager: Arc<dyn DeviceManager>) -> Self {
        let mut engine = Self::empty();
        for (kind, handler) in default_handlers(manager) {
            engine.register(kind, handler);
        }
        engine
    }

    /// Engine where every kind falls through to the no-op handler
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(NoopHandler),
        }
    }

    pub fn register(&mut self, kind: FindingKind, handler: Arc<dyn AdaptationHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn handler_for(&self, kind: FindingKind) -> &Arc<dyn AdaptationHandler> {
        self.handlers.get(&kind).unwrap_or(&self.fallback)
    }

    /// Apply every actionable finding, in input order
    pub async fn adapt(&self, findings: &[Finding]) -> Vec<AdaptationResult> {
        let actionable: Vec<&Finding> = findings.iter().filter(|f| f.is_actionable()).collect();
        let deferred = findings.len() - actionable.len();
        if deferred > 0 {
            log_debug!("{} findings below the adaptation threshold", deferred);
        }

        let mut results = Vec::with_capacity(actionable.len());
        for finding in actionable {
            let handler = self.handler_for(finding.kind);
            let result = handler.apply(finding).await;

            if result.success {
                log_stderr!("Adapted {} via {}: {}", finding.feature, handler.name(), result.detail);
            } else {
                log_warn!("Adaptation of {} failed via {}: {}", finding.feature, handler.name(), result.detail);
            }
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl AdaptationHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn apply<'a>(
            &'a self,
            finding: &'a Finding,
        ) -> Pin<Box<dyn Future<Output = AdaptationResult> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { AdaptationResult::succeeded(finding, "counted") })
        }
    }

    fn finding(kind: FindingKind, feature: &str, priority: u8) -> Finding {
        Finding::new(kind, feature, feature, priority, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn test_low_priority_findings_never_reach_a_handler() {
        let counter = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let mut engine = AdaptationEngine::empty();
        engine.register(FindingKind::SnmpImprovement, counter.clone());
        engine.register(FindingKind::SecurityAdvisory, counter.clone());

        let findings: Vec<Finding> = (0..=6)
            .map(|p| finding(FindingKind::SecurityAdvisory, &format!("low_{}", p), p))
            .chain([finding(FindingKind::SnmpImprovement, "snmp_v3", 9)])
            .collect();

        let results = engine.adapt(&findings).await;
        assert_eq!(results.len(), 1);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].finding.feature, "snmp_v3");
    }

    #[tokio::test]
    async fn test_unregistered_kind_falls_back_to_noop_failure() {
        let engine = AdaptationEngine::new(Arc::new(RecordingDeviceManager::new()));
        let results = engine
            .adapt(&[finding(FindingKind::SecurityAdvisory, "vulnerability_feed", 10)])
            .await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].detail.contains("security-advisory"));
    }

    #[tokio::test]
    async fn test_default_handlers_delegate_to_manager() {
        let manager = Arc::new(RecordingDeviceManager::rejecting(&["cdp_integration"]));
        let engine = AdaptationEngine::new(manager.clone());
        let results = engine
            .adapt(&[
                finding(FindingKind::MndpEnhancement, "mndp_packet_parser", 8),
                finding(FindingKind::CdpDiscovery, "cdp_integration", 7),
            ])
            .await;

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(manager.accepted()[0].action, "enable-mndp-capability");
    }
}
