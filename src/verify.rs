//! Verify stage
//!
//! Runs storage health checks, scores adaptation outcomes and decides
//! whether the run must stop. A cycle is critical when an operator trips the
//! safety switch (in process or via the stop file) or when failing cycles
//! reach the configured streak.

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::cache::ResearchCache;
use crate::config::{critical_failure_streak, safety_stop_file};
use crate::database::DeviceFilter;
use crate::models::{AdaptationResult, CycleFailure, Finding, VerifyReport};
use crate::registry::DeviceRegistry;
use crate::{log_error, log_warn};

/// Cache topic read by the health check; never written
const HEALTH_PROBE_TOPIC: &str = "__verify_health__";

/// What the controller hands to Verify after Adapt
#[derive(Debug, Clone, Copy)]
pub struct VerifyInput<'a> {
    pub cycle: u32,
    pub findings: &'a [Finding],
    pub adaptations: &'a [AdaptationResult],
    /// Recoverable failure absorbed earlier in this cycle
    pub failure: Option<&'a CycleFailure>,
}

pub trait VerifyStage: Send + Sync {
    fn verify<'a>(
        &'a self,
        input: VerifyInput<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyReport>> + Send + 'a>>;
}

/// Operator-controlled emergency stop, shareable across tasks
#[derive(Debug, Clone, Default)]
pub struct SafetySwitch {
    tripped: Arc<Mutex<Option<String>>>,
}

impl SafetySwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self, reason: impl Into<String>) {
        if let Ok(mut tripped) = self.tripped.lock() {
            *tripped = Some(reason.into());
        }
    }

    pub fn reset(&self) {
        if let Ok(mut tripped) = self.tripped.lock() {
            *tripped = None;
        }
    }

    pub fn tripped_reason(&self) -> Option<String> {
        self.tripped.lock().ok().and_then(|t| t.clone())
    }
}

#[derive(Debug, Default)]
struct VerifierState {
    consecutive_failures: u32,
    unhealthy: HashSet<&'static str>,
}

pub struct SafetyVerifier {
    registry: Arc<dyn DeviceRegistry>,
    cache: ResearchCache,
    switch: SafetySwitch,
    stop_file: Option<PathBuf>,
    failure_streak_limit: u32,
    state: Mutex<VerifierState>,
}

impl SafetyVerifier {
    pub fn new(registry: Arc<dyn DeviceRegistry>, cache: ResearchCache) -> Self {
        Self {
            registry,
            cache,
            switch: SafetySwitch::new(),
            stop_file: safety_stop_file(),
            failure_streak_limit: critical_failure_streak(),
            state: Mutex::new(VerifierState::default()),
        }
    }

    pub fn with_switch(mut self, switch: SafetySwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn with_stop_file(mut self, path: Option<PathBuf>) -> Self {
        self.stop_file = path;
        self
    }

    pub fn with_failure_streak(mut self, limit: u32) -> Self {
        self.failure_streak_limit = limit.max(1);
        self
    }

    pub fn switch(&self) -> &SafetySwitch {
        &self.switch
    }

    fn health_checks(&self) -> Vec<(&'static str, Result<()>)> {
        vec![
            ("registry", self.registry.list(&DeviceFilter::all()).map(|_| ())),
            ("cache", self.cache.should_research(HEALTH_PROBE_TOPIC).map(|_| ())),
        ]
    }

    fn evaluate(&self, input: VerifyInput<'_>) -> Result<VerifyReport> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Verifier state lock poisoned"))?;
        let mut report = VerifyReport::default();

        let mut unhealthy = HashSet::new();
        for (check, outcome) in self.health_checks() {
            match outcome {
                Ok(()) => {
                    report.tests_passed += 1;
                    if state.unhealthy.contains(check) {
                        report.errors_fixed += 1;
                        report.notes.push(format!("{} check recovered", check));
                    }
                }
                Err(e) => {
                    report.tests_failed += 1;
                    report.notes.push(format!("{} check failed: {:#}", check, e));
                    unhealthy.insert(check);
                }
            }
        }

        for adaptation in input.adaptations {
            if adaptation.success {
                report.tests_passed += 1;
            } else {
                report.tests_failed += 1;
            }
        }

        let cycle_failed = !unhealthy.is_empty() || input.failure.is_some();
        if cycle_failed {
            state.consecutive_failures += 1;
        } else {
            // stage-failure recovery; health-check recoveries were counted above
            if state.consecutive_failures > 0 && state.unhealthy.is_empty() {
                report.errors_fixed += 1;
            }
            state.consecutive_failures = 0;
        }
        state.unhealthy = unhealthy;

        if let Some(reason) = self.switch.tripped_reason() {
            report.critical_errors += 1;
            report.notes.push(format!("safety switch tripped: {}", reason));
        }
        if let Some(path) = &self.stop_file
            && path.exists()
        {
            report.critical_errors += 1;
            report.notes.push(format!("safety stop file present: {}", path.display()));
        }
        if state.consecutive_failures >= self.failure_streak_limit {
            report.critical_errors += 1;
            report.notes.push(format!(
                "{} consecutive failing cycles",
                state.consecutive_failures
            ));
        }

        if report.critical_errors > 0 {
            log_error!("Cycle {} verify: {}", input.cycle, report.notes.join("; "));
        } else if report.tests_failed > 0 {
            log_warn!("Cycle {} verify: {} checks failed", input.cycle, report.tests_failed);
        }

        Ok(report)
    }
}

impl VerifyStage for SafetyVerifier {
    fn verify<'a>(
        &'a self,
        input: VerifyInput<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyReport>> + Send + 'a>> {
        Box::pin(async move { self.evaluate(input) })
    }
}
