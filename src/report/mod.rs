//! Run and smoke-test reports

pub mod recommendations;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CycleSummary, HaltStatus};
pub use recommendations::{Priority, Recommendation, build_recommendations};

/// Terminal report of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub total_cycles: u32,
    pub max_cycles: u32,
    pub total_findings: usize,
    pub total_adaptations: usize,
    pub failed_adaptations: usize,
    pub halt: HaltStatus,
    /// Human-readable halt line, e.g. "completed 10/10 normally"
    pub halt_message: String,
    pub summaries: Vec<CycleSummary>,
    pub recommendations: Vec<Recommendation>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.halt.exit_code()
    }

    pub fn is_safety_stop(&self) -> bool {
        self.halt.is_safety_stop()
    }
}

/// Outcome of one subsystem in the smoke test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemCheck {
    pub subsystem: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmokeTestReport {
    pub checks: Vec<SubsystemCheck>,
}

impl SmokeTestReport {
    pub fn record(&mut self, subsystem: &str, outcome: anyhow::Result<String>) {
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(e) => (false, format!("{:#}", e)),
        };
        self.checks.push(SubsystemCheck {
            subsystem: subsystem.to_string(),
            passed,
            detail,
        });
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke_report_fails_on_any_failed_check() {
        let mut report = SmokeTestReport::default();
        report.record("registry", Ok("1 device".to_string()));
        assert!(report.all_passed());

        report.record("cache", Err(anyhow::anyhow!("locked")));
        assert!(!report.all_passed());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.checks[1].detail, "locked");
    }
}
