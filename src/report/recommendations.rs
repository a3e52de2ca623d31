//! Run recommendations
//!
//! Generates operator advice from what a run deferred, what failed and why
//! it stopped

use serde::{Deserialize, Serialize};

use crate::models::{AdaptationResult, CycleSummary, Finding, HaltStatus};

/// Priority level for recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
            Priority::Info => "INFO",
        }
    }
}

/// A single recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub description: String,
    /// Features, cycles or devices the advice refers to
    pub affected: Vec<String>,
}

/// Build recommendations for a finished run, most urgent first
pub fn build_recommendations(
    summaries: &[CycleSummary],
    deferred: &[Finding],
    failed: &[AdaptationResult],
    halt: &HaltStatus,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    match halt {
        HaltStatus::CriticalError { cycle, reason } | HaltStatus::SafetyCheckFailed { cycle, reason } => {
            recommendations.push(Recommendation {
                priority: Priority::Critical,
                category: "Safety".to_string(),
                title: "Run halted by safety stop".to_string(),
                description: format!(
                    "The loop stopped at cycle {}: {}. Resolve the cause before restarting.",
                    cycle, reason
                ),
                affected: vec![format!("cycle {}", cycle)],
            });
        }
        HaltStatus::Cancelled { cycle } => {
            recommendations.push(Recommendation {
                priority: Priority::Info,
                category: "Safety".to_string(),
                title: "Run cancelled".to_string(),
                description: format!("The run was cancelled after cycle {}.", cycle),
                affected: Vec::new(),
            });
        }
        HaltStatus::Completed { .. } => {}
    }

    if !failed.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: "Adaptation".to_string(),
            title: "Adaptations failed".to_string(),
            description: format!(
                "{} adaptation(s) were not accepted. Check the device-management side and retry.",
                failed.len()
            ),
            affected: failed.iter().map(|r| r.finding.feature.clone()).collect(),
        });
    }

    let failing_cycles: Vec<String> = summaries
        .iter()
        .filter_map(|s| {
            s.failure
                .as_ref()
                .map(|f| format!("cycle {} ({})", s.cycle_number, f.stage))
        })
        .collect();
    if !failing_cycles.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            category: "Reliability".to_string(),
            title: "Recoverable cycle failures".to_string(),
            description: format!(
                "{} cycle(s) absorbed a stage failure. Review the log for storage or probe configuration problems.",
                failing_cycles.len()
            ),
            affected: failing_cycles,
        });
    }

    let empty_cycles = summaries
        .iter()
        .filter(|s| s.findings_count == 0 && s.failure.is_none())
        .count();
    if empty_cycles > 0 {
        let widened = summaries.iter().filter(|s| s.scope_expanded).count();
        recommendations.push(Recommendation {
            priority: Priority::Low,
            category: "Discovery".to_string(),
            title: "Empty research cycles".to_string(),
            description: format!(
                "{} cycle(s) produced no findings; the sweep scope was widened {} time(s). \
                 Consider setting NEXUS_SCAN_SUBNET or NEXUS_SNMP_COMMUNITIES explicitly.",
                empty_cycles, widened
            ),
            affected: Vec::new(),
        });
    }

    if !deferred.is_empty() {
        let mut features: Vec<String> = deferred.iter().map(|f| f.feature.clone()).collect();
        features.sort();
        features.dedup();
        recommendations.push(Recommendation {
            priority: Priority::Low,
            category: "Research".to_string(),
            title: "Deferred research topics".to_string(),
            description: "These topics scored below the adaptation threshold and were only recorded.".to_string(),
            affected: features,
        });
    }

    if recommendations.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::Info,
            category: "General".to_string(),
            title: "No action required".to_string(),
            description: "The run completed without failures or deferred work.".to_string(),
            affected: Vec::new(),
        });
    }

    recommendations.sort_by_key(|r| r.priority);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FindingKind;

    #[test]
    fn test_safety_stop_comes_first() {
        let finding = Finding::new(FindingKind::CdpDiscovery, "cdp_integration", "cdp", 7, serde_json::Value::Null);
        let failed = vec![AdaptationResult::failed(&finding, "rejected")];
        let halt = HaltStatus::CriticalError {
            cycle: 3,
            reason: "safety switch tripped".to_string(),
        };

        let recs = build_recommendations(&[], &[], &failed, &halt);
        assert_eq!(recs[0].priority, Priority::Critical);
        assert_eq!(recs[1].affected, vec!["cdp_integration".to_string()]);
    }

    #[test]
    fn test_clean_run_gets_info_only() {
        let halt = HaltStatus::Completed {
            cycles: 1,
            max_cycles: 1,
        };
        let recs = build_recommendations(&[], &[], &[], &halt);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Priority::Info);
    }

    #[test]
    fn test_deferred_features_are_deduplicated() {
        let low = Finding::new(FindingKind::TechnologyTrend, "iot_integration", "iot", 5, serde_json::Value::Null);
        let halt = HaltStatus::Completed {
            cycles: 2,
            max_cycles: 2,
        };
        let recs = build_recommendations(&[], &[low.clone(), low], &[], &halt);
        assert_eq!(recs[0].affected, vec!["iot_integration".to_string()]);
    }
}
