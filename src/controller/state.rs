//! Loop state machine and per-run state

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::log_debug;
use crate::models::{AdaptationResult, CycleSummary, Finding};

/// `Idle -> Researching -> Adapting -> Verifying -> Logging -> {Researching | Halted}`
///
/// Empty or failed research skips Adapting; a cancelled cycle skips straight
/// to Logging. Any state may halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Researching,
    Adapting,
    Verifying,
    Logging,
    Halted,
}

impl LoopState {
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (Halted, _) => false,
            (_, Halted) => true,
            (Idle, Researching)
            | (Researching, Adapting)
            | (Researching, Verifying)
            | (Adapting, Verifying)
            | (Verifying, Logging)
            | (Researching, Logging)
            | (Adapting, Logging)
            | (Logging, Researching) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Researching => "researching",
            LoopState::Adapting => "adapting",
            LoopState::Verifying => "verifying",
            LoopState::Logging => "logging",
            LoopState::Halted => "halted",
        };
        f.write_str(name)
    }
}

/// Everything a run accumulates; owned by the controller and threaded
/// through the stages
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub state: LoopState,
    pub summaries: Vec<CycleSummary>,
    /// Findings recorded but below the adaptation threshold
    pub deferred: Vec<Finding>,
    pub failed_adaptations: Vec<AdaptationResult>,
    pub total_findings: usize,
    pub total_adaptations: usize,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.6fZ")),
            state: LoopState::Idle,
            summaries: Vec::new(),
            deferred: Vec::new(),
            failed_adaptations: Vec::new(),
            total_findings: 0,
            total_adaptations: 0,
            started_at,
        }
    }

    pub fn transition(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal loop transition {} -> {}",
            self.state,
            next
        );
        log_debug!("Loop state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Fold one finished cycle into the run; summaries stay in cycle order
    pub fn record_cycle(&mut self, summary: CycleSummary, findings: Vec<Finding>, adaptations: Vec<AdaptationResult>) {
        debug_assert!(
            self.summaries
                .last()
                .is_none_or(|last| last.cycle_number < summary.cycle_number)
        );
        self.total_findings += findings.len();
        self.total_adaptations += adaptations.iter().filter(|a| a.success).count();
        self.deferred
            .extend(findings.into_iter().filter(|f| !f.is_actionable()));
        self.failed_adaptations
            .extend(adaptations.into_iter().filter(|a| !a.success));
        self.summaries.push(summary);
    }

    pub fn cycles_completed(&self) -> u32 {
        self.summaries.len() as u32
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_productive_cycle_path_is_legal() {
        use LoopState::*;
        let path = [Idle, Researching, Adapting, Verifying, Logging, Researching];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Researching.can_transition_to(Verifying));
    }

    #[test]
    fn test_halted_is_terminal() {
        assert!(LoopState::Logging.can_transition_to(LoopState::Halted));
        assert!(!LoopState::Halted.can_transition_to(LoopState::Researching));
        assert!(!LoopState::Adapting.can_transition_to(LoopState::Researching));
        assert!(!LoopState::Verifying.can_transition_to(LoopState::Adapting));
    }
}
