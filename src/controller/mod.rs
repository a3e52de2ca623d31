//! Cycle controller
//!
//! Drives the bounded Research -> Adapt -> Verify -> Log loop. Cycles are
//! strictly sequential. Stage errors are absorbed as recoverable failures,
//! except an error from Verify itself, which halts the run. The halt decision
//! is made on data: `critical_errors > 0` in the verify report.

mod pacer;
mod smoke;
mod state;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::adapt::AdaptationEngine;
use crate::config::{LoopSettings, device_stale_minutes};
use crate::database::{Database, queries};
use crate::models::{CycleFailure, CycleStage, CycleSummary, HaltStatus, VerifyReport};
use crate::registry::DeviceRegistry;
use crate::report::{RunReport, build_recommendations};
use crate::research::ResearchStage;
use crate::verify::{VerifyInput, VerifyStage};
use crate::{log_debug, log_error, log_stderr, log_warn};

pub use pacer::{CancelHandle, Pacer, RecordingPacer, TokioPacer};
pub use smoke::smoke_test;
pub use state::{LoopState, RunState};

pub struct CycleController {
    research: Arc<dyn ResearchStage>,
    adaptation: AdaptationEngine,
    verifier: Arc<dyn VerifyStage>,
    registry: Arc<dyn DeviceRegistry>,
    pacer: Arc<dyn Pacer>,
    cancel: CancelHandle,
    summary_sink: Option<Database>,
    stale_after: chrono::Duration,
}

/// How one cycle ended, before the loop decides what comes next
enum CycleOutcome {
    Continue { empty: bool },
    Halt(HaltStatus),
}

impl CycleController {
    pub fn new(
        research: Arc<dyn ResearchStage>,
        adaptation: AdaptationEngine,
        verifier: Arc<dyn VerifyStage>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            research,
            adaptation,
            verifier,
            registry,
            pacer: Arc::new(TokioPacer),
            cancel: CancelHandle::new(),
            summary_sink: None,
            stale_after: chrono::Duration::minutes(device_stale_minutes()),
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Append every cycle summary to `cycle_summaries`
    pub fn with_summary_sink(mut self, db: Database) -> Self {
        self.summary_sink = Some(db);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run up to `settings.max_cycles` cycles and report why the run stopped
    pub async fn run(&self, settings: &LoopSettings) -> RunReport {
        let mut run = RunState::new();
        let max_cycles = settings.max_cycles;

        log_stderr!(
            "Starting research run {} ({} cycles, {:?} delay, {:?} empty-cycle delay)",
            run.run_id,
            max_cycles,
            settings.cycle_delay,
            settings.empty_cycle_delay
        );

        let mut halt = None;
        for cycle in 1..=max_cycles {
            if self.cancel.is_cancelled() {
                halt = Some(HaltStatus::Cancelled { cycle: cycle - 1 });
                break;
            }

            let empty = match self.run_cycle(&mut run, cycle, max_cycles, settings).await {
                CycleOutcome::Continue { empty } => empty,
                CycleOutcome::Halt(status) => {
                    halt = Some(status);
                    break;
                }
            };

            if cycle == max_cycles {
                break;
            }
            let delay = next_delay(settings, empty);
            if !self.pacer.pause(delay, &self.cancel).await {
                halt = Some(HaltStatus::Cancelled { cycle });
                break;
            }
            run.transition(LoopState::Researching);
        }

        let halt = halt.unwrap_or(HaltStatus::Completed {
            cycles: run.cycles_completed(),
            max_cycles,
        });
        run.transition(LoopState::Halted);

        if halt.is_safety_stop() {
            log_error!("Research run {}", halt);
        } else {
            log_stderr!("Research run {}", halt);
        }

        finish_report(run, halt, max_cycles)
    }

    async fn run_cycle(
        &self,
        run: &mut RunState,
        cycle: u32,
        max_cycles: u32,
        settings: &LoopSettings,
    ) -> CycleOutcome {
        let started_at = Utc::now();
        if run.state == LoopState::Idle {
            run.transition(LoopState::Researching);
        }
        log_debug!("Cycle {}/{} researching", cycle, max_cycles);

        let mut failure = None;
        let findings = match self.research.research().await {
            Ok(findings) => findings,
            Err(e) => {
                log_error!("Cycle {} research stage failed: {:#}", cycle, e);
                failure = Some(CycleFailure {
                    stage: CycleStage::Research,
                    message: format!("{:#}", e),
                });
                Vec::new()
            }
        };

        let empty = findings.is_empty();
        let mut scope_expanded = false;
        if empty && failure.is_none() {
            scope_expanded = self.research.expand_scope();
        }

        let mut cancelled = self.cancel.is_cancelled();
        let adaptations = if !empty && !cancelled {
            run.transition(LoopState::Adapting);
            self.adaptation.adapt(&findings).await
        } else {
            Vec::new()
        };
        cancelled = cancelled || self.cancel.is_cancelled();

        let verify = if cancelled {
            Ok(VerifyReport::default())
        } else {
            run.transition(LoopState::Verifying);
            self.verifier
                .verify(VerifyInput {
                    cycle,
                    findings: &findings,
                    adaptations: &adaptations,
                    failure: failure.as_ref(),
                })
                .await
        };

        let (report, verify_error) = match verify {
            Ok(report) => (report, None),
            Err(e) => {
                let message = format!("{:#}", e);
                log_error!("Cycle {} safety check failed: {}", cycle, message);
                failure = Some(CycleFailure {
                    stage: CycleStage::Verify,
                    message: message.clone(),
                });
                (VerifyReport::default(), Some(message))
            }
        };

        run.transition(LoopState::Logging);

        let halting = cancelled || verify_error.is_some() || report.critical_errors > 0;
        let next_delay_ms = (!halting && cycle < max_cycles)
            .then(|| next_delay(settings, empty).as_millis() as u64);

        let succeeded = adaptations.iter().filter(|a| a.success).count();
        let summary = CycleSummary {
            cycle_number: cycle,
            findings_count: findings.len(),
            adaptations_count: succeeded,
            adaptations_failed: adaptations.len() - succeeded,
            tests_passed: report.tests_passed,
            tests_failed: report.tests_failed,
            errors_fixed: report.errors_fixed,
            critical_errors: report.critical_errors,
            scope_expanded,
            failure,
            next_delay_ms,
            started_at,
            ended_at: Utc::now(),
        };

        self.log_cycle(&run.run_id, &summary, max_cycles);
        run.record_cycle(summary, findings, adaptations);

        if let Some(reason) = verify_error {
            return CycleOutcome::Halt(HaltStatus::SafetyCheckFailed { cycle, reason });
        }
        if report.critical_errors > 0 {
            let reason = if report.notes.is_empty() {
                format!("{} critical errors reported by verify", report.critical_errors)
            } else {
                report.notes.join("; ")
            };
            return CycleOutcome::Halt(HaltStatus::CriticalError { cycle, reason });
        }
        if cancelled {
            return CycleOutcome::Halt(HaltStatus::Cancelled { cycle });
        }

        // a failed research stage left `findings` empty, so it backs off too
        CycleOutcome::Continue { empty }
    }

    /// The Logging stage: structured line, persistence, staleness sweep
    fn log_cycle(&self, run_id: &str, summary: &CycleSummary, max_cycles: u32) {
        log_stderr!(
            cycle = summary.cycle_number,
            findings = summary.findings_count,
            adaptations = summary.adaptations_count,
            adaptations_failed = summary.adaptations_failed,
            tests_passed = summary.tests_passed,
            tests_failed = summary.tests_failed,
            critical_errors = summary.critical_errors,
            "Cycle {}/{} complete",
            summary.cycle_number,
            max_cycles
        );
        if let Some(failure) = &summary.failure {
            log_warn!(
                "Cycle {} absorbed {} stage failure: {}",
                summary.cycle_number,
                failure.stage,
                failure.message
            );
        }

        if let Some(db) = &self.summary_sink {
            let persisted = db
                .lock()
                .and_then(|conn| queries::insert_cycle_summary(&conn, run_id, summary));
            if let Err(e) = persisted {
                log_warn!("Cycle {} summary not persisted: {:#}", summary.cycle_number, e);
            }
        }

        match self.registry.mark_stale(Utc::now() - self.stale_after) {
            Ok(0) => {}
            Ok(count) => log_stderr!("{} devices marked stale", count),
            Err(e) => log_warn!("Stale-device sweep failed: {:#}", e),
        }
    }
}

fn next_delay(settings: &LoopSettings, empty: bool) -> Duration {
    if empty {
        settings.empty_cycle_delay
    } else {
        settings.cycle_delay
    }
}

fn finish_report(run: RunState, halt: HaltStatus, max_cycles: u32) -> RunReport {
    let recommendations = build_recommendations(
        &run.summaries,
        &run.deferred,
        &run.failed_adaptations,
        &halt,
    );

    RunReport {
        total_cycles: run.cycles_completed(),
        max_cycles,
        total_findings: run.total_findings,
        total_adaptations: run.total_adaptations,
        failed_adaptations: run.failed_adaptations.len(),
        halt_message: halt.to_string(),
        halt,
        summaries: run.summaries,
        recommendations,
        started_at: run.started_at,
        ended_at: Utc::now(),
        run_id: run.run_id,
    }
}
