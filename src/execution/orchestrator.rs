//! Schedule loop
//!
//! Walks a [`TargetScheduleQueue`] in start-time order until every target is
//! handled, the global stop time passes or the run is terminated. Targets
//! are waited for, skipped when stale, and otherwise handed to the
//! [`TargetExecutor`] one at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::executor::{ExecutionOutcome, MonitorSettings, StatusCallback, TargetExecutor};
use super::retry::{ErrorKind, RetryPolicy};
use crate::acp::ObservatoryClient;
use crate::error::{Error, Result};
use crate::meridian::MeridianFlipCalculator;
use crate::models::{ImagingDefaults, Target, TargetStatus};
use crate::scheduler::clock::{pause, Clock, InterruptSignal, WaitOutcome};
use crate::scheduler::queue::STALE_AFTER_MINUTES;
use crate::scheduler::TargetScheduleQueue;
use crate::utils::{format_clock, format_duration};

/// Observer invoked on every target status change
pub type TransitionObserver = Arc<dyn Fn(&TargetTransition) + Send + Sync>;

/// Run-wide settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub imaging: ImagingDefaults,
    pub retry: RetryPolicy,
    pub global_stop_time: Option<DateTime<Utc>>,
    /// Longest single sleep while waiting for a start time
    pub wait_step: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            imaging: ImagingDefaults::default(),
            retry: RetryPolicy::default(),
            global_stop_time: None,
            wait_step: Duration::from_secs(30),
        }
    }
}

/// One status change of one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetTransition {
    pub target_name: String,
    pub from: TargetStatus,
    pub to: TargetStatus,
    pub at: DateTime<Utc>,
}

/// Final record for one processed target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    pub target_name: String,
    pub status: TargetStatus,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub attempts: u32,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub completed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub results: Vec<TargetResult>,
    /// The run was terminated before the queue was exhausted
    pub terminated_early: bool,
}

impl RunSummary {
    fn record_skipped(&mut self, target: &Target, reason: &str) {
        self.skipped_count += 1;
        self.results.push(TargetResult {
            target_name: target.name.clone(),
            status: TargetStatus::Skipped,
            success: false,
            error: Some(reason.to_string()),
            error_kind: None,
            attempts: 0,
        });
    }

    fn record_outcome(&mut self, target: &Target, outcome: &ExecutionOutcome) {
        let status = if outcome.success {
            self.completed_count += 1;
            TargetStatus::Completed
        } else {
            self.failed_count += 1;
            TargetStatus::Failed
        };
        self.results.push(TargetResult {
            target_name: target.name.clone(),
            status,
            success: outcome.success,
            error: outcome.error_message().map(str::to_string),
            error_kind: outcome.error_kind(),
            attempts: outcome.attempts,
        });
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// Multi-line report for the terminal
    pub fn display(&self) -> String {
        let mut out = format!(
            "Run summary: {} completed, {} failed, {} skipped",
            self.completed_count, self.failed_count, self.skipped_count
        );
        if self.terminated_early {
            out.push_str(" (terminated early)");
        }
        for result in &self.results {
            out.push_str(&format!("\n  {:<20} {:<10}", result.target_name, result.status.as_str()));
            if result.attempts > 0 {
                out.push_str(&format!(" attempts={}", result.attempts));
            }
            if let Some(err) = &result.error {
                out.push_str(&format!(" {err}"));
            }
        }
        out
    }
}

pub struct ObservationOrchestrator {
    client: Arc<dyn ObservatoryClient>,
    executor: TargetExecutor,
    clock: Arc<dyn Clock>,
    signal: InterruptSignal,
    observers: Vec<TransitionObserver>,
}

impl ObservationOrchestrator {
    pub fn new(
        client: Arc<dyn ObservatoryClient>,
        meridian: MeridianFlipCalculator,
        clock: Arc<dyn Clock>,
        signal: InterruptSignal,
    ) -> Self {
        let executor = TargetExecutor::new(
            Arc::clone(&client),
            meridian,
            Arc::clone(&clock),
            signal.clone(),
        );
        Self {
            client,
            executor,
            clock,
            signal,
            observers: Vec::new(),
        }
    }

    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.executor = self.executor.with_settings(settings);
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.executor.add_status_callback(callback);
        self
    }

    pub fn with_transition_observer(mut self, observer: TransitionObserver) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn executor(&self) -> &TargetExecutor {
        &self.executor
    }

    pub fn signal(&self) -> &InterruptSignal {
        &self.signal
    }

    /// Process the queue until it is exhausted, the stop time passes or the
    /// run is terminated
    ///
    /// Fails only when there is nothing to do or the observatory cannot be
    /// reached; per-target failures end up in the summary.
    pub async fn run(
        &self,
        queue: &mut TargetScheduleQueue,
        settings: &RunSettings,
    ) -> Result<RunSummary> {
        if queue.is_empty() {
            return Err(Error::EmptyQueue);
        }

        info!(
            observatory = self.client.name(),
            targets = queue.len(),
            simulated = self.clock.is_simulated(),
            stop_time = ?settings.global_stop_time.as_ref().map(format_clock),
            "Starting observation run"
        );

        if let Err(e) = self.client.connect().await {
            error!(error = %e, "Failed to connect to observatory");
            return Err(Error::ConnectionFailed(e));
        }

        if let Err(e) = queue.begin_run() {
            self.client.disconnect().await;
            return Err(e.into());
        }

        let mut summary = RunSummary::default();
        self.process(queue, settings, &mut summary).await;

        queue.end_run();
        self.client.disconnect().await;

        info!(
            completed = summary.completed_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            terminated_early = summary.terminated_early,
            "Observation run finished"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        queue: &mut TargetScheduleQueue,
        settings: &RunSettings,
        summary: &mut RunSummary,
    ) {
        let stop = settings.global_stop_time;

        loop {
            if self.signal.is_terminated() {
                warn!("Run terminated by user");
                summary.terminated_early = queue.has_pending();
                break;
            }

            let now = self.clock.now();
            if stop.is_some_and(|stop| now >= stop) {
                info!("Global stop time reached");
                break;
            }

            let Some(next) = queue.next_pending_index() else {
                info!("All targets processed");
                break;
            };

            let index = match queue.next_due_index(now) {
                Some(index) => index,
                None => {
                    let Some(target) = queue.get(next).cloned() else {
                        break;
                    };
                    if stop.is_some_and(|stop| target.start_time >= stop) {
                        info!(
                            target = %target.name,
                            start = %format_clock(&target.start_time),
                            "Next target starts after the global stop time"
                        );
                        break;
                    }

                    let deadline = stop.map_or(target.start_time, |s| s.min(target.start_time));
                    match self.wait_for_start(&target, deadline, settings.wait_step).await {
                        WaitOutcome::Elapsed => continue,
                        WaitOutcome::Interrupted if self.signal.is_terminated() => continue,
                        WaitOutcome::Interrupted => {
                            info!(target = %target.name, "Wait interrupted, starting target now");
                            next
                        }
                    }
                }
            };

            self.handle_target(queue, index, settings, summary).await;
        }
    }

    async fn handle_target(
        &self,
        queue: &mut TargetScheduleQueue,
        index: usize,
        settings: &RunSettings,
        summary: &mut RunSummary,
    ) {
        let Some(target) = queue.get(index).cloned() else {
            return;
        };

        let now = self.clock.now();
        if TargetScheduleQueue::should_skip(&target, now, settings.global_stop_time) {
            let reason = if settings
                .global_stop_time
                .is_some_and(|stop| target.start_time >= stop)
            {
                "starts after the global stop time".to_string()
            } else {
                format!("more than {STALE_AFTER_MINUTES} minutes past its start time")
            };
            warn!(target = %target.name, reason = %reason, "Skipping target");
            self.transition(queue, index, TargetStatus::Skipped);
            summary.record_skipped(&target, &reason);
            return;
        }

        info!(
            target = %target.name,
            position = index + 1,
            total = queue.len(),
            priority = target.priority,
            "Executing target"
        );
        self.transition(queue, index, TargetStatus::Running);

        let outcome = self
            .executor
            .execute_target(&target, &settings.imaging, &settings.retry)
            .await;

        let status = if outcome.success {
            TargetStatus::Completed
        } else {
            TargetStatus::Failed
        };
        self.transition(queue, index, status);
        summary.record_outcome(&target, &outcome);
    }

    /// Sleep until `deadline`, logging a countdown at every step
    async fn wait_for_start(
        &self,
        target: &Target,
        deadline: DateTime<Utc>,
        step: Duration,
    ) -> WaitOutcome {
        let mut checkpoint = self.signal.checkpoint();
        info!(
            target = %target.name,
            start = %format_clock(&target.start_time),
            "Waiting for next target"
        );

        loop {
            let now = self.clock.now();
            if now >= deadline {
                return WaitOutcome::Elapsed;
            }

            debug!(
                target = %target.name,
                remaining = %format_duration(deadline - now),
                "Countdown"
            );
            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            let chunk = remaining.min(step).max(Duration::from_millis(1));
            if pause(self.clock.as_ref(), &mut checkpoint, chunk).await == WaitOutcome::Interrupted {
                return WaitOutcome::Interrupted;
            }
        }
    }

    fn transition(&self, queue: &mut TargetScheduleQueue, index: usize, to: TargetStatus) {
        let Some((name, from)) = queue.get(index).map(|t| (t.name.clone(), t.status)) else {
            return;
        };

        if let Err(e) = queue.set_status(index, to) {
            error!(target = %name, error = %e, "Rejected status change");
            return;
        }

        let change = TargetTransition {
            target_name: name,
            from,
            to,
            at: self.clock.now(),
        };
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&change))).is_err() {
                error!(target = %change.target_name, "Transition observer panicked");
            }
        }
    }
}
