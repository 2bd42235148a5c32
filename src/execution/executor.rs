//! Single-target execution
//!
//! [`TargetExecutor::execute_target`] drives one target through plan
//! submission, progress monitoring and meridian flip waits, with bounded
//! retry under a [`RetryPolicy`]. Each attempt:
//!
//! 1. waits out the retry interval (attempts after the first)
//! 2. builds a fresh [`ImagingPlan`]
//! 3. stops whatever the observatory is doing (best effort)
//! 4. submits the plan and monitors it until it completes or fails
//!
//! Failures are classified into an [`ErrorKind`]; a kind outside the
//! policy's retryable set ends the target immediately.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry::{classify, ErrorKind, RetryPolicy, OBSERVATION_TIMEOUT, USER_INTERRUPTED};
use crate::acp::ObservatoryClient;
use crate::meridian::{MeridianFlipCalculator, MeridianStatus};
use crate::models::{ImagingDefaults, ImagingPlan, Target};
use crate::scheduler::clock::{pause, Checkpoint, Clock, InterruptSignal, WaitOutcome};
use crate::utils::{format_clock, format_duration};

/// Callback invoked with every monitoring snapshot
pub type StatusCallback = Arc<dyn Fn(&ObservationStatus) + Send + Sync>;

// ============================================================================
// Settings and results
// ============================================================================

/// Monitoring loop tuning
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,

    /// Extra time allowed past the plan's estimated duration before the
    /// observation is declared timed out; `None` waits indefinitely
    pub timeout: Option<Duration>,

    /// Settle time after stopping the previous operation
    pub stop_grace: Duration,

    /// Consecutive status-fetch failures that end monitoring
    pub max_status_failures: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: Some(Duration::from_secs(60 * 60)),
            stop_grace: Duration::from_secs(5),
            max_status_failures: 3,
        }
    }
}

/// Snapshot handed to status callbacks on every poll
#[derive(Debug, Clone, Serialize)]
pub struct ObservationStatus {
    pub target_name: String,
    pub attempt: u32,
    pub current_time: DateTime<Utc>,
    pub elapsed: Duration,
    pub estimated_duration: Duration,
    /// Elapsed time over estimated duration, clamped to `[0, 1]`
    pub progress: f64,
    pub is_completed: bool,
    pub has_error: bool,
    pub current_filter: Option<String>,
    pub error: Option<String>,
    pub meridian: MeridianStatus,
}

/// Per-call retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error_kind: Option<ErrorKind>,
    pub last_error_message: Option<String>,
}

impl RetryState {
    fn record(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.last_error_kind = Some(kind);
        self.last_error_message = Some(message.into());
    }
}

/// Result of [`TargetExecutor::execute_target`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Attempts actually started
    pub attempts: u32,
    pub last_error: Option<(ErrorKind, String)>,
}

impl ExecutionOutcome {
    fn succeeded(attempts: u32) -> Self {
        Self {
            success: true,
            attempts,
            last_error: None,
        }
    }

    fn failed(state: RetryState) -> Self {
        let last_error = state.last_error_kind.map(|kind| {
            (
                kind,
                state.last_error_message.unwrap_or_else(|| kind.to_string()),
            )
        });
        Self {
            success: false,
            attempts: state.attempt,
            last_error,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(|(kind, _)| *kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|(_, msg)| msg.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MonitorOutcome {
    Completed,
    Failed(String),
}

// ============================================================================
// Executor
// ============================================================================

pub struct TargetExecutor {
    client: Arc<dyn ObservatoryClient>,
    meridian: MeridianFlipCalculator,
    clock: Arc<dyn Clock>,
    signal: InterruptSignal,
    settings: MonitorSettings,
    callbacks: Vec<StatusCallback>,
}

impl TargetExecutor {
    pub fn new(
        client: Arc<dyn ObservatoryClient>,
        meridian: MeridianFlipCalculator,
        clock: Arc<dyn Clock>,
        signal: InterruptSignal,
    ) -> Self {
        Self {
            client,
            meridian,
            clock,
            signal,
            settings: MonitorSettings::default(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn add_status_callback(&mut self, callback: StatusCallback) {
        self.callbacks.push(callback);
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn meridian(&self) -> &MeridianFlipCalculator {
        &self.meridian
    }

    /// Run one target to completion or final failure
    pub async fn execute_target(
        &self,
        target: &Target,
        defaults: &ImagingDefaults,
        policy: &RetryPolicy,
    ) -> ExecutionOutcome {
        let max_attempts = policy.effective_attempts();
        let mut state = RetryState::default();
        let mut checkpoint = self.signal.checkpoint();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                info!(
                    target = %target.name,
                    attempt,
                    max_attempts,
                    delay = %format_duration(chrono::Duration::seconds(policy.interval_seconds as i64)),
                    "Retrying target after delay"
                );
                let outcome = pause(self.clock.as_ref(), &mut checkpoint, policy.interval()).await;
                if outcome == WaitOutcome::Interrupted {
                    info!(target = %target.name, "Retry delay interrupted");
                    state.record(ErrorKind::UserInterrupted, USER_INTERRUPTED);
                    break;
                }
            }
            state.attempt = attempt;

            let failure = match self.attempt(target, defaults, attempt, &mut checkpoint).await {
                MonitorOutcome::Completed => {
                    info!(target = %target.name, attempt, "Target completed");
                    return ExecutionOutcome::succeeded(attempt);
                }
                MonitorOutcome::Failed(message) => message,
            };

            let kind = classify(&failure);
            state.record(kind, failure.as_str());
            warn!(
                target = %target.name,
                attempt,
                kind = %kind,
                error = %failure,
                "Target attempt failed"
            );

            if !policy.is_retryable(kind) {
                info!(target = %target.name, kind = %kind, "Error is not retryable, giving up");
                break;
            }
            if attempt == max_attempts {
                error!(target = %target.name, attempts = attempt, "Retry attempts exhausted");
            }
        }

        ExecutionOutcome::failed(state)
    }

    /// One submission plus monitoring
    async fn attempt(
        &self,
        target: &Target,
        defaults: &ImagingDefaults,
        attempt: u32,
        checkpoint: &mut Checkpoint,
    ) -> MonitorOutcome {
        if checkpoint.is_interrupted() {
            return MonitorOutcome::Failed(USER_INTERRUPTED.to_string());
        }

        match self.meridian.resolve_meridian_time(target, self.clock.now()) {
            Ok(meridian) => info!(
                target = %target.name,
                meridian = %format_clock(&meridian),
                manual = target.meridian_time.is_some(),
                "Meridian crossing"
            ),
            Err(e) => warn!(target = %target.name, error = %e, "Cannot resolve meridian time"),
        }

        let plan = target.imaging_plan(defaults);
        info!(
            target = %plan.target,
            attempt,
            ra = %plan.ra,
            dec = %plan.dec,
            filters = %plan.filter_summary(),
            estimated = %format_duration(
                chrono::Duration::from_std(plan.estimated_duration()).unwrap_or_else(|_| chrono::Duration::zero())
            ),
            "Starting imaging plan"
        );

        let grace = self.settings.stop_grace;
        match self.client.stop_current_operation(grace).await {
            Ok(true) => {
                debug!(grace_secs = grace.as_secs(), "Previous operation stopped");
                if !grace.is_zero()
                    && pause(self.clock.as_ref(), checkpoint, grace).await == WaitOutcome::Interrupted
                {
                    info!(target = %target.name, "Stop grace interrupted");
                    return MonitorOutcome::Failed(USER_INTERRUPTED.to_string());
                }
            }
            Ok(false) => debug!("Stop request not acknowledged"),
            Err(e) => warn!(error = %e, "Failed to stop previous operation, continuing"),
        }

        if let Err(e) = self.client.submit_plan(&plan).await {
            return MonitorOutcome::Failed(e.to_string());
        }

        self.monitor(target, &plan, attempt, checkpoint).await
    }

    /// Poll the observatory until the plan finishes, fails or is interrupted
    async fn monitor(
        &self,
        target: &Target,
        plan: &ImagingPlan,
        attempt: u32,
        checkpoint: &mut Checkpoint,
    ) -> MonitorOutcome {
        let started = self.clock.now();
        let estimated = plan.estimated_duration();
        let deadline = self.settings.timeout.map(|grace| estimated.saturating_add(grace));
        let mut status_failures = 0u32;

        loop {
            if checkpoint.is_interrupted() {
                info!(target = %target.name, "Monitoring interrupted");
                return MonitorOutcome::Failed(USER_INTERRUPTED.to_string());
            }

            let now = self.clock.now();
            let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
            if deadline.is_some_and(|limit| elapsed >= limit) {
                warn!(
                    target = %target.name,
                    elapsed_secs = elapsed.as_secs(),
                    "Observation timed out"
                );
                return MonitorOutcome::Failed(OBSERVATION_TIMEOUT.to_string());
            }

            match self.client.get_status().await {
                Err(e) => {
                    status_failures += 1;
                    warn!(
                        target = %target.name,
                        failures = status_failures,
                        error = %e,
                        "Status check failed"
                    );
                    if status_failures >= self.settings.max_status_failures.max(1) {
                        return MonitorOutcome::Failed(format!("status check failed: {e}"));
                    }
                }
                Ok(snapshot) => {
                    status_failures = 0;
                    let meridian = self.meridian.check_needed(target, now);
                    let status = ObservationStatus {
                        target_name: target.name.clone(),
                        attempt,
                        current_time: now,
                        elapsed,
                        estimated_duration: estimated,
                        progress: progress(elapsed, estimated),
                        is_completed: !snapshot.is_running && snapshot.error.is_none(),
                        has_error: snapshot.error.is_some(),
                        current_filter: snapshot.current_filter.clone(),
                        error: snapshot.error.clone(),
                        meridian,
                    };
                    debug!(
                        target = %target.name,
                        progress = %format!("{:.0}%", status.progress * 100.0),
                        filter = ?status.current_filter,
                        meridian = %status.meridian.phase,
                        "Observation status"
                    );
                    self.notify(&status);

                    if status.meridian.wait_needed {
                        info!(target = %target.name, message = %status.meridian.message, "Meridian flip wait");
                        let finished = self
                            .meridian
                            .wait_for_flip(target, self.clock.as_ref(), checkpoint)
                            .await;
                        if !finished {
                            return MonitorOutcome::Failed(USER_INTERRUPTED.to_string());
                        }
                    } else if let Some(err) = snapshot.error {
                        return MonitorOutcome::Failed(err);
                    } else if !snapshot.is_running {
                        return MonitorOutcome::Completed;
                    }
                }
            }

            if pause(self.clock.as_ref(), checkpoint, self.settings.poll_interval).await
                == WaitOutcome::Interrupted
            {
                info!(target = %target.name, "Monitoring interrupted");
                return MonitorOutcome::Failed(USER_INTERRUPTED.to_string());
            }
        }
    }

    fn notify(&self, status: &ObservationStatus) {
        for callback in &self.callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                error!(target = %status.target_name, "Status callback panicked");
            }
        }
    }
}

fn progress(elapsed: Duration, estimated: Duration) -> f64 {
    if estimated.is_zero() {
        return 0.0;
    }
    (elapsed.as_secs_f64() / estimated.as_secs_f64()).clamp(0.0, 1.0)
}
