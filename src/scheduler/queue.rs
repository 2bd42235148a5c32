//! Target schedule queue
//!
//! Ordered collection of observation targets. The queue is kept sorted by
//! `(start_time, priority)` after every mutation, status changes only move
//! forward, and at most one target is `Running` at a time.
//!
//! The queue can be saved to and loaded from a JSON list of records between
//! runs; mid-execution state is not persisted.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::error::{ScheduleError, ScheduleResult};
use crate::models::{ImagingDefaults, ImagingPlan, Target, TargetStatus};
use crate::utils::{format_timestamp, parse_timestamp, CLOCK_FORMAT};

/// A target more than this many minutes late is skipped instead of started
pub const STALE_AFTER_MINUTES: i64 = 60;

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TargetScheduleQueue {
    targets: Vec<Target>,
    current_index: Option<usize>,
    running: bool,
}

impl TargetScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let mut queue = Self::new();
        for target in targets {
            queue.add(target);
        }
        queue
    }

    /// Insert a target and restore `(start_time, priority)` order
    ///
    /// The sort is stable, so targets with equal keys keep insertion order.
    pub fn add(&mut self, target: Target) {
        debug!(
            target = %target.name,
            start_time = %format_timestamp(&target.start_time),
            priority = target.priority,
            "Adding target to queue"
        );
        self.targets.push(target);
        self.targets.sort_by_key(Target::order_key);
        self.current_index = None;
    }

    /// Remove the target at `index`; false if out of range or during a run
    pub fn remove(&mut self, index: usize) -> bool {
        if self.running {
            warn!(index, "Cannot remove targets while a run is active");
            return false;
        }
        if index >= self.targets.len() {
            return false;
        }
        let removed = self.targets.remove(index);
        debug!(target = %removed.name, "Removed target from queue");
        self.current_index = None;
        true
    }

    /// Empty the queue; ignored during a run
    pub fn clear(&mut self) {
        if self.running {
            warn!("Cannot clear the queue while a run is active");
            return;
        }
        self.targets.clear();
        self.current_index = None;
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Index of the target most recently marked `Running`
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Index of the earliest waiting target whose start time has come
    pub fn next_due_index(&self, now: DateTime<Utc>) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.status == TargetStatus::Waiting && t.start_time <= now)
    }

    pub fn next_due_at(&self, now: DateTime<Utc>) -> Option<&Target> {
        self.next_due_index(now).map(|i| &self.targets[i])
    }

    /// Index of the earliest waiting target regardless of time
    pub fn next_pending_index(&self) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.status == TargetStatus::Waiting)
    }

    pub fn next_pending(&self) -> Option<&Target> {
        self.next_pending_index().map(|i| &self.targets[i])
    }

    pub fn has_pending(&self) -> bool {
        self.next_pending_index().is_some()
    }

    /// A target is skipped when it is over an hour late or would start at
    /// or after the global stop time
    pub fn should_skip(
        target: &Target,
        now: DateTime<Utc>,
        global_stop_time: Option<DateTime<Utc>>,
    ) -> bool {
        if now > target.start_time + ChronoDuration::minutes(STALE_AFTER_MINUTES) {
            return true;
        }
        global_stop_time.is_some_and(|stop| target.start_time >= stop)
    }

    // ------------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------------

    /// Change the status at `index`, enforcing forward-only transitions
    pub fn set_status(&mut self, index: usize, status: TargetStatus) -> ScheduleResult<()> {
        let len = self.targets.len();
        let current = self
            .targets
            .get(index)
            .ok_or(ScheduleError::IndexOutOfRange { index, len })?;

        if !current.status.can_transition_to(status) {
            return Err(ScheduleError::invalid_transition(
                &current.name,
                current.status,
                status,
            ));
        }

        if status == TargetStatus::Running {
            if let Some(running) = self
                .targets
                .iter()
                .find(|t| t.status == TargetStatus::Running)
            {
                return Err(ScheduleError::AlreadyRunning {
                    running: running.name.clone(),
                    requested: current.name.clone(),
                });
            }
            self.current_index = Some(index);
        }

        let target = &mut self.targets[index];
        debug!(target = %target.name, from = %target.status, to = %status, "Status change");
        target.status = status;
        Ok(())
    }

    /// Lock the queue structure for the duration of a run
    pub fn begin_run(&mut self) -> ScheduleResult<()> {
        if self.running {
            return Err(ScheduleError::QueueLocked {
                operation: "start a second run".to_string(),
            });
        }
        self.running = true;
        Ok(())
    }

    pub fn end_run(&mut self) {
        self.running = false;
    }

    // ------------------------------------------------------------------------
    // Summary
    // ------------------------------------------------------------------------

    pub fn summary(
        &self,
        now: DateTime<Utc>,
        global_stop_time: Option<DateTime<Utc>>,
    ) -> ScheduleSummary {
        let mut summary = ScheduleSummary {
            total: self.targets.len(),
            global_stop_time,
            ..ScheduleSummary::default()
        };

        for target in &self.targets {
            match target.status {
                TargetStatus::Waiting => {}
                TargetStatus::Running => {
                    summary.running += 1;
                    continue;
                }
                TargetStatus::Completed => {
                    summary.completed += 1;
                    continue;
                }
                TargetStatus::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                TargetStatus::Failed => {
                    summary.failed += 1;
                    continue;
                }
            }

            summary.waiting += 1;
            if Self::should_skip(target, now, global_stop_time) {
                summary.would_skip += 1;
                continue;
            }
            if target.start_time <= now {
                summary.due += 1;
            } else {
                summary.upcoming += 1;
            }

            let exposure: f64 = target.filters.iter().map(|f| f.total_seconds()).sum();
            summary.total_exposure_hours += exposure / 3600.0;
            summary.first_start = Some(
                summary
                    .first_start
                    .map_or(target.start_time, |s| s.min(target.start_time)),
            );
            summary.last_start = Some(
                summary
                    .last_start
                    .map_or(target.start_time, |s| s.max(target.start_time)),
            );
        }

        summary
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn to_records(&self, defaults: &ImagingDefaults) -> Vec<QueueRecord> {
        self.targets
            .iter()
            .map(|t| QueueRecord::from_target(t, defaults))
            .collect()
    }

    pub fn from_records(records: Vec<QueueRecord>) -> ScheduleResult<Self> {
        let targets = records
            .into_iter()
            .map(QueueRecord::into_target)
            .collect::<ScheduleResult<Vec<_>>>()?;
        Ok(Self::from_targets(targets))
    }

    /// Serialize to JSON
    pub fn to_json(&self, defaults: &ImagingDefaults) -> ScheduleResult<String> {
        serde_json::to_string_pretty(&self.to_records(defaults)).map_err(Into::into)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> ScheduleResult<Self> {
        let records: Vec<QueueRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Save to file
    pub async fn save(&self, path: impl AsRef<Path>, defaults: &ImagingDefaults) -> ScheduleResult<()> {
        let json = self.to_json(defaults)?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| ScheduleError::io_error("save_queue", e.to_string()))?;
        Ok(())
    }

    /// Load from file
    pub async fn load(path: impl AsRef<Path>) -> ScheduleResult<Self> {
        let json = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ScheduleError::io_error("load_queue", e.to_string()))?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Persisted record
// ============================================================================

/// One entry of a saved queue file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub name: String,

    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`
    pub start_time: String,

    #[serde(default = "default_priority")]
    pub priority: i32,

    pub plan_config: ImagingPlan,

    #[serde(default)]
    pub status: TargetStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meridian_time: Option<String>,

    #[serde(default = "default_true")]
    pub enable_meridian_wait: bool,
}

fn default_priority() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl QueueRecord {
    pub fn from_target(target: &Target, defaults: &ImagingDefaults) -> Self {
        Self {
            name: target.name.clone(),
            start_time: format_timestamp(&target.start_time),
            priority: target.priority,
            plan_config: target.imaging_plan(defaults),
            status: target.status,
            meridian_time: target
                .meridian_time
                .map(|t| t.format(CLOCK_FORMAT).to_string()),
            enable_meridian_wait: target.enable_meridian_wait,
        }
    }

    pub fn into_target(self) -> ScheduleResult<Target> {
        let start_time = parse_timestamp(&self.start_time)
            .ok_or_else(|| ScheduleError::invalid_timestamp(&self.start_time))?;

        let meridian_time = self
            .meridian_time
            .as_deref()
            .map(|s| {
                NaiveTime::parse_from_str(s, CLOCK_FORMAT)
                    .map_err(|_| ScheduleError::invalid_timestamp(s))
            })
            .transpose()?;

        // a run that died mid-target leaves it pending again
        let status = match self.status {
            TargetStatus::Running => TargetStatus::Waiting,
            other => other,
        };

        let imaging = self.plan_config.imaging_defaults();
        Ok(Target {
            name: self.name,
            ra: self.plan_config.ra,
            dec: self.plan_config.dec,
            start_time,
            priority: self.priority,
            meridian_time,
            enable_meridian_wait: self.enable_meridian_wait,
            filters: self.plan_config.filters,
            imaging: Some(imaging),
            status,
        })
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Schedule summary statistics
#[derive(Debug, Clone, Default)]
pub struct ScheduleSummary {
    pub total: usize,
    pub waiting: usize,
    /// Waiting and already past their start time
    pub due: usize,
    /// Waiting with a start time in the future
    pub upcoming: usize,
    /// Waiting but too late or past the stop time
    pub would_skip: usize,
    pub running: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Raw exposure time of the targets that will run
    pub total_exposure_hours: f64,
    pub first_start: Option<DateTime<Utc>>,
    pub last_start: Option<DateTime<Utc>>,
    pub global_stop_time: Option<DateTime<Utc>>,
}

impl ScheduleSummary {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Schedule Summary\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Targets: {} ({} waiting)\n", self.total, self.waiting));
        output.push_str(&format!(
            "  due now: {}, upcoming: {}, would skip: {}\n",
            self.due, self.upcoming, self.would_skip
        ));
        if self.completed + self.failed + self.skipped + self.running > 0 {
            output.push_str(&format!(
                "  completed: {}, failed: {}, skipped: {}, running: {}\n",
                self.completed, self.failed, self.skipped, self.running
            ));
        }
        output.push_str(&format!(
            "Total exposure: {:.2} h\n",
            self.total_exposure_hours
        ));
        if let (Some(first), Some(last)) = (self.first_start, self.last_start) {
            output.push_str(&format!(
                "Start window: {} .. {}\n",
                format_timestamp(&first),
                format_timestamp(&last)
            ));
        }
        match self.global_stop_time {
            Some(stop) => output.push_str(&format!("Global stop: {}\n", format_timestamp(&stop))),
            None => output.push_str("Global stop: none\n"),
        }
        output
    }
}
