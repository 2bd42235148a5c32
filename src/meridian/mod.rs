//! Meridian flip prediction
//!
//! A German-equatorial mount has to flip when the target crosses the local
//! meridian. This module predicts that crossing from the target's right
//! ascension and the observatory longitude, derives the stop/resume window
//! around it, and tells the executor whether imaging must pause right now.
//!
//! # Window
//!
//! ```text
//!   stop = meridian - (stop_minutes_before + safety_margin_minutes)
//! resume = meridian + (resume_minutes_after + safety_margin_minutes)
//!
//!   BeforeWindow | StoppedBeforeMeridian | WaitingAfterMeridian | AfterWindow
//! ---------------+-----------------------+----------------------+------------>
//!              stop                   meridian               resume
//! ```
//!
//! Only right ascension enters the crossing time. Declination is parsed so
//! bad coordinates are reported, but it does not change the result.

pub mod coords;
pub mod error;

pub use coords::{format_hours, julian_day, local_sidereal_time, parse_dec, parse_ra};
pub use error::{MeridianError, MeridianResult};

use crate::models::Target;
use crate::scheduler::clock::{pause, Checkpoint, Clock, WaitOutcome};
use crate::utils::{format_clock, format_duration};
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ratio of a sidereal hour to a solar hour
pub const SIDEREAL_TO_SOLAR: f64 = 0.997_269_566_3;

/// Default step between wake-ups during a flip wait
pub const DEFAULT_FLIP_POLL_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Configuration
// ============================================================================

/// Minutes around the crossing during which imaging is paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeridianFlipConfig {
    pub stop_minutes_before: u32,
    pub resume_minutes_after: u32,
    #[serde(alias = "safety_margin")]
    pub safety_margin_minutes: u32,
}

impl Default for MeridianFlipConfig {
    fn default() -> Self {
        Self {
            stop_minutes_before: 10,
            resume_minutes_after: 10,
            safety_margin_minutes: 5,
        }
    }
}

impl MeridianFlipConfig {
    fn stop_offset(&self) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(self.stop_minutes_before + self.safety_margin_minutes))
    }

    fn resume_offset(&self) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(self.resume_minutes_after + self.safety_margin_minutes))
    }
}

/// Observatory position; longitude is east-positive
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservatoryLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl ObservatoryLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

// ============================================================================
// Window and status
// ============================================================================

/// Stop/resume window around one meridian crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeridianWindow {
    pub stop_time: DateTime<Utc>,
    pub meridian_time: DateTime<Utc>,
    pub resume_time: DateTime<Utc>,
}

impl MeridianWindow {
    /// Phase of `now` relative to this window
    pub fn phase_at(&self, now: DateTime<Utc>) -> MeridianPhase {
        if now < self.stop_time {
            MeridianPhase::BeforeWindow
        } else if now < self.meridian_time {
            MeridianPhase::StoppedBeforeMeridian
        } else if now < self.resume_time {
            MeridianPhase::WaitingAfterMeridian
        } else {
            MeridianPhase::AfterWindow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeridianPhase {
    /// Meridian wait switched off for the target
    Disabled,
    BeforeWindow,
    StoppedBeforeMeridian,
    WaitingAfterMeridian,
    AfterWindow,
    /// Coordinates could not be parsed
    Error,
}

impl MeridianPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::BeforeWindow => "before_window",
            Self::StoppedBeforeMeridian => "stopped_before_meridian",
            Self::WaitingAfterMeridian => "waiting_after_meridian",
            Self::AfterWindow => "after_window",
            Self::Error => "error",
        }
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, Self::StoppedBeforeMeridian | Self::WaitingAfterMeridian)
    }
}

impl fmt::Display for MeridianPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`MeridianFlipCalculator::check_needed`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeridianStatus {
    pub phase: MeridianPhase,
    pub message: String,
    pub wait_needed: bool,
    /// Meridian time while stopped before it, resume time after it
    pub wait_until: Option<DateTime<Utc>>,
    pub window: Option<MeridianWindow>,
}

impl MeridianStatus {
    fn disabled() -> Self {
        Self {
            phase: MeridianPhase::Disabled,
            message: "Meridian wait disabled for this target".to_string(),
            wait_needed: false,
            wait_until: None,
            window: None,
        }
    }

    fn error(err: &MeridianError) -> Self {
        Self {
            phase: MeridianPhase::Error,
            message: err.to_string(),
            wait_needed: false,
            wait_until: None,
            window: None,
        }
    }

    fn from_window(window: MeridianWindow, now: DateTime<Utc>) -> Self {
        let phase = window.phase_at(now);
        let (message, wait_until) = match phase {
            MeridianPhase::BeforeWindow => (
                format!(
                    "{} until imaging stops for the meridian at {}",
                    format_duration(window.stop_time - now),
                    format_clock(&window.stop_time)
                ),
                None,
            ),
            MeridianPhase::StoppedBeforeMeridian => (
                format!(
                    "Stopped for meridian flip, crossing at {}",
                    format_clock(&window.meridian_time)
                ),
                Some(window.meridian_time),
            ),
            MeridianPhase::WaitingAfterMeridian => (
                format!(
                    "Meridian passed, resuming at {}",
                    format_clock(&window.resume_time)
                ),
                Some(window.resume_time),
            ),
            _ => (
                format!(
                    "Meridian window ended at {}",
                    format_clock(&window.resume_time)
                ),
                None,
            ),
        };

        Self {
            phase,
            message,
            wait_needed: phase.is_wait(),
            wait_until,
            window: Some(window),
        }
    }
}

// ============================================================================
// Calculator
// ============================================================================

/// Predicts meridian crossings and the flip window around them
#[derive(Debug, Clone)]
pub struct MeridianFlipCalculator {
    location: ObservatoryLocation,
    config: MeridianFlipConfig,
    simulated: bool,
    poll_interval: Duration,
}

impl MeridianFlipCalculator {
    pub fn new(location: ObservatoryLocation, config: MeridianFlipConfig) -> Self {
        Self {
            location,
            config,
            simulated: false,
            poll_interval: DEFAULT_FLIP_POLL_INTERVAL,
        }
    }

    /// Dry-run mode: flip waits complete immediately
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn location(&self) -> ObservatoryLocation {
        self.location
    }

    pub fn config(&self) -> &MeridianFlipConfig {
        &self.config
    }

    /// Next meridian crossing of `ra` seen from `now`, within ±12h
    pub fn meridian_time(
        &self,
        ra: &str,
        dec: &str,
        now: DateTime<Utc>,
    ) -> MeridianResult<DateTime<Utc>> {
        let ra_hours = parse_ra(ra)?;
        parse_dec(dec)?;

        let lst = local_sidereal_time(&now, self.location.longitude);
        let mut delta = ra_hours - lst;
        if delta > 12.0 {
            delta -= 24.0;
        } else if delta <= -12.0 {
            delta += 24.0;
        }

        let offset_ms = (delta * SIDEREAL_TO_SOLAR * 3_600_000.0).round() as i64;
        Ok(now + ChronoDuration::milliseconds(offset_ms))
    }

    /// Manual override if the target has one, otherwise the computed crossing
    ///
    /// The override is a local wall-clock time and is placed on whichever day
    /// puts it within 12 hours of `now`.
    pub fn resolve_meridian_time(
        &self,
        target: &Target,
        now: DateTime<Utc>,
    ) -> MeridianResult<DateTime<Utc>> {
        let Some(manual) = target.meridian_time else {
            return self.meridian_time(&target.ra, &target.dec, now);
        };

        let local_date = now.with_timezone(&Local).date_naive();
        let mut crossing = Local
            .from_local_datetime(&local_date.and_time(manual))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| MeridianError::OutOfRange {
                target: target.name.clone(),
            })?;

        let half_day = ChronoDuration::hours(12);
        if crossing - now > half_day {
            crossing -= ChronoDuration::days(1);
        } else if now - crossing >= half_day {
            crossing += ChronoDuration::days(1);
        }

        Ok(crossing)
    }

    /// Stop/resume window around the computed crossing
    pub fn flip_window(
        &self,
        ra: &str,
        dec: &str,
        now: DateTime<Utc>,
    ) -> MeridianResult<MeridianWindow> {
        let meridian = self.meridian_time(ra, dec, now)?;
        Ok(self.window_around(meridian))
    }

    fn window_around(&self, meridian: DateTime<Utc>) -> MeridianWindow {
        MeridianWindow {
            stop_time: meridian - self.config.stop_offset(),
            meridian_time: meridian,
            resume_time: meridian + self.config.resume_offset(),
        }
    }

    /// Whether imaging of `target` has to pause for a flip at `now`
    pub fn check_needed(&self, target: &Target, now: DateTime<Utc>) -> MeridianStatus {
        if !target.enable_meridian_wait {
            return MeridianStatus::disabled();
        }

        match self.resolve_meridian_time(target, now) {
            Ok(meridian) => MeridianStatus::from_window(self.window_around(meridian), now),
            Err(e) => {
                warn!(target = %target.name, error = %e, "Cannot compute meridian window");
                MeridianStatus::error(&e)
            }
        }
    }

    /// Sleep through the flip window in bounded steps
    ///
    /// Returns `true` once the window is over (immediately in simulated
    /// mode) and `false` if interrupted.
    pub async fn wait_for_flip(
        &self,
        target: &Target,
        clock: &dyn Clock,
        checkpoint: &mut Checkpoint,
    ) -> bool {
        if self.simulated {
            info!(target = %target.name, "Simulated run, skipping meridian flip wait");
            return true;
        }

        loop {
            let now = clock.now();
            let status = self.check_needed(target, now);
            let Some(until) = status.wait_until.filter(|_| status.wait_needed) else {
                info!(target = %target.name, "Meridian flip wait finished");
                return true;
            };

            let remaining = (until - now).to_std().unwrap_or(Duration::ZERO);
            info!(
                target = %target.name,
                phase = %status.phase,
                until = %format_clock(&until),
                remaining = %format_duration(until - now),
                "Waiting for meridian flip"
            );

            let step = remaining.min(self.poll_interval).max(Duration::from_secs(1));
            if pause(clock, checkpoint, step).await == WaitOutcome::Interrupted {
                debug!(target = %target.name, "Meridian flip wait interrupted");
                return false;
            }
        }
    }
}
