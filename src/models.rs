// Core data structures for the observation scheduler

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Overhead factor applied to raw exposure time when estimating how long a
/// plan takes on the mount (readout, filter changes, dithering, focus runs)
pub const DURATION_OVERHEAD_FACTOR: f64 = 1.2;

/// One filter/exposure row of an imaging plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExposure {
    /// Filter wheel slot on the remote camera
    pub filter_id: u32,

    /// Human-readable filter name (e.g. "L", "H-alpha")
    #[serde(default)]
    pub name: String,

    /// Exposure length of a single frame, in seconds
    #[serde(rename = "exposure", alias = "exposure_seconds")]
    pub exposure_seconds: f64,

    /// Number of frames
    pub count: u32,

    #[serde(default = "default_binning")]
    pub binning: u32,
}

fn default_binning() -> u32 {
    1
}

impl FilterExposure {
    pub fn new(filter_id: u32, name: impl Into<String>, exposure_seconds: f64, count: u32) -> Self {
        Self {
            filter_id,
            name: name.into(),
            exposure_seconds,
            count,
            binning: 1,
        }
    }

    /// Builder-style binning override
    pub fn with_binning(mut self, binning: u32) -> Self {
        self.binning = binning;
        self
    }

    /// Total integration time of this row, in seconds
    pub fn total_seconds(&self) -> f64 {
        self.exposure_seconds * f64::from(self.count)
    }

    /// Name to show in logs, falling back to the slot number
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Filter{}", self.filter_id)
        } else {
            self.name.clone()
        }
    }
}

/// Run status of a scheduled target
///
/// Older queue files stored the status as a localized label; those labels
/// are still accepted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    #[serde(alias = "等待中")]
    Waiting,
    #[serde(alias = "执行中")]
    Running,
    #[serde(alias = "已完成")]
    Completed,
    #[serde(alias = "已跳过")]
    Skipped,
    #[serde(alias = "失败")]
    Failed,
}

impl TargetStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is final for the current run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    /// Forward-only transition rule:
    /// `Waiting -> Running -> {Completed, Failed}` or `Waiting -> Skipped`
    pub fn can_transition_to(&self, next: TargetStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Running)
                | (Self::Waiting, Self::Skipped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-wide imaging defaults merged into every plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingDefaults {
    /// Dither amount in pixels (0 disables dithering)
    pub dither: u32,

    /// Run an autofocus before the first frame
    pub auto_focus: bool,

    /// Periodic autofocus interval in minutes (0 disables)
    #[serde(alias = "af_interval")]
    pub periodic_af_interval: u32,
}

impl Default for ImagingDefaults {
    fn default() -> Self {
        Self {
            dither: 5,
            auto_focus: true,
            periodic_af_interval: 120,
        }
    }
}

/// One observation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,

    /// Right ascension, `HH:MM:SS[.s]`
    pub ra: String,

    /// Declination, `±DD:MM:SS[.s]`
    pub dec: String,

    pub start_time: DateTime<Utc>,

    /// Lower sorts first when start times are equal
    pub priority: i32,

    /// Manual meridian crossing (local wall-clock time) overriding the
    /// computed one
    pub meridian_time: Option<NaiveTime>,

    pub enable_meridian_wait: bool,

    pub filters: Vec<FilterExposure>,

    /// Per-target override of the session imaging defaults
    pub imaging: Option<ImagingDefaults>,

    pub status: TargetStatus,
}

impl Target {
    /// Create a waiting target with priority 1 and meridian wait enabled
    pub fn new(
        name: impl Into<String>,
        ra: impl Into<String>,
        dec: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            ra: ra.into(),
            dec: dec.into(),
            start_time,
            priority: 1,
            meridian_time: None,
            enable_meridian_wait: true,
            filters: Vec::new(),
            imaging: None,
            status: TargetStatus::Waiting,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filter(mut self, filter: FilterExposure) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: Vec<FilterExposure>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_meridian_time(mut self, meridian_time: NaiveTime) -> Self {
        self.meridian_time = Some(meridian_time);
        self
    }

    pub fn with_meridian_wait(mut self, enabled: bool) -> Self {
        self.enable_meridian_wait = enabled;
        self
    }

    pub fn with_imaging(mut self, imaging: ImagingDefaults) -> Self {
        self.imaging = Some(imaging);
        self
    }

    /// Build the plan submitted to the observatory for this target
    pub fn imaging_plan(&self, defaults: &ImagingDefaults) -> ImagingPlan {
        ImagingPlan::from_target(self, defaults)
    }

    /// Sort key used by the schedule queue
    pub fn order_key(&self) -> (DateTime<Utc>, i32) {
        (self.start_time, self.priority)
    }
}

/// Plan submitted to the remote controller for one target
///
/// Built fresh at every attempt and also used as the `plan_config` record of
/// a saved queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingPlan {
    pub target: String,
    pub ra: String,
    pub dec: String,
    pub filters: Vec<FilterExposure>,
    #[serde(default)]
    pub dither: u32,
    #[serde(default)]
    pub auto_focus: bool,
    #[serde(default, alias = "af_interval")]
    pub periodic_af_interval: u32,
}

impl ImagingPlan {
    /// Merge a target with the imaging defaults; a per-target override wins
    pub fn from_target(target: &Target, defaults: &ImagingDefaults) -> Self {
        let imaging = target.imaging.as_ref().unwrap_or(defaults);
        Self {
            target: target.name.clone(),
            ra: target.ra.clone(),
            dec: target.dec.clone(),
            filters: target.filters.clone(),
            dither: imaging.dither,
            auto_focus: imaging.auto_focus,
            periodic_af_interval: imaging.periodic_af_interval,
        }
    }

    pub fn total_images(&self) -> u32 {
        self.filters.iter().map(|f| f.count).sum()
    }

    pub fn total_exposure_seconds(&self) -> f64 {
        self.filters.iter().map(FilterExposure::total_seconds).sum()
    }

    /// Expected wall-clock time for the whole plan
    ///
    /// Saturates at [`Duration::MAX`] for exposures too large to represent.
    pub fn estimated_duration(&self) -> Duration {
        let seconds = self.total_exposure_seconds().max(0.0) * DURATION_OVERHEAD_FACTOR;
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// The imaging settings carried by this plan
    pub fn imaging_defaults(&self) -> ImagingDefaults {
        ImagingDefaults {
            dither: self.dither,
            auto_focus: self.auto_focus,
            periodic_af_interval: self.periodic_af_interval,
        }
    }

    /// One-line filter summary, e.g. `L:10x300s, R:5x180s`
    pub fn filter_summary(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}:{}x{}s", f.display_name(), f.count, f.exposure_seconds))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What the observatory reports at one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// A script or plan currently owns the observatory
    pub is_running: bool,

    pub current_filter: Option<String>,

    /// Error reported by the remote side, if any
    pub error: Option<String>,

    /// Remote plan progress text (e.g. "3/20")
    pub plan_progress: Option<String>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn running() -> Self {
        Self {
            is_running: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.current_filter = Some(filter.into());
        self
    }
}
