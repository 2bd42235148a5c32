//! Configuration management for acp-observer
//!
//! Configuration is a single TOML file. Every section is optional and falls
//! back to defaults; server credentials can be supplied through the
//! `ACP_URL`, `ACP_USERNAME` and `ACP_PASSWORD` environment variables
//! instead of the file.
//!
//! ```toml
//! [server]
//! url = "http://observatory.local"
//! username = "admin"
//!
//! [schedule]
//! stop_time = "2025-01-02 05:30:00"
//!
//! [[targets]]
//! name = "M31"
//! ra = "00:42:44"
//! dec = "+41:16:09"
//! start_time = "2025-01-01 20:00:00"
//!
//! [[targets.filters]]
//! filter_id = 0
//! name = "L"
//! exposure = 300.0
//! count = 10
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::execution::{MonitorSettings, RetryPolicy, RunSettings};
use crate::meridian::{parse_dec, parse_ra, MeridianFlipCalculator, MeridianFlipConfig, ObservatoryLocation};
use crate::models::{FilterExposure, ImagingDefaults, Target, TargetStatus};
use crate::utils::{parse_timestamp, CLOCK_FORMAT};

/// Longest single exposure accepted, one day
pub const MAX_EXPOSURE_SECONDS: f64 = 86_400.0;

/// Validation failure carrying every problem found
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid(problems) => problems,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ACP server connection
    pub server: ServerConfig,

    /// Run-wide schedule limits
    pub schedule: ScheduleConfig,

    /// Meridian flip window
    pub meridian_flip: MeridianFlipConfig,

    /// Observatory position
    pub observatory: ObservatoryLocation,

    /// Imaging defaults for every plan
    pub imaging: ImagingDefaults,

    /// Target-level retry policy
    pub retry: RetryPolicy,

    /// Monitoring loop tuning
    pub monitor: MonitorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Observation targets
    pub targets: Vec<TargetConfig>,
}

/// ACP server configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server URL; `http://` is assumed when no scheme is given
    pub url: String,

    pub username: String,

    pub password: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries per HTTP request on transient failures
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost"),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            requests_per_second: 2,
            user_agent: format!("acp-observer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("requests_per_second", &self.requests_per_second)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Schedule-wide limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// No target starts at or after this local time (`YYYY-MM-DD HH:MM:SS`)
    pub stop_time: Option<String>,

    /// Longest sleep between countdown log lines while waiting for a target
    pub wait_step_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            stop_time: None,
            wait_step_secs: 30,
        }
    }
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Status poll interval in seconds
    pub poll_interval_secs: u64,

    /// Minutes allowed past the estimated plan duration; 0 disables
    pub timeout_minutes: u64,

    /// Settle time after stopping the previous operation
    pub stop_grace_secs: u64,

    /// Consecutive failed status checks that abort an attempt
    pub max_status_failures: u32,

    /// Status polls a dry-run plan stays busy
    pub simulated_busy_polls: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            timeout_minutes: 60,
            stop_grace_secs: 5,
            max_status_failures: 3,
            simulated_busy_polls: 3,
        }
    }
}

impl MonitorConfig {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: (self.timeout_minutes > 0)
                .then(|| Duration::from_secs(self.timeout_minutes * 60)),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            max_status_failures: self.max_status_failures,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// One `[[targets]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub ra: String,
    pub dec: String,

    /// Local wall-clock start, `YYYY-MM-DD HH:MM:SS`
    pub start_time: String,

    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Manual local meridian time, `HH:MM:SS`
    #[serde(default)]
    pub meridian_time: Option<String>,

    #[serde(default = "default_true")]
    pub enable_meridian_wait: bool,

    #[serde(default)]
    pub filters: Vec<FilterExposure>,

    /// Per-target override of `[imaging]`
    #[serde(default)]
    pub imaging: Option<ImagingDefaults>,
}

fn default_priority() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl TargetConfig {
    /// Problems with this entry, prefixed with its name
    pub fn problems(&self) -> Vec<String> {
        let label = if self.name.trim().is_empty() {
            String::from("target <unnamed>")
        } else {
            format!("target {}", self.name)
        };
        let mut problems = Vec::new();
        let mut push = |msg: String| problems.push(format!("{label}: {msg}"));

        if self.name.trim().is_empty() {
            push(String::from("name must not be empty"));
        }
        if let Err(e) = parse_ra(&self.ra) {
            push(e.to_string());
        }
        if let Err(e) = parse_dec(&self.dec) {
            push(e.to_string());
        }
        if parse_timestamp(&self.start_time).is_none() {
            push(format!(
                "start_time '{}' is not a valid YYYY-MM-DD HH:MM:SS local time",
                self.start_time
            ));
        }
        if let Some(meridian) = &self.meridian_time {
            if NaiveTime::parse_from_str(meridian.trim(), CLOCK_FORMAT).is_err() {
                push(format!("meridian_time '{meridian}' is not HH:MM:SS"));
            }
        }
        if self.filters.is_empty() {
            push(String::from("at least one filter is required"));
        }
        for filter in &self.filters {
            let name = filter.display_name();
            if !filter.exposure_seconds.is_finite() || filter.exposure_seconds <= 0.0 {
                push(format!("filter {name}: exposure must be a positive number of seconds"));
            } else if filter.exposure_seconds > MAX_EXPOSURE_SECONDS {
                push(format!(
                    "filter {name}: exposure {}s exceeds {MAX_EXPOSURE_SECONDS}s",
                    filter.exposure_seconds
                ));
            }
            if filter.count == 0 {
                push(format!("filter {name}: count must be positive"));
            }
            if filter.binning == 0 {
                push(format!("filter {name}: binning must be at least 1"));
            }
        }
        problems
    }

    /// Build a waiting [`Target`]; fails with the first problem found
    pub fn to_target(&self) -> std::result::Result<Target, ConfigError> {
        let problems = self.problems();
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let start_time = parse_timestamp(&self.start_time)
            .ok_or_else(|| ConfigError::Invalid(vec![format!("bad start_time for {}", self.name)]))?;
        let meridian_time = self
            .meridian_time
            .as_deref()
            .and_then(|s| NaiveTime::parse_from_str(s.trim(), CLOCK_FORMAT).ok());

        Ok(Target {
            name: self.name.trim().to_string(),
            ra: self.ra.trim().to_string(),
            dec: self.dec.trim().to_string(),
            start_time,
            priority: self.priority,
            meridian_time,
            enable_meridian_wait: self.enable_meridian_wait,
            filters: self.filters.clone(),
            imaging: self.imaging.clone(),
            status: TargetStatus::Waiting,
        })
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load a file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Override server settings from `ACP_URL`, `ACP_USERNAME`, `ACP_PASSWORD`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ACP_URL").filter(|v| !v.is_empty()) {
            self.server.url = url;
        }
        if let Some(username) = lookup("ACP_USERNAME").filter(|v| !v.is_empty()) {
            self.server.username = username;
        }
        if let Some(password) = lookup("ACP_PASSWORD") {
            self.server.password = password;
        }
    }

    /// Validate configuration values, collecting every problem
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.server.url.trim().is_empty() {
            problems.push(String::from("server.url must not be empty"));
        }
        if self.server.username.trim().is_empty() {
            problems.push(String::from("server.username must not be empty"));
        }
        if self.server.request_timeout_secs == 0 {
            problems.push(String::from("server.request_timeout_secs must be greater than 0"));
        }

        if let Some(stop) = &self.schedule.stop_time {
            if parse_timestamp(stop).is_none() {
                problems.push(format!(
                    "schedule.stop_time '{stop}' is not a valid YYYY-MM-DD HH:MM:SS local time"
                ));
            }
        }

        let location = &self.observatory;
        if !(-90.0..=90.0).contains(&location.latitude) {
            problems.push(format!(
                "observatory.latitude {} must be within [-90, 90]",
                location.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&location.longitude) {
            problems.push(format!(
                "observatory.longitude {} must be within [-180, 180]",
                location.longitude
            ));
        }

        if self.retry.enabled && self.retry.max_attempts == 0 {
            problems.push(String::from("retry.max_attempts must be at least 1"));
        }
        if self.monitor.poll_interval_secs == 0 {
            problems.push(String::from("monitor.poll_interval_secs must be greater than 0"));
        }
        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            problems.push(format!(
                "logging.level '{}' must be one of trace, debug, info, warn, error",
                self.logging.level
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            problems.push(format!(
                "logging.format '{}' must be text or json",
                self.logging.format
            ));
        }

        for target in &self.targets {
            problems.extend(target.problems());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Targets as waiting [`Target`]s
    pub fn targets(&self) -> std::result::Result<Vec<Target>, ConfigError> {
        self.targets.iter().map(TargetConfig::to_target).collect()
    }

    pub fn global_stop_time(&self) -> std::result::Result<Option<DateTime<Utc>>, ConfigError> {
        self.schedule
            .stop_time
            .as_deref()
            .map(|s| {
                parse_timestamp(s).ok_or_else(|| {
                    ConfigError::Invalid(vec![format!("schedule.stop_time '{s}' is not valid")])
                })
            })
            .transpose()
    }

    /// Settings for one orchestrator run
    pub fn run_settings(&self) -> std::result::Result<RunSettings, ConfigError> {
        Ok(RunSettings {
            imaging: self.imaging.clone(),
            retry: self.retry.clone(),
            global_stop_time: self.global_stop_time()?,
            wait_step: Duration::from_secs(self.schedule.wait_step_secs.max(1)),
        })
    }

    pub fn meridian_calculator(&self) -> MeridianFlipCalculator {
        MeridianFlipCalculator::new(self.observatory, self.meridian_flip.clone())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
