//! Failure classification and target-level retry policy
//!
//! Observatory failures arrive as free text (HTTP errors, ACP warning
//! blocks, monitoring outcomes). [`classify`] maps a message onto a closed
//! set of [`ErrorKind`]s with case-insensitive substring rules checked in a
//! fixed order; the first matching rule wins. [`RetryPolicy`] then decides
//! whether a kind earns another attempt.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Message produced when an operator interrupt ends an attempt
pub const USER_INTERRUPTED: &str = "user_interrupted";

/// Message produced when monitoring exceeds its time budget
pub const OBSERVATION_TIMEOUT: &str = "observation_timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailed,
    ConnectionTimeout,
    AcpServerError,
    ObservatoryOffline,
    MeridianFlipFailed,
    ObservationTimeout,
    ImagingPlanFailed,
    StatusCheckFailed,
    TelescopeError,
    CameraError,
    UserInterrupted,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::ConnectionTimeout => "connection_timeout",
            Self::AcpServerError => "acp_server_error",
            Self::ObservatoryOffline => "observatory_offline",
            Self::MeridianFlipFailed => "meridian_flip_failed",
            Self::ObservationTimeout => "observation_timeout",
            Self::ImagingPlanFailed => "imaging_plan_failed",
            Self::StatusCheckFailed => "status_check_failed",
            Self::TelescopeError => "telescope_error",
            Self::CameraError => "camera_error",
            Self::UserInterrupted => "user_interrupted",
            Self::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AUTH_MARKERS: &[&str] = &["401", "access denied", "invalid login", "unauthorized"];

/// Map a free-text failure message to an [`ErrorKind`]
pub fn classify(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();
    let has = |needle: &str| msg.contains(needle);

    if AUTH_MARKERS.iter().any(|m| has(m)) {
        ErrorKind::AuthenticationFailed
    } else if has("user_interrupted") || has("user interrupted") {
        ErrorKind::UserInterrupted
    } else if has("connection") && has("timeout") {
        ErrorKind::ConnectionTimeout
    } else if has("acp") && has("server") {
        ErrorKind::AcpServerError
    } else if has("observatory") && has("offline") {
        ErrorKind::ObservatoryOffline
    } else if has("meridian") && has("flip") {
        ErrorKind::MeridianFlipFailed
    } else if has(OBSERVATION_TIMEOUT) || (has("observation") && has("timeout")) {
        ErrorKind::ObservationTimeout
    } else if has("imaging") && has("plan") {
        ErrorKind::ImagingPlanFailed
    } else if has("status") && has("check") {
        ErrorKind::StatusCheckFailed
    } else if has("telescope") && (has("not responding") || has("error")) {
        ErrorKind::TelescopeError
    } else if has("camera") && (has("error") || has("not found")) {
        ErrorKind::CameraError
    } else {
        ErrorKind::UnknownError
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Target-level retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// When false, every target gets exactly one attempt
    pub enabled: bool,

    /// Attempts per target, including the first
    #[serde(alias = "max_retries")]
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(alias = "retry_interval_seconds")]
    pub interval_seconds: u64,

    /// Kinds that earn another attempt; empty means every kind except
    /// `user_interrupted`
    #[serde(alias = "retry_on_errors")]
    pub retryable_errors: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            interval_seconds: 300,
            retryable_errors: [
                ErrorKind::ConnectionTimeout,
                ErrorKind::AcpServerError,
                ErrorKind::ObservatoryOffline,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy making a single attempt
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        if self.retryable_errors.is_empty() {
            kind != ErrorKind::UserInterrupted
        } else {
            self.retryable_errors.contains(&kind)
        }
    }

    /// Number of attempts the executor will make at most
    pub fn effective_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}
