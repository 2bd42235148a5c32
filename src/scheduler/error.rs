//! Error types for the scheduler module

use crate::models::TargetStatus;
use std::fmt;

/// Result type for scheduler operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Schedule queue and persistence errors
#[derive(Debug)]
pub enum ScheduleError {
    /// Index past the end of the queue
    IndexOutOfRange { index: usize, len: usize },

    /// Backward or skipping status change
    InvalidTransition {
        target: String,
        from: TargetStatus,
        to: TargetStatus,
    },

    /// Another target is already running
    AlreadyRunning { running: String, requested: String },

    /// Structural change attempted during a run
    QueueLocked { operation: String },

    /// Timestamp not in `YYYY-MM-DD HH:MM:SS` form
    InvalidTimestamp { value: String },

    /// Serialization/deserialization error
    SerializationError { reason: String },

    /// IO error
    IoError { operation: String, reason: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Queue index {} out of range (len {})", index, len)
            }
            Self::InvalidTransition { target, from, to } => {
                write!(f, "Invalid status transition for '{}': {} -> {}", target, from, to)
            }
            Self::AlreadyRunning { running, requested } => {
                write!(
                    f,
                    "Cannot start '{}' while '{}' is running",
                    requested, running
                )
            }
            Self::QueueLocked { operation } => {
                write!(f, "Queue is locked during a run, cannot {}", operation)
            }
            Self::InvalidTimestamp { value } => {
                write!(
                    f,
                    "Invalid timestamp '{}', expected YYYY-MM-DD HH:MM:SS",
                    value
                )
            }
            Self::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            Self::IoError { operation, reason } => {
                write!(f, "IO error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ScheduleError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl ScheduleError {
    pub fn invalid_transition(target: impl Into<String>, from: TargetStatus, to: TargetStatus) -> Self {
        Self::InvalidTransition {
            target: target.into(),
            from,
            to,
        }
    }

    pub fn invalid_timestamp(value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::IoError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = ScheduleError::invalid_transition("M31", TargetStatus::Completed, TargetStatus::Running);
        let msg = err.to_string();
        assert!(msg.contains("M31"));
        assert!(msg.contains("completed -> running"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(ScheduleError::io_error("save", "disk full").is_recoverable());
        assert!(!ScheduleError::invalid_timestamp("soon").is_recoverable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ScheduleError = json_err.into();
        assert!(matches!(err, ScheduleError::SerializationError { .. }));
    }
}
