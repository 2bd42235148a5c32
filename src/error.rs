//! Unified error handling for the acp-observer crate
//!
//! Domain modules keep their own error enums; [`Error`] is what an
//! observation run returns, and the CLI reports its category.
//!
//! # Architecture
//!
//! - [`ObserverErrorTrait`] - Recoverability and category of an error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Failure of a whole observation run
//!
//! # Usage
//!
//! ```rust,ignore
//! use acp_observer::error::{Error, ObserverErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error ({:?}): {err}", err.category());
//!     }
//! }
//! ```

use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::acp::error::AcpError;
pub use crate::scheduler::error::ScheduleError;

/// Common trait for all acp-observer error types
pub trait ObserverErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport-level errors (HTTP, timeout, connection)
    Network,
    /// The observatory answered but refused or reported a problem
    Observatory,
    /// Malformed responses and queue files
    Parsing,
    /// Queue file and other I/O errors
    Storage,
    /// Queue state and scheduling errors
    Scheduler,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Observatory => "observatory",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Scheduler => "scheduler",
        }
    }
}

impl ObserverErrorTrait for AcpError {
    fn is_recoverable(&self) -> bool {
        AcpError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } | Self::Connection(_) | Self::Http(_) | Self::InvalidUrl(_) => {
                ErrorCategory::Network
            }
            Self::Protocol(_) => ErrorCategory::Parsing,
            _ => ErrorCategory::Observatory,
        }
    }
}

impl ObserverErrorTrait for ScheduleError {
    fn is_recoverable(&self) -> bool {
        ScheduleError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::IoError { .. } => ErrorCategory::Storage,
            Self::SerializationError { .. } | Self::InvalidTimestamp { .. } => {
                ErrorCategory::Parsing
            }
            _ => ErrorCategory::Scheduler,
        }
    }
}

/// Why an observation run could not start or finish
#[derive(Error, Debug)]
pub enum Error {
    /// The initial connection to the observatory failed
    #[error("Failed to connect to the observatory: {0}")]
    ConnectionFailed(#[source] AcpError),

    /// A run was started on an empty queue
    #[error("The target queue is empty")]
    EmptyQueue,

    /// Queue and persistence errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

impl ObserverErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionFailed(e) => ObserverErrorTrait::is_recoverable(e),
            Self::Schedule(e) => ObserverErrorTrait::is_recoverable(e),
            Self::EmptyQueue => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed(e) => e.category(),
            Self::Schedule(e) => e.category(),
            Self::EmptyQueue => ErrorCategory::Scheduler,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let timeout = Error::ConnectionFailed(AcpError::Timeout {
            url: String::from("http://acp/index.asp"),
        });
        assert_eq!(timeout.category(), ErrorCategory::Network);
        assert!(timeout.is_recoverable());

        let denied = Error::ConnectionFailed(AcpError::Unauthorized {
            url: String::from("http://acp/index.asp"),
        });
        assert_eq!(denied.category(), ErrorCategory::Observatory);
        assert!(!denied.is_recoverable());

        assert_eq!(Error::EmptyQueue.category(), ErrorCategory::Scheduler);
        assert!(!Error::EmptyQueue.is_recoverable());
    }

    #[test]
    fn test_storage_errors_are_recoverable() {
        let unified: Error = ScheduleError::io_error("save", "disk full").into();
        assert_eq!(unified.category(), ErrorCategory::Storage);
        assert!(unified.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let schedule_err = ScheduleError::QueueLocked {
            operation: String::from("clear"),
        };
        let unified: Error = schedule_err.into();
        assert!(matches!(unified, Error::Schedule(_)));
        assert_eq!(unified.category(), ErrorCategory::Scheduler);
    }

    #[test]
    fn test_category_names() {
        let protocol = Error::ConnectionFailed(AcpError::Protocol(String::from("empty page")));
        assert_eq!(protocol.category(), ErrorCategory::Parsing);
        assert_eq!(protocol.category().as_str(), "parsing");
        assert_eq!(ErrorCategory::Network.as_str(), "network");
    }

    #[test]
    fn test_connection_failed_message() {
        let err = Error::ConnectionFailed(AcpError::Connection(String::from("refused")));
        assert_eq!(
            err.to_string(),
            "Failed to connect to the observatory: ACP server connection failed: refused"
        );
    }
}
