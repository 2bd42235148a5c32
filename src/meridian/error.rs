//! Error types for coordinate parsing and meridian computation

use thiserror::Error;

/// Result type for meridian operations
pub type MeridianResult<T> = Result<T, MeridianError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeridianError {
    /// Right ascension is not `HH:MM:SS[.s]` or out of range
    #[error("Invalid right ascension '{value}': {reason}")]
    InvalidRa { value: String, reason: String },

    /// Declination is not `±DD:MM:SS[.s]` or out of range
    #[error("Invalid declination '{value}': {reason}")]
    InvalidDec { value: String, reason: String },

    /// The computed crossing does not map onto a representable timestamp
    #[error("Meridian time out of range for target {target}")]
    OutOfRange { target: String },
}

impl MeridianError {
    pub fn invalid_ra(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRa {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_dec(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDec {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
