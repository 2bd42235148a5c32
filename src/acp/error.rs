//! Error types for the ACP client
//!
//! Display strings are what the retry classifier sees, so each variant
//! carries the words its [`ErrorKind`](crate::execution::ErrorKind) rule
//! looks for (`401`, `connection ... timeout`, `ACP server`, ...).

use thiserror::Error;

/// Result type for observatory operations
pub type AcpResult<T> = Result<T, AcpError>;

#[derive(Error, Debug)]
pub enum AcpError {
    /// HTTP 401 from the server
    #[error("401 Unauthorized: access denied for {url}")]
    Unauthorized { url: String },

    /// Request did not complete in time
    #[error("connection timeout while requesting {url}")]
    Timeout { url: String },

    /// Could not reach the server at all
    #[error("ACP server connection failed: {0}")]
    Connection(String),

    /// 5xx or 429 from the server
    #[error("ACP server error: HTTP {status} for {url}")]
    Server { status: u16, url: String },

    /// Other non-success status
    #[error("HTTP {status} returned for {url}")]
    Rejected { status: u16, url: String },

    /// Transport error not covered above
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Warning block or failure reported inside a 200 response
    #[error("{0}")]
    Warning(String),

    /// Operation called before `connect`
    #[error("Not connected to the ACP server")]
    NotConnected,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body not in the expected shape
    #[error("Unexpected ACP response: {0}")]
    Protocol(String),
}

impl AcpError {
    /// Whether repeating the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection(_) | Self::Server { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }
}
