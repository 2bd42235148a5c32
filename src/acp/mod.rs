//! Observatory control clients
//!
//! [`ObservatoryClient`] is the seam between the scheduler and the remote
//! observatory. Two implementations ship with the crate:
//!
//! - [`AcpClient`] - talks to an ACP web server over HTTP
//! - [`SimulatedObservatory`] - accepts everything, for dry runs

pub mod client;
pub mod error;
pub mod simulated;
pub mod status;

pub use client::AcpClient;
pub use error::{AcpError, AcpResult};
pub use simulated::SimulatedObservatory;
pub use status::ObservatoryStatus;

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{ImagingPlan, StatusSnapshot};

/// Remote observatory operations used by the executor and orchestrator
#[async_trait]
pub trait ObservatoryClient: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn connect(&self) -> AcpResult<()>;

    async fn disconnect(&self);

    async fn get_status(&self) -> AcpResult<StatusSnapshot>;

    /// Start an imaging plan; a remote warning is returned as an error
    async fn submit_plan(&self, plan: &ImagingPlan) -> AcpResult<()>;

    /// Stop whatever is running
    ///
    /// `wait` is how long the caller lets the observatory settle afterwards;
    /// the caller does that waiting on its own clock, so implementations
    /// return as soon as the request completes. Returns whether the server
    /// acknowledged the stop.
    async fn stop_current_operation(&self, wait: Duration) -> AcpResult<bool>;
}
