//! acp-observer - Unattended multi-target imaging for ACP observatories
//!
//! Runs a night of deep-sky imaging against an ACP observatory control
//! server: targets are queued by start time and priority, submitted one at a
//! time as imaging plans, monitored until they finish, paused around
//! meridian flips and retried on transient failures.
//!
//! # Architecture
//!
//! - [`config`] - TOML configuration and validation
//! - [`models`] - Targets, filters, imaging plans and status snapshots
//! - [`scheduler`] - Target queue, persistence, clock and interrupt signal
//! - [`meridian`] - Coordinate parsing and meridian flip windows
//! - [`acp`] - Observatory clients (ACP over HTTP, simulated)
//! - [`execution`] - Retry classification, target executor, orchestrator
//! - [`utils`] - Timestamps and request retry helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use acp_observer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(std::path::Path::new("observer.toml"))?;
//!     let mut queue = TargetScheduleQueue::from_targets(config.targets()?);
//!     let orchestrator = ObservationOrchestrator::new(
//!         Arc::new(AcpClient::new(&config.server)?),
//!         config.meridian_calculator(),
//!         Arc::new(SystemClock),
//!         InterruptSignal::new(),
//!     );
//!     let summary = orchestrator.run(&mut queue, &config.run_settings()?).await?;
//!     println!("{}", summary.display());
//!     Ok(())
//! }
//! ```

pub mod acp;
pub mod config;
pub mod error;
pub mod execution;
pub mod meridian;
pub mod models;
pub mod scheduler;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::acp::{AcpClient, ObservatoryClient, SimulatedObservatory};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, ObserverErrorTrait, Result};
    pub use crate::execution::{
        ErrorKind, ObservationOrchestrator, RetryPolicy, RunSettings, RunSummary, TargetExecutor,
    };
    pub use crate::meridian::{MeridianFlipCalculator, MeridianFlipConfig, ObservatoryLocation};
    pub use crate::models::{FilterExposure, ImagingDefaults, ImagingPlan, Target, TargetStatus};
    pub use crate::scheduler::{
        Clock, InterruptSignal, SimulatedClock, SystemClock, TargetScheduleQueue,
    };
}

// Direct re-exports for convenience
pub use models::{FilterExposure, ImagingPlan, Target, TargetStatus};
