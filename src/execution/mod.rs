//! Target execution
//!
//! - [`retry`] - failure classification and retry policy
//! - [`executor`] - one target: submit, monitor, meridian waits, retries
//! - [`orchestrator`] - the schedule loop over a whole queue

pub mod executor;
pub mod orchestrator;
pub mod retry;

pub use executor::{
    ExecutionOutcome, MonitorSettings, ObservationStatus, RetryState, StatusCallback,
    TargetExecutor,
};
pub use orchestrator::{
    ObservationOrchestrator, RunSettings, RunSummary, TargetResult, TargetTransition,
    TransitionObserver,
};
pub use retry::{classify, ErrorKind, RetryPolicy};
