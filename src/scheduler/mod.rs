//! Target scheduling
//!
//! - [`queue`] - ordered target queue with status rules and persistence
//! - [`clock`] - injectable clock, interrupt signal and interruptible waits
//! - [`error`] - scheduler error types

pub mod clock;
pub mod error;
pub mod queue;

pub use clock::{pause, Checkpoint, Clock, InterruptSignal, SimulatedClock, SystemClock, WaitOutcome};
pub use error::{ScheduleError, ScheduleResult};
pub use queue::{QueueRecord, ScheduleSummary, TargetScheduleQueue};
