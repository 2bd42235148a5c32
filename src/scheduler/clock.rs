//! Time source, sleep primitive and interrupt signal
//!
//! Every suspension point of a run (start-time wait, status polling,
//! meridian wait, retry delay) goes through [`pause`], which
//! sleeps on the injected [`Clock`] and races the [`InterruptSignal`].
//!
//! - [`SystemClock`] - wall clock backed by `tokio::time`
//! - [`SimulatedClock`] - fast-forwarding clock for dry runs and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Two interrupts closer than this terminate the run
pub const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(5);

/// Injectable time source
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);

    /// Whether time is simulated (dry run)
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that jumps forward instead of sleeping
#[derive(Debug)]
pub struct SimulatedClock {
    now: Mutex<DateTime<Utc>>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

// ============================================================================
// Interrupt signal
// ============================================================================

struct SignalInner {
    tx: watch::Sender<u64>,
    terminated: AtomicBool,
    last_interrupt: Mutex<Option<Instant>>,
}

/// Cancellation signal shared by the orchestrator, executor and CLI
///
/// The first interrupt abandons the current wait or monitoring loop; a
/// second one within [`DOUBLE_INTERRUPT_WINDOW`] (or [`terminate`]) ends the
/// whole run.
///
/// [`terminate`]: InterruptSignal::terminate
#[derive(Clone)]
pub struct InterruptSignal {
    inner: Arc<SignalInner>,
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("interrupts", &*self.inner.tx.borrow())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl InterruptSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(SignalInner {
                tx,
                terminated: AtomicBool::new(false),
                last_interrupt: Mutex::new(None),
            }),
        }
    }

    /// Raise an interrupt (Ctrl+C)
    pub fn interrupt(&self) {
        let now = Instant::now();
        {
            let mut last = self
                .inner
                .last_interrupt
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if last.is_some_and(|prev| now.duration_since(prev) < DOUBLE_INTERRUPT_WINDOW) {
                self.inner.terminated.store(true, Ordering::SeqCst);
            }
            *last = Some(now);
        }
        self.inner.tx.send_modify(|count| *count += 1);
    }

    /// Request the run to stop after the current step
    pub fn terminate(&self) {
        self.inner.terminated.store(true, Ordering::SeqCst);
        self.inner.tx.send_modify(|count| *count += 1);
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Number of interrupts raised so far
    pub fn interrupt_count(&self) -> u64 {
        *self.inner.tx.borrow()
    }

    /// Observe interrupts raised after this call
    pub fn checkpoint(&self) -> Checkpoint {
        let rx = self.inner.tx.subscribe();
        let baseline = *rx.borrow();
        Checkpoint { rx, baseline }
    }
}

/// Interrupt observer scoped to one wait or monitoring phase
#[derive(Debug)]
pub struct Checkpoint {
    rx: watch::Receiver<u64>,
    baseline: u64,
}

impl Checkpoint {
    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow() != self.baseline
    }

    /// Resolves once an interrupt newer than the checkpoint arrives
    pub async fn interrupted(&mut self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ============================================================================
// Interruptible waits
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Interrupted,
}

/// Sleep for `duration` unless interrupted first
pub async fn pause(clock: &dyn Clock, checkpoint: &mut Checkpoint, duration: Duration) -> WaitOutcome {
    if checkpoint.is_interrupted() {
        return WaitOutcome::Interrupted;
    }

    tokio::select! {
        biased;
        _ = checkpoint.interrupted() => WaitOutcome::Interrupted,
        _ = clock.sleep(duration) => WaitOutcome::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_simulated_clock_fast_forwards() {
        let clock = SimulatedClock::new(start());
        clock.sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(90));
        assert!(clock.is_simulated());
        assert!(!SystemClock.is_simulated());
    }

    #[tokio::test]
    async fn test_pause_interrupted() {
        let clock = SimulatedClock::new(start());
        let signal = InterruptSignal::new();
        let mut checkpoint = signal.checkpoint();
        signal.interrupt();

        let outcome = pause(&clock, &mut checkpoint, Duration::from_secs(30)).await;
        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert_eq!(clock.now(), start());
    }

    #[tokio::test]
    async fn test_interrupt_during_real_sleep() {
        let signal = InterruptSignal::new();
        let mut checkpoint = signal.checkpoint();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.interrupt();
        });

        let outcome = pause(&SystemClock, &mut checkpoint, Duration::from_secs(30)).await;
        assert_eq!(outcome, WaitOutcome::Interrupted);
    }

    #[test]
    fn test_checkpoint_ignores_older_interrupts() {
        let signal = InterruptSignal::new();
        signal.interrupt();
        let checkpoint = signal.checkpoint();
        assert!(!checkpoint.is_interrupted());
        assert_eq!(signal.interrupt_count(), 1);
    }

    #[test]
    fn test_double_interrupt_terminates() {
        let signal = InterruptSignal::new();
        signal.interrupt();
        assert!(!signal.is_terminated());
        signal.interrupt();
        assert!(signal.is_terminated());
    }

    #[test]
    fn test_terminate() {
        let signal = InterruptSignal::new();
        let checkpoint = signal.checkpoint();
        signal.terminate();
        assert!(signal.is_terminated());
        assert!(checkpoint.is_interrupted());
    }
}
