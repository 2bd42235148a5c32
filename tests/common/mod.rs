//! Common test utilities

#![allow(dead_code)]

use acp_observer::acp::{AcpError, AcpResult, ObservatoryClient};
use acp_observer::models::{FilterExposure, ImagingPlan, StatusSnapshot, Target};
use acp_observer::scheduler::{Clock, InterruptSignal, SimulatedClock};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake observatory replaying scripted answers
///
/// Submissions and status polls pop from their scripts; once a script is
/// exhausted the fallback answer repeats forever.
pub struct ScriptedObservatory {
    connect_error: Mutex<Option<AcpError>>,
    submit_script: Mutex<VecDeque<Option<String>>>,
    submit_fallback: Option<String>,
    status_script: Mutex<VecDeque<AcpResult<StatusSnapshot>>>,
    status_fallback: StatusSnapshot,
    submissions: Mutex<Vec<String>>,
    stops: AtomicU32,
    status_polls: AtomicU32,
    connected: AtomicBool,
    disconnects: AtomicU32,
}

impl Default for ScriptedObservatory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedObservatory {
    /// Accepts every plan; every status poll reports idle
    pub fn new() -> Self {
        Self {
            connect_error: Mutex::new(None),
            submit_script: Mutex::new(VecDeque::new()),
            submit_fallback: None,
            status_script: Mutex::new(VecDeque::new()),
            status_fallback: StatusSnapshot::idle(),
            submissions: Mutex::new(Vec::new()),
            stops: AtomicU32::new(0),
            status_polls: AtomicU32::new(0),
            connected: AtomicBool::new(false),
            disconnects: AtomicU32::new(0),
        }
    }

    pub fn failing_connect(self, error: AcpError) -> Self {
        *self.connect_error.lock().unwrap() = Some(error);
        self
    }

    /// Every submission fails with `message` unless scripted otherwise
    pub fn failing_submits(mut self, message: &str) -> Self {
        self.submit_fallback = Some(message.to_string());
        self
    }

    /// Scripted submission results; `None` accepts, `Some(msg)` fails
    pub fn with_submits(self, script: Vec<Option<&str>>) -> Self {
        *self.submit_script.lock().unwrap() =
            script.into_iter().map(|s| s.map(str::to_string)).collect();
        self
    }

    pub fn with_statuses(self, script: Vec<AcpResult<StatusSnapshot>>) -> Self {
        *self.status_script.lock().unwrap() = script.into();
        self
    }

    pub fn with_status_fallback(mut self, snapshot: StatusSnapshot) -> Self {
        self.status_fallback = snapshot;
        self
    }

    /// Target names of every submitted plan, in order
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> u32 {
        self.status_polls.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObservatoryClient for ScriptedObservatory {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> AcpResult<()> {
        if let Some(error) = self.connect_error.lock().unwrap().take() {
            return Err(error);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn get_status(&self) -> AcpResult<StatusSnapshot> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        match self.status_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.status_fallback.clone()),
        }
    }

    async fn submit_plan(&self, plan: &ImagingPlan) -> AcpResult<()> {
        self.submissions.lock().unwrap().push(plan.target.clone());
        let scripted = self.submit_script.lock().unwrap().pop_front();
        match scripted.unwrap_or_else(|| self.submit_fallback.clone()) {
            Some(message) => Err(AcpError::warning(message)),
            None => Ok(()),
        }
    }

    async fn stop_current_operation(&self, _wait: Duration) -> AcpResult<bool> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Simulated clock that raises interrupts once time passes a trigger point
///
/// Firing happens inside `sleep`, so the interrupt lands while the caller
/// is suspended, the way a Ctrl+C would.
pub struct TriggerClock {
    inner: SimulatedClock,
    signal: InterruptSignal,
    fire_at: DateTime<Utc>,
    interrupts: u32,
    fired: AtomicBool,
}

impl TriggerClock {
    /// Raise `interrupts` interrupts back to back once `after` has elapsed
    pub fn new(
        start: DateTime<Utc>,
        signal: InterruptSignal,
        after: chrono::Duration,
        interrupts: u32,
    ) -> Self {
        Self {
            inner: SimulatedClock::new(start),
            signal,
            fire_at: start + after,
            interrupts,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for TriggerClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.inner.advance(duration);
        if self.inner.now() >= self.fire_at && !self.fired.swap(true, Ordering::SeqCst) {
            for _ in 0..self.interrupts {
                self.signal.interrupt();
            }
        }
        tokio::task::yield_now().await;
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Current time truncated to whole seconds
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Target with a single short luminance filter and meridian waits off
pub fn create_test_target(name: &str, start: DateTime<Utc>) -> Target {
    Target::new(name, "05:34:31", "+22:00:52", start)
        .with_filter(FilterExposure::new(0, "L", 60.0, 2))
        .with_meridian_wait(false)
}

/// Target imaging L and R
pub fn create_two_filter_target(name: &str, start: DateTime<Utc>) -> Target {
    Target::new(name, "00:42:44", "+41:16:09", start)
        .with_filters(vec![
            FilterExposure::new(0, "L", 120.0, 3),
            FilterExposure::new(1, "R", 60.0, 2),
        ])
        .with_meridian_wait(false)
}
