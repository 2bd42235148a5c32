//! Dry-run observatory
//!
//! Accepts every request. After a plan is submitted the observatory reports
//! itself busy for a fixed number of status polls and then idle, so a dry
//! run walks the whole schedule without touching real hardware.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use super::error::{AcpError, AcpResult};
use super::ObservatoryClient;
use crate::models::{ImagingPlan, StatusSnapshot};

/// Polls a simulated plan stays busy by default
pub const DEFAULT_BUSY_POLLS: u32 = 3;

#[derive(Debug)]
pub struct SimulatedObservatory {
    busy_polls: u32,
    connected: AtomicBool,
    remaining_polls: AtomicU32,
    current_filter: Mutex<Option<String>>,
    submitted: AtomicU32,
}

impl Default for SimulatedObservatory {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_POLLS)
    }
}

impl SimulatedObservatory {
    pub fn new(busy_polls: u32) -> Self {
        Self {
            busy_polls,
            connected: AtomicBool::new(false),
            remaining_polls: AtomicU32::new(0),
            current_filter: Mutex::new(None),
            submitted: AtomicU32::new(0),
        }
    }

    /// Number of plans accepted so far
    pub fn submitted_plans(&self) -> u32 {
        self.submitted.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> AcpResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AcpError::NotConnected)
        }
    }
}

#[async_trait]
impl ObservatoryClient for SimulatedObservatory {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(&self) -> AcpResult<()> {
        info!("Connected to simulated observatory");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from simulated observatory");
    }

    async fn get_status(&self) -> AcpResult<StatusSnapshot> {
        self.check_connected()?;

        let busy = self
            .remaining_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let filter = self
            .current_filter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        Ok(StatusSnapshot {
            is_running: busy,
            current_filter: filter.filter(|_| busy),
            error: None,
            plan_progress: None,
        })
    }

    async fn submit_plan(&self, plan: &ImagingPlan) -> AcpResult<()> {
        self.check_connected()?;
        info!(
            target = %plan.target,
            filters = %plan.filter_summary(),
            "Simulated imaging plan accepted"
        );
        *self.current_filter.lock().unwrap_or_else(|e| e.into_inner()) =
            plan.filters.first().map(|f| f.display_name());
        self.remaining_polls.store(self.busy_polls, Ordering::SeqCst);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_current_operation(&self, _wait: Duration) -> AcpResult<bool> {
        self.check_connected()?;
        self.remaining_polls.store(0, Ordering::SeqCst);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterExposure, ImagingDefaults, Target};
    use chrono::Utc;

    #[tokio::test]
    async fn test_busy_then_idle() {
        let obs = SimulatedObservatory::new(2);
        assert!(obs.get_status().await.is_err());
        obs.connect().await.unwrap();

        let plan = Target::new("M1", "05:34:31", "+22:00:52", Utc::now())
            .with_filter(FilterExposure::new(0, "L", 60.0, 1))
            .imaging_plan(&ImagingDefaults::default());
        obs.submit_plan(&plan).await.unwrap();

        let first = obs.get_status().await.unwrap();
        assert!(first.is_running);
        assert_eq!(first.current_filter.as_deref(), Some("L"));
        assert!(obs.get_status().await.unwrap().is_running);
        assert!(!obs.get_status().await.unwrap().is_running);
        assert_eq!(obs.submitted_plans(), 1);
    }
}
