use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use acp_observer::acp::{AcpClient, ObservatoryClient, SimulatedObservatory};
use acp_observer::config::Config;
use acp_observer::error::ObserverErrorTrait;
use acp_observer::execution::{ObservationOrchestrator, ObservationStatus, TargetTransition};
use acp_observer::scheduler::{Clock, InterruptSignal, SimulatedClock, SystemClock, TargetScheduleQueue};
use acp_observer::utils::{format_clock, format_duration};

pub struct RunParams {
    pub config: PathBuf,
    pub dry_run: bool,
    pub queue: Option<PathBuf>,
    pub save_queue: Option<PathBuf>,
}

pub async fn run(params: RunParams) -> Result<()> {
    let config = Config::load(&params.config)?;
    let settings = config.run_settings()?;

    let mut queue = match &params.queue {
        Some(path) => TargetScheduleQueue::load(path)
            .await
            .with_context(|| format!("Failed to load queue file: {}", path.display()))?,
        None => TargetScheduleQueue::from_targets(config.targets()?),
    };

    println!("{}", queue.summary(Utc::now(), settings.global_stop_time).display());

    let (client, clock): (Arc<dyn ObservatoryClient>, Arc<dyn Clock>) = if params.dry_run {
        println!("Dry run: simulated observatory and clock");
        (
            Arc::new(SimulatedObservatory::new(config.monitor.simulated_busy_polls)),
            Arc::new(SimulatedClock::starting_now()),
        )
    } else {
        let client = AcpClient::new(&config.server).context("Failed to create ACP client")?;
        (Arc::new(client), Arc::new(SystemClock))
    };

    let signal = InterruptSignal::new();
    spawn_interrupt_listener(signal.clone());

    let orchestrator = ObservationOrchestrator::new(
        client,
        config.meridian_calculator().simulated(params.dry_run),
        clock,
        signal,
    )
    .with_monitor_settings(config.monitor.settings())
    .with_status_callback(Arc::new(print_status))
    .with_transition_observer(Arc::new(print_transition));

    let outcome = orchestrator.run(&mut queue, &settings).await;

    // save whatever progress was made, even when the run itself failed
    if let Some(path) = &params.save_queue {
        queue
            .save(path, &config.imaging)
            .await
            .with_context(|| format!("Failed to save queue file: {}", path.display()))?;
        println!("Queue saved to {}", path.display());
    }

    let summary = outcome.inspect_err(|e| {
        tracing::error!(
            category = e.category().as_str(),
            recoverable = e.is_recoverable(),
            error = %e,
            "Observation run failed"
        );
        if e.is_recoverable() {
            eprintln!("The failure may be temporary; try the run again later");
        }
    })?;
    println!("\n{}", summary.display());
    Ok(())
}

/// First Ctrl+C interrupts the current wait, a second one ends the run
fn spawn_interrupt_listener(signal: InterruptSignal) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            signal.interrupt();
            if signal.is_terminated() {
                tracing::warn!("Second interrupt received, stopping the run");
                break;
            }
            tracing::warn!("Interrupted; press Ctrl+C again within 5 seconds to stop the run");
        }
    });
}

fn print_status(status: &ObservationStatus) {
    let remaining = status
        .estimated_duration
        .saturating_sub(status.elapsed);
    println!(
        "[{}] {} attempt {} | {:>3.0}% | filter {} | remaining ~{} | meridian {}",
        format_clock(&status.current_time),
        status.target_name,
        status.attempt,
        status.progress * 100.0,
        status.current_filter.as_deref().unwrap_or("-"),
        format_duration(chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())),
        status.meridian.phase,
    );
    if let Some(error) = &status.error {
        println!("    error: {error}");
    }
}

fn print_transition(change: &TargetTransition) {
    println!(
        "[{}] {}: {} -> {}",
        format_clock(&change.at),
        change.target_name,
        change.from,
        change.to
    );
}
