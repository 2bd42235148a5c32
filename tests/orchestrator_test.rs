//! End-to-end tests for ObservationOrchestrator
//!
//! The orchestrator drives a scripted observatory on a simulated clock;
//! waits for start times fast-forward instantly.

mod common;

use acp_observer::acp::AcpError;
use acp_observer::error::Error;
use acp_observer::execution::{
    ErrorKind, ObservationOrchestrator, RunSettings, TargetTransition,
};
use acp_observer::meridian::{MeridianFlipCalculator, MeridianFlipConfig, ObservatoryLocation};
use acp_observer::models::{StatusSnapshot, TargetStatus};
use acp_observer::scheduler::{Clock, InterruptSignal, SimulatedClock, TargetScheduleQueue};
use chrono::Duration as ChronoDuration;
use common::{
    create_test_target, create_two_filter_target, now_seconds, ScriptedObservatory, TriggerClock,
};
use std::sync::{Arc, Mutex};

struct Harness {
    observatory: Arc<ScriptedObservatory>,
    clock: Arc<SimulatedClock>,
    signal: InterruptSignal,
    transitions: Arc<Mutex<Vec<TargetTransition>>>,
    orchestrator: ObservationOrchestrator,
}

fn harness(observatory: ScriptedObservatory) -> Harness {
    let observatory = Arc::new(observatory);
    let clock = Arc::new(SimulatedClock::new(now_seconds()));
    let signal = InterruptSignal::new();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = transitions.clone();

    let orchestrator =
        ObservationOrchestrator::new(observatory.clone(), calculator(), clock.clone(), signal.clone())
            .with_transition_observer(Arc::new(move |t: &TargetTransition| {
                sink.lock().unwrap().push(t.clone())
            }));

    Harness {
        observatory,
        clock,
        signal,
        transitions,
        orchestrator,
    }
}

fn calculator() -> MeridianFlipCalculator {
    MeridianFlipCalculator::new(
        ObservatoryLocation::new(40.0, 116.4),
        MeridianFlipConfig::default(),
    )
    .simulated(true)
}

/// Orchestrator on a clock that interrupts `interrupts` times after `after`
fn interrupting(
    observatory: ScriptedObservatory,
    after: ChronoDuration,
    interrupts: u32,
) -> (Arc<ScriptedObservatory>, Arc<TriggerClock>, InterruptSignal, ObservationOrchestrator) {
    let observatory = Arc::new(observatory);
    let signal = InterruptSignal::new();
    let clock = Arc::new(TriggerClock::new(now_seconds(), signal.clone(), after, interrupts));
    let orchestrator =
        ObservationOrchestrator::new(observatory.clone(), calculator(), clock.clone(), signal.clone());
    (observatory, clock, signal, orchestrator)
}

fn status_of(queue: &TargetScheduleQueue, name: &str) -> TargetStatus {
    queue
        .iter()
        .find(|t| t.name == name)
        .map(|t| t.status)
        .expect("target in queue")
}

#[tokio::test]
async fn test_global_stop_time_end_to_end() {
    let h = harness(ScriptedObservatory::new().with_statuses(vec![
        Ok(StatusSnapshot::running().with_filter("L")),
        Ok(StatusSnapshot::running().with_filter("R")),
        Ok(StatusSnapshot::idle()),
    ]));
    let now = h.clock.now();

    let mut queue = TargetScheduleQueue::from_targets([
        create_two_filter_target("A", now),
        create_test_target("B", now + ChronoDuration::hours(1)),
    ]);
    let settings = RunSettings {
        global_stop_time: Some(now + ChronoDuration::minutes(30)),
        ..RunSettings::default()
    };

    let summary = h.orchestrator.run(&mut queue, &settings).await.unwrap();

    assert_eq!(summary.completed_count, 1);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(status_of(&queue, "A"), TargetStatus::Completed);
    assert_ne!(status_of(&queue, "B"), TargetStatus::Completed);
    assert_eq!(h.observatory.submissions(), vec!["A"]);
    assert_eq!(h.observatory.disconnect_count(), 1);
    assert!(!queue.is_running());

    let transitions = h.transitions.lock().unwrap();
    let a: Vec<_> = transitions
        .iter()
        .filter(|t| t.target_name == "A")
        .map(|t| (t.from, t.to))
        .collect();
    assert_eq!(
        a,
        vec![
            (TargetStatus::Waiting, TargetStatus::Running),
            (TargetStatus::Running, TargetStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_empty_queue_is_an_error() {
    let h = harness(ScriptedObservatory::new());
    let mut queue = TargetScheduleQueue::new();

    let result = h.orchestrator.run(&mut queue, &RunSettings::default()).await;

    assert!(matches!(result, Err(Error::EmptyQueue)));
    assert_eq!(h.observatory.disconnect_count(), 0);
}

#[tokio::test]
async fn test_connect_failure_is_an_error() {
    let h = harness(ScriptedObservatory::new().failing_connect(AcpError::Unauthorized {
        url: String::from("http://acp/index.asp"),
    }));
    let mut queue = TargetScheduleQueue::from_targets([create_test_target("A", h.clock.now())]);

    let result = h.orchestrator.run(&mut queue, &RunSettings::default()).await;

    assert!(matches!(result, Err(Error::ConnectionFailed(_))));
    assert!(h.observatory.submissions().is_empty());
    assert_eq!(status_of(&queue, "A"), TargetStatus::Waiting);
    assert!(!queue.is_running());
}

#[tokio::test]
async fn test_stale_target_is_skipped() {
    let h = harness(ScriptedObservatory::new());
    let now = h.clock.now();
    let mut queue = TargetScheduleQueue::from_targets([
        create_test_target("late", now - ChronoDuration::hours(2)),
        create_test_target("fresh", now),
    ]);

    let summary = h
        .orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    assert_eq!(summary.skipped_count, 1);
    assert_eq!(summary.completed_count, 1);
    assert_eq!(status_of(&queue, "late"), TargetStatus::Skipped);
    assert_eq!(status_of(&queue, "fresh"), TargetStatus::Completed);
    assert_eq!(h.observatory.submissions(), vec!["fresh"]);
}

#[tokio::test]
async fn test_waits_for_future_start() {
    let h = harness(ScriptedObservatory::new());
    let now = h.clock.now();
    let mut queue =
        TargetScheduleQueue::from_targets([create_test_target("later", now + ChronoDuration::minutes(10))]);

    let summary = h
        .orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    assert_eq!(summary.completed_count, 1);
    assert!(h.clock.now() >= now + ChronoDuration::minutes(10));
}

#[tokio::test]
async fn test_failed_target_does_not_stop_run() {
    let h = harness(
        ScriptedObservatory::new().with_submits(vec![Some("imaging plan rejected: bad filter"), None]),
    );
    let now = h.clock.now();
    let mut queue = TargetScheduleQueue::from_targets([
        create_test_target("first", now),
        create_test_target("second", now + ChronoDuration::minutes(5)),
    ]);

    let summary = h
        .orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.completed_count, 1);
    assert_eq!(summary.results[0].target_name, "first");
    assert_eq!(summary.results[0].error_kind, Some(ErrorKind::ImagingPlanFailed));
    assert_eq!(summary.results[0].attempts, 1);
    assert_eq!(status_of(&queue, "first"), TargetStatus::Failed);
    assert_eq!(status_of(&queue, "second"), TargetStatus::Completed);
}

#[tokio::test]
async fn test_priority_breaks_start_time_ties() {
    let h = harness(ScriptedObservatory::new());
    let now = h.clock.now();
    let mut queue = TargetScheduleQueue::new();
    queue.add(create_test_target("low", now).with_priority(5));
    queue.add(create_test_target("high", now).with_priority(1));

    h.orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    assert_eq!(h.observatory.submissions(), vec!["high", "low"]);
}

#[tokio::test]
async fn test_terminated_run_processes_nothing() {
    let h = harness(ScriptedObservatory::new());
    let mut queue = TargetScheduleQueue::from_targets([create_test_target("A", h.clock.now())]);
    h.signal.terminate();

    let summary = h
        .orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    assert!(summary.terminated_early);
    assert!(summary.results.is_empty());
    assert_eq!(status_of(&queue, "A"), TargetStatus::Waiting);
    assert_eq!(h.observatory.disconnect_count(), 1);
}

#[tokio::test]
async fn test_at_most_one_running_target() {
    let h = harness(ScriptedObservatory::new());
    let now = h.clock.now();
    let mut queue = TargetScheduleQueue::from_targets([
        create_test_target("A", now),
        create_test_target("B", now + ChronoDuration::minutes(1)),
        create_test_target("C", now + ChronoDuration::minutes(2)),
    ]);

    h.orchestrator
        .run(&mut queue, &RunSettings::default())
        .await
        .unwrap();

    let transitions = h.transitions.lock().unwrap();
    let mut running = 0i32;
    for t in transitions.iter() {
        assert!(t.from.can_transition_to(t.to));
        if t.to == TargetStatus::Running {
            running += 1;
        }
        if t.from == TargetStatus::Running {
            running -= 1;
        }
        assert!((0..=1).contains(&running));
    }
    assert_eq!(transitions.len(), 6);
}

#[tokio::test]
async fn test_interrupt_skips_start_wait() {
    let (observatory, clock, signal, orchestrator) =
        interrupting(ScriptedObservatory::new(), ChronoDuration::minutes(1), 1);
    let start = clock.now();
    let mut queue =
        TargetScheduleQueue::from_targets([create_test_target("later", start + ChronoDuration::hours(3))]);

    let summary = orchestrator.run(&mut queue, &RunSettings::default()).await.unwrap();

    assert!(clock.has_fired());
    assert!(!signal.is_terminated());
    assert_eq!(summary.completed_count, 1);
    assert!(!summary.terminated_early);
    assert_eq!(observatory.submissions(), vec!["later"]);
    assert_eq!(status_of(&queue, "later"), TargetStatus::Completed);
    assert!(clock.now() < start + ChronoDuration::hours(3));
}

#[tokio::test]
async fn test_double_interrupt_during_execution_ends_run() {
    let (observatory, clock, signal, orchestrator) = interrupting(
        ScriptedObservatory::new().with_status_fallback(StatusSnapshot::running()),
        ChronoDuration::minutes(2),
        2,
    );
    let start = clock.now();
    let mut queue = TargetScheduleQueue::from_targets([
        create_test_target("A", start),
        create_test_target("B", start + ChronoDuration::minutes(10)),
    ]);

    let summary = orchestrator.run(&mut queue, &RunSettings::default()).await.unwrap();

    assert!(signal.is_terminated());
    assert!(summary.terminated_early);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].error_kind, Some(ErrorKind::UserInterrupted));
    assert_eq!(status_of(&queue, "A"), TargetStatus::Failed);
    assert_eq!(status_of(&queue, "B"), TargetStatus::Waiting);
    assert_eq!(observatory.submissions(), vec!["A"]);
    assert_eq!(observatory.disconnect_count(), 1);
    assert!(!queue.is_running());
}
