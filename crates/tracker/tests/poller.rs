//! Poll loop behaviour on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use brousla_core::operation::{ErrorKind, OperationStatus};
use brousla_core::policy::{Budget, PolicyKind, PolicyTable};
use brousla_events::OperationEventKind;
use brousla_tracker::TrackRequest;
use common::{registry, table_with, transitions, ScriptedAdapter, Step};
use tokio::time::Instant;

use OperationStatus::{Cancelled, Completed, Pending, Running};

#[tokio::test(start_paused = true)]
async fn generation_completes_after_third_poll() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Pending, Step::Pending, Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-1", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let mut sub = handle.subscribe();
    let op = handle.wait().await;

    assert_eq!(op.status(), Completed);
    assert_eq!(op.attempts(), 3);
    assert_eq!(adapter.checks(), 3);
    assert_eq!(adapter.fetches(), 1);
    assert_eq!(op.result().unwrap()["id"], "prompt-1");
    assert!(op.error().is_none());
    assert_eq!(
        transitions(&mut sub).await,
        vec![(Pending, Running), (Running, Completed)]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_is_honoured_with_one_final_check() {
    let table = table_with(
        PolicyKind::GenerationImage,
        100,
        Budget::Timeout(Duration::from_millis(1000)),
        true,
    );
    let registry = registry(table);
    let adapter = Arc::new(ScriptedAdapter::always(PolicyKind::GenerationImage, Step::Pending));

    let started = Instant::now();
    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-2", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let op = handle.wait().await;
    let elapsed = started.elapsed();

    assert_eq!(op.status(), OperationStatus::TimedOut);
    assert_eq!(op.error().unwrap().kind, ErrorKind::Timeout);
    assert!(op.result().is_none());
    assert!(
        elapsed >= Duration::from_millis(1000) && elapsed <= Duration::from_millis(1100),
        "timed out after {elapsed:?}"
    );
    // Ten budgeted polls plus the final reconciliation check.
    assert_eq!(adapter.checks(), 11);
    assert_eq!(op.attempts(), 11);
    assert_eq!(adapter.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn final_check_can_still_complete() {
    let table = table_with(
        PolicyKind::GenerationVideo,
        100,
        Budget::Timeout(Duration::from_millis(300)),
        true,
    );
    let registry = registry(table);
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationVideo,
        vec![Step::Pending, Step::Pending, Step::Pending, Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-3", PolicyKind::GenerationVideo))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), Completed);
    assert_eq!(adapter.checks(), 4);
    assert_eq!(adapter.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn oauth_times_out_after_five_minutes_and_stops_polling() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::always(PolicyKind::OAuthSignIn, Step::Pending));

    let started = Instant::now();
    let handle = registry
        .track(adapter.clone(), TrackRequest::new("state-1", PolicyKind::OAuthSignIn))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), OperationStatus::TimedOut);
    assert_eq!(started.elapsed(), Duration::from_secs(300));
    // 2 s interval, no final check.
    assert_eq!(adapter.checks(), 150);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(adapter.checks(), 150);
}

#[tokio::test(start_paused = true)]
async fn checkout_waits_for_start_delay_then_counts_attempts() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::always(PolicyKind::CheckoutSuccess, Step::Pending));

    let started = Instant::now();
    let handle = registry
        .track(adapter.clone(), TrackRequest::new("cs_1", PolicyKind::CheckoutSuccess))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(adapter.checks(), 0);

    let op = handle.wait().await;
    assert_eq!(op.status(), OperationStatus::TimedOut);
    // 15 attempts plus the final check.
    assert_eq!(adapter.checks(), 16);
    assert_eq!(started.elapsed(), Duration::from_secs(32));
}

#[tokio::test(start_paused = true)]
async fn network_failures_are_retried_within_budget() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Network, Step::Network, Step::Running(Some(50)), Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-4", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), Completed);
    assert_eq!(adapter.checks(), 4);
    assert_eq!(op.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn offline_failure_terminates_immediately() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Offline],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-5", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), OperationStatus::Error);
    assert_eq!(op.error().unwrap().kind, ErrorKind::Offline);
    assert_eq!(adapter.checks(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_error_status_is_a_domain_failure() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Running(None), Step::Failed("KSampler: out of memory")],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-6", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), OperationStatus::Error);
    let error = op.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Domain);
    assert_eq!(error.message, "KSampler: out of memory");
    assert_eq!(adapter.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_finalizes_error_without_retry() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(
        ScriptedAdapter::new(PolicyKind::GenerationImage, vec![Step::Completed], Step::Pending)
            .failing_fetch(),
    );

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-7", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let op = handle.wait().await;

    assert_eq!(op.status(), OperationStatus::Error);
    assert_eq!(op.error().unwrap().kind, ErrorKind::Network);
    assert_eq!(adapter.fetches(), 1);
    assert_eq!(adapter.checks(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_in_flight_check_wins_over_late_completion() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::always(PolicyKind::GenerationImage, Step::Pending));
    adapter.gate_next_check();

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-8", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let mut sub = handle.subscribe();

    adapter.entered.notified().await;
    assert!(handle.cancel());
    adapter.push_front(Step::Completed);
    adapter.release.notify_one();

    let op = handle.wait().await;
    assert_eq!(op.status(), Cancelled);
    assert!(op.result().is_none());
    assert!(op.error().is_none());
    assert_eq!(adapter.fetches(), 0);
    assert_eq!(adapter.cancels(), 1);
    assert_eq!(transitions(&mut sub).await, vec![(Pending, Cancelled)]);
}

#[tokio::test(start_paused = true)]
async fn cancel_wakes_a_sleeping_poller() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::always(PolicyKind::WorkflowActivation, Step::Pending));

    let started = Instant::now();
    let handle = registry
        .track(adapter.clone(), TrackRequest::new("wf-1", PolicyKind::WorkflowActivation))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(registry.cancel(handle.id()).await);
    let op = handle.wait().await;

    assert_eq!(op.status(), Cancelled);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    assert_eq!(adapter.checks(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_running_policy_ignores_plain_pending() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::WorkflowActivation,
        vec![Step::Pending, Step::Running(None), Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("wf-2", PolicyKind::WorkflowActivation))
        .await
        .unwrap();
    let mut sub = handle.subscribe();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.snapshot().status(), Pending);

    let op = handle.wait().await;
    assert_eq!(op.status(), Completed);

    let mut running_at = None;
    while let Some(event) = sub.recv().await {
        if event.as_transition() == Some((Pending, Running)) {
            running_at = Some(event.attempts);
        }
    }
    assert_eq!(running_at, Some(2));
}

#[tokio::test(start_paused = true)]
async fn progress_events_are_distinct_from_transitions() {
    let registry = registry(PolicyTable::default());
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Running(Some(10)), Step::Running(Some(10)), Step::Running(Some(60)), Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter.clone(), TrackRequest::new("prompt-9", PolicyKind::GenerationImage))
        .await
        .unwrap();
    let mut sub = handle.subscribe();
    handle.wait().await;

    let mut progress = Vec::new();
    let mut last_attempts = 0;
    while let Some(event) = sub.recv().await {
        assert!(event.attempts >= last_attempts, "events out of order");
        last_attempts = event.attempts;
        if let OperationEventKind::Progress { percent, .. } = event.kind {
            progress.push(percent);
        }
    }
    // Repeated 10% is not re-emitted; completion sets 100 through the transition.
    assert_eq!(progress, vec![Some(10), Some(60)]);
    assert_eq!(handle.snapshot().progress(), Some(100));
}

#[tokio::test(start_paused = true)]
async fn bus_receives_every_transition() {
    let registry = registry(PolicyTable::default());
    let mut bus_rx = registry.bus().subscribe();
    let adapter = Arc::new(ScriptedAdapter::new(
        PolicyKind::GenerationImage,
        vec![Step::Completed],
        Step::Pending,
    ));

    let handle = registry
        .track(adapter, TrackRequest::new("prompt-10", PolicyKind::GenerationImage))
        .await
        .unwrap();
    handle.wait().await;

    let event = bus_rx.recv().await.unwrap();
    match event {
        brousla_events::TrackerEvent::Operation(event) => {
            assert_eq!(event.as_transition(), Some((Pending, Completed)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
