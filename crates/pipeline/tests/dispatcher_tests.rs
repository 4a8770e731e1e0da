//! Integration tests for admission, polling and terminal outcomes.
//!
//! Every test runs the real dispatcher against the stubs in `common`,
//! with millisecond poll intervals.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::*;
use tokio::sync::broadcast::error::TryRecvError;
use tunegen_core::error::GenerationError;
use tunegen_core::task::TaskStatus;
use tunegen_events::{LifecycleKind, Severity};
use tunegen_pipeline::EnqueueError;
use tunegen_provider::client::{JobStatusReport, ProviderError};

const NEVER: u32 = 100_000;

// ---------------------------------------------------------------------------
// Test: FIFO admission under the concurrency limit
// ---------------------------------------------------------------------------

/// Five tasks with a limit of three: the first three run, finishing task 2
/// admits task 4 while task 3 keeps running and task 5 keeps waiting.
#[tokio::test]
async fn completing_one_task_admits_the_oldest_queued_task() {
    let provider = StubProvider::new();
    let service = start(test_config(3, NEVER), provider.clone(), StubStore::new());

    let mut ids = Vec::new();
    for n in 1..=5 {
        ids.push(service.enqueue(request(&format!("t{n}"))).await.unwrap());
    }

    eventually(|| provider.created().len() == 3).await;
    let mut created = provider.created();
    created.sort();
    assert_eq!(created, vec!["job-t1", "job-t2", "job-t3"]);

    let statuses: Vec<_> = service
        .snapshot()
        .await
        .unwrap()
        .iter()
        .map(|s| s.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Processing,
            TaskStatus::Processing,
            TaskStatus::Processing,
            TaskStatus::Queued,
            TaskStatus::Queued,
        ]
    );

    provider.complete("job-t2", &["https://cdn.test/t2.mp3"]);
    let done = service.wait(ids[1]).await.unwrap();
    assert_eq!(done.status(), TaskStatus::Completed);

    eventually(|| provider.created().len() == 4).await;
    assert_eq!(provider.created()[3], "job-t4");

    let snapshot = service.snapshot().await.unwrap();
    let statuses: Vec<_> = snapshot.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Processing,
            TaskStatus::Processing,
            TaskStatus::Queued,
        ]
    );
    assert_eq!(snapshot[2].job.as_ref().map(|j| j.as_str()), Some("job-t3"));
    assert!(snapshot[4].job.is_none());

    service.shutdown().await;
}

/// Replaying the lifecycle stream never shows more than `limit` tasks
/// between `Started` and a terminal event.
#[tokio::test]
async fn processing_count_never_exceeds_limit() {
    let provider = StubProvider::auto_completing();
    let service = start(test_config(2, 50), provider.clone(), StubStore::new());
    let mut events = service.subscribe();

    let mut ids = Vec::new();
    for n in 0..8 {
        ids.push(service.enqueue(request(&format!("burst-{n}"))).await.unwrap());
    }
    for id in &ids {
        let task = service.wait(*id).await.unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    let mut running = 0usize;
    let mut peak = 0usize;
    let mut started = 0usize;
    loop {
        match events.try_recv() {
            Ok(event) => match event.kind {
                LifecycleKind::Started => {
                    started += 1;
                    running += 1;
                    peak = peak.max(running);
                }
                kind if kind.is_terminal() => running -= 1,
                _ => {}
            },
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected bus error: {e}"),
        }
    }

    assert_eq!(started, 8);
    assert_eq!(running, 0);
    assert!(peak <= 2, "peak concurrency was {peak}");

    service.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: terminal outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_without_results_fails_with_no_data() {
    let provider = StubProvider::new();
    provider.set_status("job-empty", Ok(JobStatusReport::new("Completed")));
    let service = start(test_config(3, 10), provider.clone(), StubStore::new());

    let id = service.enqueue(request("empty")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_matches!(task.error(), Some(GenerationError::NoData));
    assert_eq!(provider.polls("job-empty"), 1);
    assert!(task.job().is_none());
}

#[tokio::test]
async fn completed_with_malformed_results_fails_at_once() {
    let provider = StubProvider::new();
    let report: JobStatusReport =
        serde_json::from_str(r#"{"status":"completed","results":[{"audio_url":42}]}"#).unwrap();
    provider.set_status("job-garbled", Ok(report));
    let service = start(test_config(3, 10), provider.clone(), StubStore::new());

    let id = service.enqueue(request("garbled")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_matches!(task.error(), Some(GenerationError::NoData));
    assert_eq!(provider.polls("job-garbled"), 1);
}

#[tokio::test]
async fn exhausting_the_attempt_budget_times_out() {
    let provider = StubProvider::new();
    let service = start(test_config(3, 4), provider.clone(), StubStore::new());

    let id = service.enqueue(request("slow")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_matches!(task.error(), Some(GenerationError::Timeout { attempts: 4 }));
    assert_eq!(provider.polls("job-slow"), 4);
}

#[tokio::test]
async fn provider_failure_carries_payload() {
    let provider = StubProvider::new();
    provider.set_status(
        "job-doomed",
        Ok(JobStatusReport::new("ERROR").with_error(serde_json::json!({ "message": "quota" }))),
    );
    let service = start(test_config(3, 10), provider, StubStore::new());

    let id = service.enqueue(request("doomed")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_matches!(
        task.error(),
        Some(GenerationError::ProviderFailed { message, payload: Some(_) }) if message == "quota"
    );
}

#[tokio::test]
async fn creation_failure_frees_the_slot() {
    let provider = StubProvider::new();
    provider.fail_creation("reject", ProviderError::InvalidRequest("bad genre".into()));
    provider.complete("job-next", &["https://cdn.test/next.mp3"]);
    let service = start(test_config(1, 10), provider.clone(), StubStore::new());

    let rejected = service.enqueue(request("reject")).await.unwrap();
    let next = service.enqueue(request("next")).await.unwrap();

    let rejected = service.wait(rejected).await.unwrap();
    assert_matches!(rejected.error(), Some(GenerationError::InvalidRequest { .. }));
    assert!(rejected.job().is_none());

    let next = service.wait(next).await.unwrap();
    assert_eq!(next.status(), TaskStatus::Completed);
    assert_eq!(provider.created(), vec!["job-next"]);
}

#[tokio::test]
async fn partial_materialization_keeps_survivors() {
    let provider = StubProvider::new();
    provider.complete("job-trio", &["https://a.mp3", "https://bad.mp3", "https://c.mp3"]);
    let store = StubStore::failing(&["https://bad.mp3"]);
    let service = start(test_config(3, 10), provider, store.clone());

    let id = service.enqueue(request("trio")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    let tracks = task.tracks().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].artifact.as_str(), "local/https://a.mp3");
    assert_eq!(tracks[1].artifact.as_str(), "local/https://c.mp3");
    assert_eq!(store.fetched().len(), 3);
}

#[tokio::test]
async fn no_materialized_item_is_no_data() {
    let provider = StubProvider::new();
    provider.complete("job-lost", &["https://bad.mp3"]);
    let service = start(
        test_config(3, 10),
        provider,
        StubStore::failing(&["https://bad.mp3"]),
    );

    let id = service.enqueue(request("lost")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_matches!(task.error(), Some(GenerationError::NoData));
}

#[tokio::test]
async fn intermediate_faults_are_swallowed() {
    let provider = StubProvider::new();
    provider.set_status("job-flaky", Err(ProviderError::Decode("truncated".into())));
    let service = start(test_config(3, 50), provider.clone(), StubStore::new());

    let id = service.enqueue(request("flaky")).await.unwrap();
    eventually(|| provider.polls("job-flaky") >= 2).await;
    provider.complete("job-flaky", &["https://cdn.test/flaky.mp3"]);

    let task = service.wait(id).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
}

// ---------------------------------------------------------------------------
// Test: enqueue rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entitlement_denial_rejects_before_queueing() {
    let provider = StubProvider::new();
    let service = start_with_gate(
        test_config(3, 10),
        provider.clone(),
        StubStore::new(),
        Arc::new(DenyAll),
    );

    let result = service.enqueue(request("paid")).await;

    assert_matches!(result, Err(EnqueueError::NotEntitled { reason }) if reason.contains("Subscription"));
    assert!(service.snapshot().await.unwrap().is_empty());
    assert!(provider.created().is_empty());
}

#[tokio::test]
async fn invalid_request_is_rejected() {
    let service = start(test_config(3, 10), StubProvider::new(), StubStore::new());

    let result = service
        .enqueue(request("x").instrumental().with_lyrics("la la"))
        .await;

    assert_matches!(
        result,
        Err(EnqueueError::InvalidRequest(GenerationError::InvalidRequest { .. }))
    );
    assert!(service.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn full_queue_rejects_enqueue() {
    let mut config = test_config(1, NEVER);
    config.queue_capacity = 1;
    let service = start(config, StubProvider::new(), StubStore::new());

    service.enqueue(request("running")).await.unwrap();
    service.enqueue(request("waiting")).await.unwrap();
    let result = service.enqueue(request("overflow")).await;

    assert_matches!(result, Err(EnqueueError::QueueFull { capacity: 1 }));
    service.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: lifecycle and notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_events_follow_task_order() {
    let provider = StubProvider::new();
    let service = start(test_config(3, 50), provider.clone(), StubStore::new());
    let mut events = service.subscribe();

    let id = service.enqueue(request("ordered")).await.unwrap();
    eventually(|| provider.polls("job-ordered") >= 3).await;
    provider.complete("job-ordered", &["https://cdn.test/ordered.mp3"]);
    service.wait(id).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id, id);
        kinds.push(event.kind);
    }

    assert_matches!(kinds.first(), Some(LifecycleKind::Queued));
    assert_matches!(kinds.get(1), Some(LifecycleKind::Started));
    assert_matches!(kinds.get(2), Some(LifecycleKind::JobCreated { .. }));
    assert_matches!(kinds.last(), Some(LifecycleKind::Completed { tracks: 1 }));

    let fractions: Vec<f64> = kinds
        .iter()
        .filter_map(|k| match k {
            LifecycleKind::Progress { progress, .. } => Some(progress.fraction),
            _ => None,
        })
        .collect();
    assert!(fractions.len() >= 2);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn notifications_are_pushed_and_expire() {
    let provider = StubProvider::auto_completing();
    let service = start(test_config(3, 10), provider, StubStore::new());
    let sink = service.notifications().clone();
    let mut watcher = service.watch_notifications();

    let id = service.enqueue(request("notify")).await.unwrap();
    service.wait(id).await.unwrap();

    let severities: Vec<_> = sink.snapshot().iter().map(|n| n.severity).collect();
    assert_eq!(severities, vec![Severity::Info, Severity::Success]);
    assert!(watcher.has_changed().unwrap());
    let watched: Vec<_> = watcher.borrow_and_update().iter().map(|n| n.severity).collect();
    assert_eq!(watched, severities);

    eventually(|| sink.is_empty()).await;
}

#[tokio::test]
async fn maintenance_at_creation_raises_a_warning() {
    let provider = StubProvider::new();
    provider.fail_creation("down", ProviderError::ServiceUnavailable("maintenance".into()));
    let service = start(test_config(3, 10), provider, StubStore::new());

    let id = service.enqueue(request("down")).await.unwrap();
    let task = service.wait(id).await.unwrap();

    assert_matches!(task.error(), Some(GenerationError::ServiceUnavailable { .. }));
    assert!(service
        .notifications()
        .snapshot()
        .iter()
        .any(|n| n.severity == Severity::Warning));
}

// ---------------------------------------------------------------------------
// Test: shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_interrupts_in_flight_tasks() {
    let provider = StubProvider::new();
    let service = start(test_config(1, NEVER), provider.clone(), StubStore::new());
    let mut events = service.subscribe();

    let running = service.enqueue(request("forever")).await.unwrap();
    service.enqueue(request("queued")).await.unwrap();
    eventually(|| provider.polls("job-forever") >= 1).await;

    service.shutdown().await;

    let mut interrupted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleKind::Failed { error } = event.kind {
            interrupted.push((event.task_id, error));
        }
    }
    assert_eq!(interrupted, vec![(running, GenerationError::Interrupted)]);
    assert!(service
        .notifications()
        .snapshot()
        .iter()
        .any(|n| n.severity == Severity::Error && n.message.contains("interrupted")));

    assert_matches!(
        service.enqueue(request("late")).await,
        Err(EnqueueError::DispatcherStopped)
    );
}
