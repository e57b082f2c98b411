mod common;

use chrono::Duration;
use common::{FailingResults, Harness, SLOW};
use grcmon_common::types::{ResultStatus, RunStatus, TriggerType};
use grcmon_executor::{AdapterError, ExecutionOutcome};
use grcmon_worker::runner::{DEADLINE_EXCEEDED, NO_EXECUTOR};
use std::sync::Arc;

#[tokio::test]
async fn unknown_test_type_records_error() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| t.test_type = "quantum_probe".to_string())
        .await;

    let report = h.runner().poll_and_run(h.now()).await.unwrap();
    assert_eq!(report.runs[0].counters.errors, 1);

    let results = h.store.list_results_for_test("t1", &test.id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Error);
    assert_eq!(results[0].error_message.as_deref(), Some(NO_EXECUTOR));
    assert_eq!(results[0].attempts, 0);
    // Errored tests still advance.
    assert!(h.test(&test).await.next_run_at.unwrap() > h.now());
}

#[tokio::test]
async fn slow_executor_hits_deadline() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| {
            t.test_type = SLOW.to_string();
            t.timeout_seconds = 1;
        })
        .await;

    let report = h.runner().poll_and_run(h.now()).await.unwrap();
    assert_eq!(report.runs[0].status, RunStatus::Completed);
    assert_eq!(report.runs[0].counters.errors, 1);

    let results = h.store.list_results_for_test("t1", &test.id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Error);
    assert_eq!(results[0].error_message.as_deref(), Some(DEADLINE_EXCEEDED));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| t.retry_count = 2)
        .await;
    h.scripted
        .push(Err(AdapterError::Transient("connection reset".to_string())));
    h.scripted
        .push(Err(AdapterError::Transient("connection reset".to_string())));
    h.scripted.push(Ok(ExecutionOutcome::pass()));

    h.runner().poll_and_run(h.now()).await.unwrap();

    assert_eq!(h.scripted.calls(), 3);
    let results = h.store.list_results_for_test("t1", &test.id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Pass);
    assert_eq!(results[0].attempts, 3);
}

#[tokio::test]
async fn retries_exhausted_records_error() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| t.retry_count = 1)
        .await;
    for _ in 0..3 {
        h.scripted
            .push(Err(AdapterError::Transient("throttled".to_string())));
    }

    h.runner().poll_and_run(h.now()).await.unwrap();

    assert_eq!(h.scripted.calls(), 2);
    let results = h.store.list_results_for_test("t1", &test.id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Error);
    assert_eq!(results[0].attempts, 2);
    assert!(results[0].error_message.as_deref().unwrap().contains("throttled"));
}

#[tokio::test]
async fn terminal_failure_is_not_retried() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| t.retry_count = 3)
        .await;
    h.scripted
        .push(Err(AdapterError::Failed("bad credentials".to_string())));

    h.runner().poll_and_run(h.now()).await.unwrap();

    assert_eq!(h.scripted.calls(), 1);
    let results = h.store.list_results_for_test("t1", &test.id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Error);
    assert!(results[0].error_message.as_deref().unwrap().contains("bad credentials"));
}

#[tokio::test]
async fn one_failing_test_does_not_stop_the_batch() {
    let h = Harness::new().await;
    h.add_test("t1", "A").await;
    h.add_test("t1", "B").await;
    h.add_test("t1", "C").await;
    h.scripted.push_status(ResultStatus::Pass);
    h.scripted
        .push(Err(AdapterError::Failed("boom".to_string())));
    h.scripted.push_status(ResultStatus::Warning);

    let report = h.runner().poll_and_run(h.now()).await.unwrap();
    let counters = report.runs[0].counters;
    assert_eq!(counters.total, 3);
    assert_eq!(counters.passed, 1);
    assert_eq!(counters.errors, 1);
    assert_eq!(counters.warnings, 1);
    assert_eq!(counters.recorded(), counters.total);
}

#[tokio::test]
async fn persistence_failure_fails_the_run() {
    let h = Harness::new().await;
    let first = h.add_test("t1", "A").await;
    let second = h
        .add_test_with("t1", "B", |t| t.next_run_at = Some(h.now()))
        .await;
    let store = Arc::new(FailingResults::new(h.store.clone(), 1));

    let report = h.runner_on(store).poll_and_run(h.now()).await.unwrap();
    let summary = &report.runs[0];
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.error_message.as_deref().unwrap().contains("injected failure"));

    let run = h.store.get_run("t1", &summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.counters.total, 2);
    assert_eq!(run.counters.passed, 1);

    let results = h.store.list_results_for_run("t1", &run.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(h.test(&first).await.last_run_at.is_some());
    assert_eq!(h.test(&second).await.last_run_at, None);
    // The failed run releases the tenant.
    assert!(!h.store.tenant_has_active_run("t1").await.unwrap());
}

#[tokio::test]
async fn manual_trigger_runs_selected_tests() {
    let h = Harness::new().await;
    let chosen = h
        .add_test_with("t1", "A", |t| t.next_run_at = Some(h.now() + Duration::days(1)))
        .await;
    let other = h.add_test("t1", "B").await;
    let foreign = h.add_test("t2", "C").await;

    let summary = h
        .runner()
        .trigger_run(
            "t1",
            &[chosen.id.clone(), foreign.id.clone()],
            "auditor@example.test",
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.counters.total, 1);

    let run = h.store.get_run("t1", &summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.trigger_type, TriggerType::Manual);
    assert_eq!(run.triggered_by.as_deref(), Some("auditor@example.test"));
    assert_eq!(h.test(&chosen).await.last_run_at, Some(h.now()));
    assert_eq!(h.test(&other).await.last_run_at, None);
    assert_eq!(h.test(&foreign).await.last_run_at, None);

    let none = h
        .runner()
        .trigger_run("t1", &["missing".to_string()], "auditor@example.test")
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn consecutive_failure_rule_waits_for_streak() {
    let h = Harness::new().await;
    let test = h.add_test("t1", "X").await;
    h.add_rule("t1", "streak", 1, |rule| rule.consecutive_failures = 3)
        .await;
    let runner = h.runner();

    for expected_alerts in [0, 0, 1] {
        h.scripted.push_status(ResultStatus::Fail);
        runner
            .trigger_run("t1", &[test.id.clone()], "scheduler")
            .await
            .unwrap()
            .unwrap();
        h.advance(Duration::minutes(1));
        let alerts = h
            .store
            .list_alerts("t1", &Default::default())
            .await
            .unwrap();
        assert_eq!(alerts.len(), expected_alerts);
    }
}

#[tokio::test]
async fn cron_schedule_advances_to_next_firing() {
    let h = Harness::new().await;
    let test = h
        .add_test_with("t1", "X", |t| {
            t.interval_minutes = None;
            t.cron_expression = Some("0 * * * *".to_string());
        })
        .await;

    h.runner().poll_and_run(h.now()).await.unwrap();

    let stored = h.test(&test).await;
    assert_eq!(stored.next_run_at, Some(h.now() + Duration::hours(1)));
}
