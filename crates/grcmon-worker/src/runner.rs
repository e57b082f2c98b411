use chrono::{DateTime, Duration, Utc};
use grcmon_alert::AlertGenerator;
use grcmon_common::clock::Clock;
use grcmon_common::id;
use grcmon_common::types::{
    ComplianceTest, ResultStatus, RunCompletion, RunCounters, RunStatus, TestResult, TestRun,
    TriggerType,
};
use grcmon_executor::{AdapterError, ExecutionOutcome, ExecutorRegistry};
use grcmon_storage::{MonitorRepository, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::schedule::{self, CRON_FALLBACK_MINUTES};

pub const NO_EXECUTOR: &str = "no_executor_for_type";
pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";

/// Final state of one run started by this executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub tenant_id: String,
    pub run_number: i64,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_message: Option<String>,
}

/// What one [`RunExecutor::poll_and_run`] pass did.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub runs: Vec<RunSummary>,
    /// Tenants left for a later tick because a run was already active.
    pub skipped_tenants: Vec<String>,
}

/// Executes due tests as one run per tenant.
pub struct RunExecutor {
    store: Arc<dyn MonitorRepository>,
    registry: Arc<ExecutorRegistry>,
    alerts: AlertGenerator,
    clock: Arc<dyn Clock>,
    worker_id: String,
    batch_limit: u64,
}

enum RunStart {
    Started(TestRun),
    Busy,
}

impl RunExecutor {
    pub fn new(
        store: Arc<dyn MonitorRepository>,
        registry: Arc<ExecutorRegistry>,
        clock: Arc<dyn Clock>,
        worker_id: impl Into<String>,
        batch_limit: u64,
    ) -> Self {
        Self {
            alerts: AlertGenerator::new(store.clone(), clock.clone()),
            store,
            registry,
            clock,
            worker_id: worker_id.into(),
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Picks up due tests and runs each tenant's batch.
    ///
    /// Only the due-test query can fail the pass; a tenant whose run cannot be
    /// created or completes with a persistence error is logged and the next
    /// tenant proceeds.
    pub async fn poll_and_run(&self, now: DateTime<Utc>) -> Result<PollReport> {
        let due = self.store.list_due_tests(now, self.batch_limit).await?;
        let mut report = PollReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        tracing::debug!(count = due.len(), "Due tests picked up");

        for (tenant_id, batch) in group_by_tenant(due) {
            match self
                .run_batch(&tenant_id, &batch, TriggerType::Scheduled, None, now)
                .await
            {
                Ok(Some(summary)) => report.runs.push(summary),
                Ok(None) => report.skipped_tenants.push(tenant_id),
                Err(e) => {
                    tracing::error!(tenant_id = %tenant_id, error = %e, "Scheduled run failed");
                }
            }
        }
        Ok(report)
    }

    /// Runs the given active tests of a tenant now as a manual run.
    ///
    /// Returns `None` when none of the ids names an active test of the tenant,
    /// or when the tenant already has a run in flight.
    pub async fn trigger_run(
        &self,
        tenant_id: &str,
        test_ids: &[String],
        triggered_by: &str,
    ) -> Result<Option<RunSummary>> {
        let tests = self
            .store
            .list_active_tests_by_ids(tenant_id, test_ids)
            .await?;
        if tests.is_empty() {
            tracing::debug!(tenant_id, "Manual run requested with no active tests");
            return Ok(None);
        }
        let now = self.clock.now();
        self.run_batch(
            tenant_id,
            &tests,
            TriggerType::Manual,
            Some(triggered_by.to_string()),
            now,
        )
        .await
    }

    async fn run_batch(
        &self,
        tenant_id: &str,
        tests: &[ComplianceTest],
        trigger_type: TriggerType,
        triggered_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<RunSummary>> {
        let run = match self
            .start_run(tenant_id, tests.len(), trigger_type, triggered_by, now)
            .await?
        {
            RunStart::Started(run) => run,
            RunStart::Busy => {
                tracing::debug!(tenant_id, "Tenant already has an active run, skipping");
                return Ok(None);
            }
        };
        tracing::info!(
            tenant_id,
            run_id = %run.id,
            run_number = run.run_number,
            trigger = %trigger_type,
            tests = tests.len(),
            "Run started"
        );

        let timer = Instant::now();
        let mut counters = run.counters;
        let mut abort = None;
        for test in tests {
            if let Err(e) = self.execute_test(&run, test, &mut counters).await {
                tracing::error!(
                    tenant_id,
                    run_id = %run.id,
                    test_id = %test.id,
                    error = %e,
                    "Run aborted by persistence error"
                );
                abort = Some(e.to_string());
                break;
            }
        }

        let status = if abort.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let completion = RunCompletion {
            status,
            completed_at: self.clock.now(),
            duration_ms: elapsed_ms(timer),
            counters,
            error_message: abort,
        };
        if !self
            .store
            .finalize_run(tenant_id, &run.id, &completion)
            .await?
        {
            tracing::error!(
                tenant_id,
                run_id = %run.id,
                run_number = run.run_number,
                "Run was already finalized elsewhere (reaped as stale), outcome not recorded"
            );
        }
        tracing::info!(
            tenant_id,
            run_id = %run.id,
            run_number = run.run_number,
            status = %status,
            passed = counters.passed,
            failed = counters.failed,
            errors = counters.errors,
            duration_ms = completion.duration_ms,
            "Run finished"
        );

        Ok(Some(RunSummary {
            run_id: run.id,
            tenant_id: tenant_id.to_string(),
            run_number: run.run_number,
            status,
            counters,
            error_message: completion.error_message,
        }))
    }

    async fn start_run(
        &self,
        tenant_id: &str,
        total: usize,
        trigger_type: TriggerType,
        triggered_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RunStart> {
        if self.store.tenant_has_active_run(tenant_id).await? {
            return Ok(RunStart::Busy);
        }
        let mut run = TestRun {
            id: id::next_id(),
            tenant_id: tenant_id.to_string(),
            run_number: 0,
            status: RunStatus::Running,
            trigger_type,
            started_at: Some(now),
            completed_at: None,
            duration_ms: None,
            counters: RunCounters::with_total(u32::try_from(total).unwrap_or(u32::MAX)),
            worker_id: Some(self.worker_id.clone()),
            triggered_by,
            error_message: None,
            created_at: now,
        };
        // The guarded insert is authoritative; the check above only saves a
        // transaction in the common case.
        match self.store.insert_run(&run).await? {
            Some(run_number) => {
                run.run_number = run_number;
                Ok(RunStart::Started(run))
            }
            None => Ok(RunStart::Busy),
        }
    }

    /// Runs one test, records its result, advances its schedule and hands
    /// failures to the alert generator.
    async fn execute_test(
        &self,
        run: &TestRun,
        test: &ComplianceTest,
        counters: &mut RunCounters,
    ) -> Result<()> {
        let started_at = self.clock.now();
        let timer = Instant::now();
        let (outcome, attempts) = self.dispatch(test, started_at).await;
        let completed_at = self.clock.now().max(started_at);

        let result = TestResult {
            id: id::next_id(),
            tenant_id: test.tenant_id.clone(),
            test_run_id: run.id.clone(),
            test_id: test.id.clone(),
            control_id: test.control_id.clone(),
            status: outcome.status,
            severity: test.severity,
            message: outcome.message,
            details: outcome.details,
            error_message: outcome.error_message,
            attempts,
            started_at,
            completed_at: Some(completed_at),
            duration_ms: Some(elapsed_ms(timer)),
            alert_generated: false,
            alert_id: None,
            created_at: completed_at,
        };
        self.store.insert_result(&result).await?;
        counters.record(result.status);

        let next_run_at = match test.schedule() {
            Ok(schedule) => schedule::next_run_after(&schedule, completed_at),
            Err(e) => {
                tracing::warn!(test_id = %test.id, error = %e, "Test has no valid schedule, using fallback");
                completed_at + Duration::minutes(CRON_FALLBACK_MINUTES)
            }
        };
        self.store
            .advance_test_schedule(&test.tenant_id, &test.id, completed_at, next_run_at)
            .await?;

        if result.status.is_failing() {
            self.alerts.maybe_generate(test, &result).await?;
        }
        Ok(())
    }

    /// Calls the test's adapter until it returns, fails terminally, runs out
    /// of retries or passes the test deadline. Returns the outcome and the
    /// number of adapter calls made.
    async fn dispatch(
        &self,
        test: &ComplianceTest,
        started_at: DateTime<Utc>,
    ) -> (ExecutionOutcome, u32) {
        let Some(executor) = self.registry.resolve(&test.test_type) else {
            tracing::warn!(
                tenant_id = %test.tenant_id,
                test_id = %test.id,
                test_type = %test.test_type,
                "No executor registered for test type"
            );
            return (error_outcome(NO_EXECUTOR), 0);
        };

        let budget = std::time::Duration::from_secs(u64::from(test.timeout_seconds.max(1)));
        let deadline = started_at + Duration::seconds(i64::from(test.timeout_seconds.max(1)));
        let deadline_at = tokio::time::Instant::now() + budget;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let executor = executor.clone();
            let config: Value = test.config.clone();
            let handle = tokio::spawn(async move { executor.execute(&config, deadline).await });
            let abort = handle.abort_handle();

            let error = match tokio::time::timeout_at(deadline_at, handle).await {
                Err(_) => {
                    abort.abort();
                    tracing::warn!(test_id = %test.id, attempt, "Executor deadline exceeded");
                    return (error_outcome(DEADLINE_EXCEEDED), attempt);
                }
                Ok(Err(join)) => {
                    return (error_outcome(format!("executor panicked: {join}")), attempt);
                }
                Ok(Ok(Ok(outcome))) => return (outcome, attempt),
                Ok(Ok(Err(e))) => e,
            };

            match error {
                AdapterError::Transient(reason) if attempt <= test.retry_count => {
                    tracing::warn!(
                        tenant_id = %test.tenant_id,
                        test_id = %test.id,
                        attempt,
                        retries = test.retry_count,
                        error = %reason,
                        "Transient executor failure, retrying"
                    );
                    let delay = std::time::Duration::from_secs(u64::from(test.retry_delay_seconds));
                    tokio::time::sleep_until((tokio::time::Instant::now() + delay).min(deadline_at))
                        .await;
                }
                e => return (error_outcome(e.to_string()), attempt),
            }
        }
    }
}

fn error_outcome(message: impl Into<String>) -> ExecutionOutcome {
    ExecutionOutcome::new(ResultStatus::Error).with_error(message)
}

/// Elapsed wall time, never below 1 ms.
fn elapsed_ms(timer: Instant) -> i64 {
    i64::try_from(timer.elapsed().as_millis())
        .unwrap_or(i64::MAX)
        .max(1)
}

/// Splits tests ordered by tenant into per-tenant batches, keeping order.
fn group_by_tenant(tests: Vec<ComplianceTest>) -> Vec<(String, Vec<ComplianceTest>)> {
    let mut groups: Vec<(String, Vec<ComplianceTest>)> = Vec::new();
    for test in tests {
        match groups.last_mut() {
            Some((tenant_id, batch)) if *tenant_id == test.tenant_id => batch.push(test),
            _ => groups.push((test.tenant_id.clone(), vec![test])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_by_tenant_keeps_order() {
        let make = |tenant: &str, identifier: &str| ComplianceTest {
            id: identifier.to_string(),
            tenant_id: tenant.to_string(),
            identifier: identifier.to_string(),
            title: identifier.to_string(),
            description: None,
            test_type: "endpoint".to_string(),
            severity: grcmon_common::types::Severity::Low,
            status: grcmon_common::types::TestStatus::Active,
            control_id: "ctrl".to_string(),
            tags: vec![],
            interval_minutes: Some(5),
            cron_expression: None,
            timeout_seconds: 30,
            retry_count: 0,
            retry_delay_seconds: 0,
            config: Value::Null,
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let groups = group_by_tenant(vec![make("a", "1"), make("a", "2"), make("b", "3")]);
        let shape: Vec<(String, Vec<String>)> = groups
            .into_iter()
            .map(|(t, batch)| (t, batch.into_iter().map(|x| x.id).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("a".to_string(), vec!["1".to_string(), "2".to_string()]),
                ("b".to_string(), vec!["3".to_string()]),
            ]
        );
    }

    #[test]
    fn elapsed_is_at_least_one_millisecond() {
        assert!(elapsed_ms(Instant::now()) >= 1);
    }
}
