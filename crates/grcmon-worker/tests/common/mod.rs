#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use grcmon_common::clock::{Clock, ManualClock};
use grcmon_common::id;
use grcmon_common::types::{
    Alert, AlertRule, ComplianceTest, DeliveryChannel, DeliveryIntent, DeliveryStatus,
    ResultStatus, RunCompletion, Severity, TestResult, TestRun, TestStatus,
};
use grcmon_executor::{AdapterError, ExecutionOutcome, ExecutorRegistry, TestExecutor};
use grcmon_notify::{DeliveryPump, DispatcherRegistry};
use grcmon_storage::{MonitorRepository, MonitorStore, Result, StorageError};
use grcmon_worker::reconciler::Reconciler;
use grcmon_worker::runner::RunExecutor;
use grcmon_worker::worker::MonitorWorker;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SCRIPTED: &str = "scripted";
pub const SLOW: &str = "slow";

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Returns queued responses in order, then `pass` once the queue is empty.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<std::result::Result<ExecutionOutcome, AdapterError>>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn push(&self, response: std::result::Result<ExecutionOutcome, AdapterError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, status: ResultStatus) {
        self.push(Ok(ExecutionOutcome::new(status).with_message(format!("scripted {status}"))));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestExecutor for ScriptedExecutor {
    fn test_type(&self) -> &str {
        SCRIPTED
    }

    async fn execute(
        &self,
        _config: &Value,
        _deadline: DateTime<Utc>,
    ) -> std::result::Result<ExecutionOutcome, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionOutcome::pass()))
    }
}

/// Never answers within a test's timeout.
pub struct SlowExecutor;

#[async_trait]
impl TestExecutor for SlowExecutor {
    fn test_type(&self) -> &str {
        SLOW
    }

    async fn execute(
        &self,
        _config: &Value,
        _deadline: DateTime<Utc>,
    ) -> std::result::Result<ExecutionOutcome, AdapterError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(ExecutionOutcome::pass())
    }
}

pub struct Harness {
    _dir: TempDir,
    pub store: Arc<MonitorStore>,
    pub clock: Arc<ManualClock>,
    pub scripted: Arc<ScriptedExecutor>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}/grcmon.db?mode=rwc", dir.path().display());
        let store = Arc::new(MonitorStore::connect(&url).await.unwrap());
        Self {
            _dir: dir,
            store,
            clock: Arc::new(ManualClock::new(base())),
            scripted: Arc::new(ScriptedExecutor::default()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn executors(&self) -> Arc<ExecutorRegistry> {
        let mut registry = ExecutorRegistry::new();
        registry.register(self.scripted.clone());
        registry.register(Arc::new(SlowExecutor));
        Arc::new(registry)
    }

    pub fn runner_on(&self, store: Arc<dyn MonitorRepository>) -> RunExecutor {
        RunExecutor::new(store, self.executors(), self.clock.clone(), "worker-test", 100)
    }

    pub fn runner(&self) -> RunExecutor {
        self.runner_on(self.store.clone())
    }

    pub fn worker(&self) -> MonitorWorker {
        let pump = DeliveryPump::new(
            self.store.clone(),
            Arc::new(DispatcherRegistry::default()),
            self.clock.clone(),
            50,
            3,
        );
        MonitorWorker::new(
            self.runner(),
            Reconciler::new(self.store.clone(), Duration::hours(1)),
            Some(pump),
            self.clock.clone(),
            std::time::Duration::from_secs(60),
        )
    }

    /// Stores an active test that became due one second ago.
    pub async fn add_test(&self, tenant: &str, identifier: &str) -> ComplianceTest {
        self.add_test_with(tenant, identifier, |_| {}).await
    }

    pub async fn add_test_with(
        &self,
        tenant: &str,
        identifier: &str,
        customize: impl FnOnce(&mut ComplianceTest),
    ) -> ComplianceTest {
        let now = self.now();
        let mut test = ComplianceTest {
            id: id::next_id(),
            tenant_id: tenant.to_string(),
            identifier: identifier.to_string(),
            title: format!("{identifier} check"),
            description: None,
            test_type: SCRIPTED.to_string(),
            severity: Severity::High,
            status: TestStatus::Active,
            control_id: "ctrl-ac2".to_string(),
            tags: vec!["soc2".to_string()],
            interval_minutes: Some(5),
            cron_expression: None,
            timeout_seconds: 60,
            retry_count: 0,
            retry_delay_seconds: 0,
            config: json!({}),
            last_run_at: None,
            next_run_at: Some(now - Duration::seconds(1)),
            created_at: now,
            updated_at: now,
        };
        customize(&mut test);
        self.store.insert_test(&test).await.unwrap();
        test
    }

    pub async fn add_rule(
        &self,
        tenant: &str,
        name: &str,
        priority: i32,
        customize: impl FnOnce(&mut AlertRule),
    ) -> AlertRule {
        let now = self.now();
        let mut rule = AlertRule {
            id: id::next_id(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            description: None,
            enabled: true,
            match_test_types: vec![],
            match_severities: vec![],
            match_result_statuses: vec![],
            match_control_ids: vec![],
            match_tags: vec![],
            consecutive_failures: 1,
            cooldown_minutes: 0,
            alert_severity: Severity::High,
            alert_title_template: None,
            auto_assign_to: None,
            sla_hours: Some(4),
            delivery_channels: vec![DeliveryChannel::InApp],
            priority,
            alerts_generated: 0,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        customize(&mut rule);
        self.store.insert_alert_rule(&rule).await.unwrap()
    }

    pub async fn test(&self, test: &ComplianceTest) -> ComplianceTest {
        self.store
            .get_test(&test.tenant_id, &test.id)
            .await
            .unwrap()
            .unwrap()
    }
}

/// Delegates to the real store but fails `insert_result` once `ok_results`
/// results have been written.
pub struct FailingResults {
    pub inner: Arc<MonitorStore>,
    pub ok_results: usize,
    inserted: AtomicUsize,
}

impl FailingResults {
    pub fn new(inner: Arc<MonitorStore>, ok_results: usize) -> Self {
        Self {
            inner,
            ok_results,
            inserted: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MonitorRepository for FailingResults {
    async fn list_due_tests(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<ComplianceTest>> {
        self.inner.list_due_tests(now, limit).await
    }

    async fn list_active_tests_by_ids(
        &self,
        tenant_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<ComplianceTest>> {
        self.inner.list_active_tests_by_ids(tenant_id, test_ids).await
    }

    async fn tenant_has_active_run(&self, tenant_id: &str) -> Result<bool> {
        self.inner.tenant_has_active_run(tenant_id).await
    }

    async fn insert_run(&self, run: &TestRun) -> Result<Option<i64>> {
        self.inner.insert_run(run).await
    }

    async fn insert_result(&self, result: &TestResult) -> Result<()> {
        if self.inserted.fetch_add(1, Ordering::SeqCst) >= self.ok_results {
            return Err(StorageError::Corrupt {
                entity: "test_result",
                column: "id",
                reason: "injected failure".to_string(),
            });
        }
        self.inner.insert_result(result).await
    }

    async fn advance_test_schedule(
        &self,
        tenant_id: &str,
        test_id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .advance_test_schedule(tenant_id, test_id, last_run_at, next_run_at)
            .await
    }

    async fn finalize_run(
        &self,
        tenant_id: &str,
        run_id: &str,
        completion: &RunCompletion,
    ) -> Result<bool> {
        self.inner.finalize_run(tenant_id, run_id, completion).await
    }

    async fn list_stale_runs(&self, started_before: DateTime<Utc>) -> Result<Vec<TestRun>> {
        self.inner.list_stale_runs(started_before).await
    }

    async fn list_enabled_alert_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        self.inner.list_enabled_alert_rules(tenant_id).await
    }

    async fn count_recent_alerts(
        &self,
        tenant_id: &str,
        test_id: &str,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.inner
            .count_recent_alerts(tenant_id, test_id, rule_id, since)
            .await
    }

    async fn consecutive_failures_for(
        &self,
        tenant_id: &str,
        test_id: &str,
        n: u32,
    ) -> Result<bool> {
        self.inner.consecutive_failures_for(tenant_id, test_id, n).await
    }

    async fn insert_alert(&self, alert: &Alert, result_id: Option<&str>) -> Result<i64> {
        self.inner.insert_alert(alert, result_id).await
    }

    async fn get_alert(&self, tenant_id: &str, alert_id: &str) -> Result<Option<Alert>> {
        self.inner.get_alert(tenant_id, alert_id).await
    }

    async fn tenants_with_overdue_alerts(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.inner.tenants_with_overdue_alerts(now).await
    }

    async fn mark_sla_breaches(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64> {
        self.inner.mark_sla_breaches(tenant_id, now).await
    }

    async fn tenants_with_expired_suppressions(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.inner.tenants_with_expired_suppressions(now).await
    }

    async fn unsuppress_expired(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64> {
        self.inner.unsuppress_expired(tenant_id, now).await
    }

    async fn list_pending_deliveries(&self, limit: u64) -> Result<Vec<DeliveryIntent>> {
        self.inner.list_pending_deliveries(limit).await
    }

    async fn mark_delivery_sent(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.mark_delivery_sent(tenant_id, delivery_id, now).await
    }

    async fn mark_delivery_failed(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryStatus> {
        self.inner
            .mark_delivery_failed(tenant_id, delivery_id, error, max_attempts, now)
            .await
    }
}
