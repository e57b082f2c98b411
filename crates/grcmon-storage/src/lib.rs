//! Persistence gateway for the monitoring core.
//!
//! [`store::MonitorStore`] is the SeaORM-backed implementation (SQLite or
//! PostgreSQL). The worker only sees the [`MonitorRepository`] trait, which
//! carries no business logic: every operation is a typed query or a bulk
//! update scoped by `tenant_id`.

pub mod entities;
pub mod error;
pub mod store;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grcmon_common::types::{
    Alert, AlertRule, ComplianceTest, DeliveryIntent, DeliveryStatus, RunCompletion, TestResult,
    TestRun,
};

pub use error::{Result, StorageError};
pub use store::MonitorStore;

/// Operations the run executor, alert generator, reconciler and delivery
/// pump need from the relational store.
///
/// Implementations must be safe to share across tasks (`Send + Sync`).
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Active tests with `next_run_at <= now`, ordered by `(tenant_id, next_run_at)`.
    async fn list_due_tests(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<ComplianceTest>>;

    /// Active tests of one tenant among `test_ids`, in `identifier` order.
    async fn list_active_tests_by_ids(
        &self,
        tenant_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<ComplianceTest>>;

    async fn tenant_has_active_run(&self, tenant_id: &str) -> Result<bool>;

    /// Atomically inserts `run` unless the tenant already has a pending or
    /// running run. Returns the allocated `run_number`, or `None` when the
    /// single-flight guard rejected the insert.
    async fn insert_run(&self, run: &TestRun) -> Result<Option<i64>>;

    async fn insert_result(&self, result: &TestResult) -> Result<()>;

    async fn advance_test_schedule(
        &self,
        tenant_id: &str,
        test_id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn finalize_run(
        &self,
        tenant_id: &str,
        run_id: &str,
        completion: &RunCompletion,
    ) -> Result<bool>;

    /// Runs still pending or running that started before `started_before`.
    async fn list_stale_runs(&self, started_before: DateTime<Utc>) -> Result<Vec<TestRun>>;

    /// Enabled rules of a tenant ordered by `priority ASC, created_at ASC`.
    async fn list_enabled_alert_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>>;

    async fn count_recent_alerts(
        &self,
        tenant_id: &str,
        test_id: &str,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// `true` when the `n` most recent results of the test all failed or errored.
    async fn consecutive_failures_for(&self, tenant_id: &str, test_id: &str, n: u32)
        -> Result<bool>;

    /// Inserts the alert, links the originating result, bumps the rule
    /// counter and enqueues one delivery intent per channel, all in one
    /// transaction. Returns the allocated `alert_number`.
    async fn insert_alert(&self, alert: &Alert, result_id: Option<&str>) -> Result<i64>;

    async fn get_alert(&self, tenant_id: &str, alert_id: &str) -> Result<Option<Alert>>;

    async fn tenants_with_overdue_alerts(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Flags overdue, still-actionable alerts of one tenant. Returns rows changed.
    async fn mark_sla_breaches(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64>;

    async fn tenants_with_expired_suppressions(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Reopens suppressed alerts of one tenant whose suppression expired.
    async fn unsuppress_expired(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64>;

    async fn list_pending_deliveries(&self, limit: u64) -> Result<Vec<DeliveryIntent>>;

    async fn mark_delivery_sent(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Records a failed attempt. The intent stays `pending` until
    /// `max_attempts` is reached, then becomes `failed`.
    async fn mark_delivery_failed(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryStatus>;
}
