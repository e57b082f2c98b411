use grcmon_common::clock::Clock;
use grcmon_common::error::ConfigError;
use grcmon_common::id;
use grcmon_common::types::{ComplianceTest, Schedule, Severity, TestStatus};
use grcmon_executor::ExecutorRegistry;
use grcmon_storage::{MonitorStore, Result, StorageError};
use serde_json::Value;
use std::sync::Arc;

use crate::schedule;

/// Definition of a test to create. Unset limits take the catalog defaults.
#[derive(Debug, Clone)]
pub struct NewTest {
    pub tenant_id: String,
    pub identifier: String,
    pub title: String,
    pub description: Option<String>,
    pub test_type: String,
    pub severity: Severity,
    pub status: TestStatus,
    pub control_id: String,
    pub tags: Vec<String>,
    pub interval_minutes: Option<i64>,
    pub cron_expression: Option<String>,
    pub timeout_seconds: Option<i64>,
    pub retry_count: Option<u32>,
    pub retry_delay_seconds: u32,
    pub config: Value,
}

/// Create/update entry point for test definitions. Every change is
/// validated here, so the worker only ever sees well-formed schedules.
pub struct TestCatalog {
    store: Arc<MonitorStore>,
    registry: Arc<ExecutorRegistry>,
    clock: Arc<dyn Clock>,
    default_retry_count: u32,
    default_timeout_seconds: u32,
}

impl TestCatalog {
    pub fn new(
        store: Arc<MonitorStore>,
        registry: Arc<ExecutorRegistry>,
        clock: Arc<dyn Clock>,
        default_retry_count: u32,
        default_timeout_seconds: u32,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            default_retry_count,
            default_timeout_seconds: default_timeout_seconds.max(1),
        }
    }

    /// Validates and stores a new test. An active test is due immediately.
    pub async fn create_test(&self, new: NewTest) -> Result<ComplianceTest> {
        let schedule = Schedule::from_parts(new.interval_minutes, new.cron_expression.as_deref())?;
        schedule::validate(&schedule)?;
        let timeout_seconds = match new.timeout_seconds {
            Some(t) if t < 1 || t > i64::from(u32::MAX) => {
                return Err(ConfigError::InvalidTimeout(t).into());
            }
            Some(t) => t as u32,
            None => self.default_timeout_seconds,
        };
        self.registry.validate(&new.test_type, &new.config)?;

        let now = self.clock.now();
        let test = ComplianceTest {
            id: id::next_id(),
            tenant_id: new.tenant_id,
            identifier: new.identifier,
            title: new.title,
            description: new.description,
            test_type: new.test_type,
            severity: new.severity,
            status: new.status,
            control_id: new.control_id,
            tags: new.tags,
            interval_minutes: schedule.interval_minutes().map(i64::from),
            cron_expression: schedule.cron_expression().map(str::to_string),
            timeout_seconds,
            retry_count: new.retry_count.unwrap_or(self.default_retry_count),
            retry_delay_seconds: new.retry_delay_seconds,
            config: new.config,
            last_run_at: None,
            next_run_at: (new.status == TestStatus::Active).then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_test(&test).await?;
        tracing::info!(
            tenant_id = %test.tenant_id,
            test_id = %test.id,
            identifier = %test.identifier,
            test_type = %test.test_type,
            "Test created"
        );
        Ok(test)
    }

    /// Replaces the schedule and recomputes `next_run_at` from now.
    pub async fn update_schedule(
        &self,
        tenant_id: &str,
        test_id: &str,
        interval_minutes: Option<i64>,
        cron_expression: Option<&str>,
    ) -> Result<ComplianceTest> {
        let schedule = Schedule::from_parts(interval_minutes, cron_expression)?;
        schedule::validate(&schedule)?;
        let mut test = self.load(tenant_id, test_id).await?;
        let now = self.clock.now();
        test.interval_minutes = schedule.interval_minutes().map(i64::from);
        test.cron_expression = schedule.cron_expression().map(str::to_string);
        if test.status == TestStatus::Active {
            test.next_run_at = Some(schedule::next_run_after(&schedule, now));
        }
        test.updated_at = now;
        self.store.update_test(&test).await?;
        Ok(test)
    }

    /// Replaces the executor config after adapter validation.
    pub async fn update_config(
        &self,
        tenant_id: &str,
        test_id: &str,
        config: Value,
    ) -> Result<ComplianceTest> {
        let mut test = self.load(tenant_id, test_id).await?;
        self.registry.validate(&test.test_type, &config)?;
        test.config = config;
        test.updated_at = self.clock.now();
        self.store.update_test(&test).await?;
        Ok(test)
    }

    /// Moves a test along its lifecycle. Activating a test that has never
    /// been scheduled makes it due immediately.
    pub async fn set_status(
        &self,
        tenant_id: &str,
        test_id: &str,
        status: TestStatus,
    ) -> Result<ComplianceTest> {
        let mut test = self.load(tenant_id, test_id).await?;
        if !test.status.can_transition_to(status) {
            return Err(ConfigError::InvalidTransition {
                entity: "test",
                from: test.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        let now = self.clock.now();
        if status == TestStatus::Active && test.next_run_at.is_none() {
            test.next_run_at = Some(now);
        }
        test.status = status;
        test.updated_at = now;
        self.store.update_test(&test).await?;
        tracing::info!(
            tenant_id,
            test_id,
            status = %status,
            "Test status changed"
        );
        Ok(test)
    }

    async fn load(&self, tenant_id: &str, test_id: &str) -> Result<ComplianceTest> {
        self.store
            .get_test(tenant_id, test_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "compliance_test",
                id: test_id.to_string(),
            })
    }
}
