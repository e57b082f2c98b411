use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DbBackend;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_monitoring_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = match manager.get_database_backend() {
            DbBackend::Postgres => POSTGRES_UP_SQL,
            _ => SQLITE_UP_SQL,
        };
        manager.get_connection().execute_unprepared(sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// The partial unique index on test_runs is the last line of defence for
// per-tenant single-flight: a second pending|running run cannot be stored.
const SQLITE_UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS compliance_tests (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    identifier TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    test_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    control_id TEXT NOT NULL,
    tags_json TEXT NOT NULL DEFAULT '[]',
    interval_minutes INTEGER,
    cron_expression TEXT,
    timeout_seconds INTEGER NOT NULL DEFAULT 60,
    retry_count INTEGER NOT NULL DEFAULT 0,
    retry_delay_seconds INTEGER NOT NULL DEFAULT 0,
    config_json TEXT NOT NULL DEFAULT '{}',
    last_run_at TEXT,
    next_run_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_compliance_tests_identifier ON compliance_tests(tenant_id, identifier);
CREATE INDEX IF NOT EXISTS idx_compliance_tests_due ON compliance_tests(status, next_run_at);

CREATE TABLE IF NOT EXISTS test_runs (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    run_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    duration_ms INTEGER,
    total_tests INTEGER NOT NULL DEFAULT 0,
    passed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    warnings INTEGER NOT NULL DEFAULT 0,
    worker_id TEXT,
    triggered_by TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_runs_number ON test_runs(tenant_id, run_number);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_runs_single_flight ON test_runs(tenant_id) WHERE status IN ('pending', 'running');
CREATE INDEX IF NOT EXISTS idx_test_runs_status_started ON test_runs(status, started_at);

CREATE TABLE IF NOT EXISTS test_results (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    test_run_id TEXT NOT NULL,
    test_id TEXT NOT NULL,
    control_id TEXT NOT NULL,
    status TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT,
    details_json TEXT NOT NULL DEFAULT '{}',
    error_message TEXT,
    attempts INTEGER NOT NULL DEFAULT 1,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    duration_ms INTEGER,
    alert_generated INTEGER NOT NULL DEFAULT 0,
    alert_id TEXT,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_results_run_test ON test_results(test_run_id, test_id);
CREATE INDEX IF NOT EXISTS idx_test_results_history ON test_results(tenant_id, test_id, started_at DESC);

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    match_test_types TEXT NOT NULL DEFAULT '[]',
    match_severities TEXT NOT NULL DEFAULT '[]',
    match_result_statuses TEXT NOT NULL DEFAULT '[]',
    match_control_ids TEXT NOT NULL DEFAULT '[]',
    match_tags TEXT NOT NULL DEFAULT '[]',
    consecutive_failures INTEGER NOT NULL DEFAULT 1,
    cooldown_minutes INTEGER NOT NULL DEFAULT 0,
    alert_severity TEXT NOT NULL,
    alert_title_template TEXT,
    auto_assign_to TEXT,
    sla_hours INTEGER,
    delivery_channels TEXT NOT NULL DEFAULT '[\"in_app\"]',
    priority INTEGER NOT NULL DEFAULT 100,
    alerts_generated INTEGER NOT NULL DEFAULT 0,
    last_triggered_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alert_rules_name ON alert_rules(tenant_id, name);
CREATE INDEX IF NOT EXISTS idx_alert_rules_eval ON alert_rules(tenant_id, enabled, priority, created_at);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    alert_number INTEGER NOT NULL,
    title TEXT NOT NULL,
    message TEXT,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    test_id TEXT,
    test_result_id TEXT,
    control_id TEXT NOT NULL,
    alert_rule_id TEXT,
    assigned_to TEXT,
    assigned_at TEXT,
    sla_deadline TEXT,
    sla_breached INTEGER NOT NULL DEFAULT 0,
    acknowledged_at TEXT,
    acknowledged_by TEXT,
    resolved_at TEXT,
    resolved_by TEXT,
    resolution_notes TEXT,
    suppressed_until TEXT,
    suppression_reason TEXT,
    delivery_channels TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_number ON alerts(tenant_id, alert_number);
CREATE INDEX IF NOT EXISTS idx_alerts_cooldown ON alerts(tenant_id, test_id, alert_rule_id, created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_sla ON alerts(status, sla_breached, sla_deadline);
CREATE INDEX IF NOT EXISTS idx_alerts_suppressed ON alerts(status, suppressed_until);

CREATE TABLE IF NOT EXISTS alert_deliveries (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    alert_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    delivered_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alert_deliveries_channel ON alert_deliveries(alert_id, channel);
CREATE INDEX IF NOT EXISTS idx_alert_deliveries_pending ON alert_deliveries(status, created_at);
";

const POSTGRES_UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS compliance_tests (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    identifier TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    test_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    control_id TEXT NOT NULL,
    tags_json TEXT NOT NULL DEFAULT '[]',
    interval_minutes BIGINT,
    cron_expression TEXT,
    timeout_seconds INTEGER NOT NULL DEFAULT 60,
    retry_count INTEGER NOT NULL DEFAULT 0,
    retry_delay_seconds INTEGER NOT NULL DEFAULT 0,
    config_json TEXT NOT NULL DEFAULT '{}',
    last_run_at TIMESTAMPTZ,
    next_run_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_compliance_tests_identifier ON compliance_tests(tenant_id, identifier);
CREATE INDEX IF NOT EXISTS idx_compliance_tests_due ON compliance_tests(status, next_run_at);

CREATE TABLE IF NOT EXISTS test_runs (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    run_number BIGINT NOT NULL,
    status TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    duration_ms BIGINT,
    total_tests INTEGER NOT NULL DEFAULT 0,
    passed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    warnings INTEGER NOT NULL DEFAULT 0,
    worker_id TEXT,
    triggered_by TEXT,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_runs_number ON test_runs(tenant_id, run_number);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_runs_single_flight ON test_runs(tenant_id) WHERE status IN ('pending', 'running');
CREATE INDEX IF NOT EXISTS idx_test_runs_status_started ON test_runs(status, started_at);

CREATE TABLE IF NOT EXISTS test_results (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    test_run_id TEXT NOT NULL,
    test_id TEXT NOT NULL,
    control_id TEXT NOT NULL,
    status TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT,
    details_json TEXT NOT NULL DEFAULT '{}',
    error_message TEXT,
    attempts INTEGER NOT NULL DEFAULT 1,
    started_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    duration_ms BIGINT,
    alert_generated BOOLEAN NOT NULL DEFAULT FALSE,
    alert_id TEXT,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_test_results_run_test ON test_results(test_run_id, test_id);
CREATE INDEX IF NOT EXISTS idx_test_results_history ON test_results(tenant_id, test_id, started_at DESC);

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    match_test_types TEXT NOT NULL DEFAULT '[]',
    match_severities TEXT NOT NULL DEFAULT '[]',
    match_result_statuses TEXT NOT NULL DEFAULT '[]',
    match_control_ids TEXT NOT NULL DEFAULT '[]',
    match_tags TEXT NOT NULL DEFAULT '[]',
    consecutive_failures INTEGER NOT NULL DEFAULT 1,
    cooldown_minutes INTEGER NOT NULL DEFAULT 0,
    alert_severity TEXT NOT NULL,
    alert_title_template TEXT,
    auto_assign_to TEXT,
    sla_hours INTEGER,
    delivery_channels TEXT NOT NULL DEFAULT '[\"in_app\"]',
    priority INTEGER NOT NULL DEFAULT 100,
    alerts_generated BIGINT NOT NULL DEFAULT 0,
    last_triggered_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alert_rules_name ON alert_rules(tenant_id, name);
CREATE INDEX IF NOT EXISTS idx_alert_rules_eval ON alert_rules(tenant_id, enabled, priority, created_at);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    alert_number BIGINT NOT NULL,
    title TEXT NOT NULL,
    message TEXT,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    test_id TEXT,
    test_result_id TEXT,
    control_id TEXT NOT NULL,
    alert_rule_id TEXT,
    assigned_to TEXT,
    assigned_at TIMESTAMPTZ,
    sla_deadline TIMESTAMPTZ,
    sla_breached BOOLEAN NOT NULL DEFAULT FALSE,
    acknowledged_at TIMESTAMPTZ,
    acknowledged_by TEXT,
    resolved_at TIMESTAMPTZ,
    resolved_by TEXT,
    resolution_notes TEXT,
    suppressed_until TIMESTAMPTZ,
    suppression_reason TEXT,
    delivery_channels TEXT NOT NULL DEFAULT '[]',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_number ON alerts(tenant_id, alert_number);
CREATE INDEX IF NOT EXISTS idx_alerts_cooldown ON alerts(tenant_id, test_id, alert_rule_id, created_at);
CREATE INDEX IF NOT EXISTS idx_alerts_sla ON alerts(status, sla_breached, sla_deadline);
CREATE INDEX IF NOT EXISTS idx_alerts_suppressed ON alerts(status, suppressed_until);

CREATE TABLE IF NOT EXISTS alert_deliveries (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    alert_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    delivered_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_alert_deliveries_channel ON alert_deliveries(alert_id, channel);
CREATE INDEX IF NOT EXISTS idx_alert_deliveries_pending ON alert_deliveries(status, created_at);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS alert_deliveries;
DROP TABLE IF EXISTS alerts;
DROP TABLE IF EXISTS alert_rules;
DROP TABLE IF EXISTS test_results;
DROP TABLE IF EXISTS test_runs;
DROP TABLE IF EXISTS compliance_tests;
";
