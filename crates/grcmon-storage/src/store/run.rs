use chrono::{DateTime, Utc};
use grcmon_common::types::{RunCompletion, RunCounters, TestRun};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, SqlErr, TransactionTrait,
};

use crate::entities::test_run::{self, Column, Entity};
use crate::error::Result;
use crate::store::{parse_column, statement_for, to_i32, to_u32, MonitorStore};

const ENTITY: &str = "test_run";

const ACTIVE_STATUSES: [&str; 2] = ["pending", "running"];

// Insert guarded by the single-flight predicate. The run number is allocated
// by the same statement, so a concurrent worker either sees the new row or
// is rejected by the partial unique index on (tenant_id) for active runs.
const INSERT_RUN_SQL: &str = "
INSERT INTO test_runs (
    id, tenant_id, run_number, status, trigger_type, started_at,
    total_tests, passed, failed, errors, skipped, warnings,
    worker_id, triggered_by, created_at, updated_at
)
SELECT ?, ?, COALESCE((SELECT MAX(run_number) FROM test_runs WHERE tenant_id = ?), 0) + 1,
       ?, ?, ?, ?, 0, 0, 0, 0, 0, ?, ?, ?, ?
WHERE NOT EXISTS (
    SELECT 1 FROM test_runs WHERE tenant_id = ? AND status IN ('pending', 'running')
)";

fn to_run(m: test_run::Model) -> Result<TestRun> {
    Ok(TestRun {
        status: parse_column(ENTITY, "status", &m.status)?,
        trigger_type: parse_column(ENTITY, "trigger_type", &m.trigger_type)?,
        counters: RunCounters {
            total: to_u32(m.total_tests),
            passed: to_u32(m.passed),
            failed: to_u32(m.failed),
            errors: to_u32(m.errors),
            skipped: to_u32(m.skipped),
            warnings: to_u32(m.warnings),
        },
        id: m.id,
        tenant_id: m.tenant_id,
        run_number: m.run_number,
        started_at: m.started_at,
        completed_at: m.completed_at,
        duration_ms: m.duration_ms,
        worker_id: m.worker_id,
        triggered_by: m.triggered_by,
        error_message: m.error_message,
        created_at: m.created_at,
    })
}

impl MonitorStore {
    pub async fn tenant_has_active_run(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.count_active_runs(tenant_id).await? > 0)
    }

    pub async fn insert_run(&self, run: &TestRun) -> Result<Option<i64>> {
        let backend = self.backend();
        let txn = self.db().begin().await?;

        if backend == DbBackend::Postgres {
            // Serializes run creation per tenant across worker processes.
            txn.execute(statement_for(
                backend,
                "SELECT pg_advisory_xact_lock(hashtext(?))",
                [format!("test_runs:{}", run.tenant_id).into()],
            ))
            .await?;
        }

        let stmt = statement_for(
            backend,
            INSERT_RUN_SQL,
            [
                run.id.clone().into(),
                run.tenant_id.clone().into(),
                run.tenant_id.clone().into(),
                run.status.as_str().into(),
                run.trigger_type.as_str().into(),
                run.started_at.into(),
                to_i32(run.counters.total).into(),
                run.worker_id.clone().into(),
                run.triggered_by.clone().into(),
                run.created_at.into(),
                run.created_at.into(),
                run.tenant_id.clone().into(),
            ],
        );
        let inserted = match txn.execute(stmt).await {
            Ok(res) => res.rows_affected(),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => 0,
            Err(e) => return Err(e.into()),
        };
        if inserted == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let model = Entity::find_by_id(run.id.as_str()).one(&txn).await?;
        txn.commit().await?;
        Ok(model.map(|m| m.run_number))
    }

    /// Moves an active run to its terminal state. Returns `false` when the
    /// run was no longer pending or running (already finalized or reaped).
    pub async fn finalize_run(
        &self,
        tenant_id: &str,
        run_id: &str,
        completion: &RunCompletion,
    ) -> Result<bool> {
        let c = &completion.counters;
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(completion.status.as_str()))
            .col_expr(Column::CompletedAt, Expr::value(Some(completion.completed_at)))
            .col_expr(Column::DurationMs, Expr::value(Some(completion.duration_ms)))
            .col_expr(Column::TotalTests, Expr::value(to_i32(c.total)))
            .col_expr(Column::Passed, Expr::value(to_i32(c.passed)))
            .col_expr(Column::Failed, Expr::value(to_i32(c.failed)))
            .col_expr(Column::Errors, Expr::value(to_i32(c.errors)))
            .col_expr(Column::Skipped, Expr::value(to_i32(c.skipped)))
            .col_expr(Column::Warnings, Expr::value(to_i32(c.warnings)))
            .col_expr(Column::ErrorMessage, Expr::value(completion.error_message.clone()))
            .col_expr(Column::UpdatedAt, Expr::value(completion.completed_at))
            .filter(Column::Id.eq(run_id))
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Status.is_in(ACTIVE_STATUSES))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn list_stale_runs(&self, started_before: DateTime<Utc>) -> Result<Vec<TestRun>> {
        let rows = Entity::find()
            .filter(Column::Status.is_in(ACTIVE_STATUSES))
            .filter(Column::StartedAt.lt(started_before))
            .order_by(Column::StartedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_run).collect()
    }

    pub async fn get_run(&self, tenant_id: &str, run_id: &str) -> Result<Option<TestRun>> {
        let model = Entity::find_by_id(run_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        model.map(to_run).transpose()
    }

    /// Runs of a tenant, newest first.
    pub async fn list_runs(&self, tenant_id: &str) -> Result<Vec<TestRun>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::RunNumber, Order::Desc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_run).collect()
    }

    /// Number of runs of a tenant currently holding the single-flight slot.
    pub async fn count_active_runs(&self, tenant_id: &str) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Status.is_in(ACTIVE_STATUSES))
            .count(self.db())
            .await?)
    }
}
