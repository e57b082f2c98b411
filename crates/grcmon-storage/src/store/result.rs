use grcmon_common::types::{ResultStatus, TestResult};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entities::test_result::{self, Column, Entity};
use crate::error::Result;
use crate::store::{parse_column, to_i32, to_u32, MonitorStore};

const ENTITY: &str = "test_result";

fn to_result(m: test_result::Model) -> Result<TestResult> {
    Ok(TestResult {
        status: parse_column(ENTITY, "status", &m.status)?,
        severity: parse_column(ENTITY, "severity", &m.severity)?,
        details: serde_json::from_str(&m.details_json)?,
        attempts: to_u32(m.attempts),
        id: m.id,
        tenant_id: m.tenant_id,
        test_run_id: m.test_run_id,
        test_id: m.test_id,
        control_id: m.control_id,
        message: m.message,
        error_message: m.error_message,
        started_at: m.started_at,
        completed_at: m.completed_at,
        duration_ms: m.duration_ms,
        alert_generated: m.alert_generated,
        alert_id: m.alert_id,
        created_at: m.created_at,
    })
}

impl MonitorStore {
    /// The `(test_run_id, test_id)` unique index rejects a second result for the same test.
    pub async fn insert_result(&self, result: &TestResult) -> Result<()> {
        let am = test_result::ActiveModel {
            id: Set(result.id.clone()),
            tenant_id: Set(result.tenant_id.clone()),
            test_run_id: Set(result.test_run_id.clone()),
            test_id: Set(result.test_id.clone()),
            control_id: Set(result.control_id.clone()),
            status: Set(result.status.to_string()),
            severity: Set(result.severity.to_string()),
            message: Set(result.message.clone()),
            details_json: Set(serde_json::to_string(&result.details)?),
            error_message: Set(result.error_message.clone()),
            attempts: Set(to_i32(result.attempts)),
            started_at: Set(result.started_at),
            completed_at: Set(result.completed_at),
            duration_ms: Set(result.duration_ms),
            alert_generated: Set(result.alert_generated),
            alert_id: Set(result.alert_id.clone()),
            created_at: Set(result.created_at),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn get_result(&self, tenant_id: &str, result_id: &str) -> Result<Option<TestResult>> {
        let model = Entity::find_by_id(result_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        model.map(to_result).transpose()
    }

    pub async fn list_results_for_run(
        &self,
        tenant_id: &str,
        run_id: &str,
    ) -> Result<Vec<TestResult>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::TestRunId.eq(run_id))
            .order_by(Column::StartedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_result).collect()
    }

    /// Results of one test, newest first.
    pub async fn list_results_for_test(
        &self,
        tenant_id: &str,
        test_id: &str,
    ) -> Result<Vec<TestResult>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::TestId.eq(test_id))
            .order_by(Column::StartedAt, Order::Desc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_result).collect()
    }

    pub async fn consecutive_failures_for(
        &self,
        tenant_id: &str,
        test_id: &str,
        n: u32,
    ) -> Result<bool> {
        if n == 0 {
            return Ok(true);
        }
        let statuses: Vec<String> = Entity::find()
            .select_only()
            .column(Column::Status)
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::TestId.eq(test_id))
            .order_by(Column::StartedAt, Order::Desc)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(u64::from(n))
            .into_tuple()
            .all(self.db())
            .await?;
        if statuses.len() < n as usize {
            return Ok(false);
        }
        for raw in &statuses {
            let status: ResultStatus = parse_column(ENTITY, "status", raw)?;
            if !status.is_failing() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
