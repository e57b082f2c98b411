use chrono::{DateTime, Utc};
use grcmon_common::error::ConfigError;
use grcmon_common::id;
use grcmon_common::types::{Alert, AlertStatus, AlertTransition, DeliveryStatus};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::HashSet;

use crate::entities::alert::{self, Column, Entity};
use crate::entities::{alert_delivery, alert_rule, test_result};
use crate::error::{Result, StorageError};
use crate::store::{decode_list, encode_list, parse_column, statement_for, MonitorStore};

const ENTITY: &str = "alert";

const INSERT_ALERT_SQL: &str = "
INSERT INTO alerts (
    id, tenant_id, alert_number, title, message, severity, status,
    test_id, test_result_id, control_id, alert_rule_id,
    assigned_to, assigned_at, sla_deadline, sla_breached,
    acknowledged_at, acknowledged_by, resolved_at, resolved_by, resolution_notes,
    suppressed_until, suppression_reason, delivery_channels, created_at, updated_at
) VALUES (
    ?, ?, (SELECT COALESCE(MAX(alert_number), 0) + 1 FROM alerts WHERE tenant_id = ?),
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
)";

/// Optional filters for [`MonitorStore::list_alerts`].
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub test_id: Option<String>,
    pub test_result_id: Option<String>,
    pub alert_rule_id: Option<String>,
    pub sla_breached: Option<bool>,
}

fn to_alert(m: alert::Model) -> Result<Alert> {
    Ok(Alert {
        severity: parse_column(ENTITY, "severity", &m.severity)?,
        status: parse_column(ENTITY, "status", &m.status)?,
        delivery_channels: decode_list(ENTITY, "delivery_channels", &m.delivery_channels)?,
        id: m.id,
        tenant_id: m.tenant_id,
        alert_number: m.alert_number,
        title: m.title,
        message: m.message,
        test_id: m.test_id,
        test_result_id: m.test_result_id,
        control_id: m.control_id,
        alert_rule_id: m.alert_rule_id,
        assigned_to: m.assigned_to,
        assigned_at: m.assigned_at,
        sla_deadline: m.sla_deadline,
        sla_breached: m.sla_breached,
        acknowledged_at: m.acknowledged_at,
        acknowledged_by: m.acknowledged_by,
        resolved_at: m.resolved_at,
        resolved_by: m.resolved_by,
        resolution_notes: m.resolution_notes,
        suppressed_until: m.suppressed_until,
        suppression_reason: m.suppression_reason,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn sla_exempt_statuses() -> [&'static str; 3] {
    [
        AlertStatus::Resolved.as_str(),
        AlertStatus::Closed.as_str(),
        AlertStatus::Suppressed.as_str(),
    ]
}

impl MonitorStore {
    pub async fn insert_alert(&self, alert: &Alert, result_id: Option<&str>) -> Result<i64> {
        let backend = self.backend();
        let txn = self.db().begin().await?;

        if backend == DbBackend::Postgres {
            txn.execute(statement_for(
                backend,
                "SELECT pg_advisory_xact_lock(hashtext(?))",
                [format!("alerts:{}", alert.tenant_id).into()],
            ))
            .await?;
        }

        let stmt = statement_for(
            backend,
            INSERT_ALERT_SQL,
            [
                alert.id.clone().into(),
                alert.tenant_id.clone().into(),
                alert.tenant_id.clone().into(),
                alert.title.clone().into(),
                alert.message.clone().into(),
                alert.severity.as_str().into(),
                alert.status.as_str().into(),
                alert.test_id.clone().into(),
                alert.test_result_id.clone().into(),
                alert.control_id.clone().into(),
                alert.alert_rule_id.clone().into(),
                alert.assigned_to.clone().into(),
                alert.assigned_at.into(),
                alert.sla_deadline.into(),
                alert.sla_breached.into(),
                alert.acknowledged_at.into(),
                alert.acknowledged_by.clone().into(),
                alert.resolved_at.into(),
                alert.resolved_by.clone().into(),
                alert.resolution_notes.clone().into(),
                alert.suppressed_until.into(),
                alert.suppression_reason.clone().into(),
                encode_list(&alert.delivery_channels)?.into(),
                alert.created_at.into(),
                alert.updated_at.into(),
            ],
        );
        txn.execute(stmt).await?;

        let alert_number: Option<i64> = Entity::find_by_id(alert.id.as_str())
            .select_only()
            .column(Column::AlertNumber)
            .into_tuple()
            .one(&txn)
            .await?;
        let alert_number = alert_number.ok_or_else(|| StorageError::NotFound {
            entity: ENTITY,
            id: alert.id.clone(),
        })?;

        if let Some(result_id) = result_id {
            test_result::Entity::update_many()
                .col_expr(test_result::Column::AlertGenerated, Expr::value(true))
                .col_expr(test_result::Column::AlertId, Expr::value(Some(alert.id.clone())))
                .filter(test_result::Column::Id.eq(result_id))
                .filter(test_result::Column::TenantId.eq(alert.tenant_id.as_str()))
                .exec(&txn)
                .await?;
        }

        if let Some(rule_id) = alert.alert_rule_id.as_deref() {
            alert_rule::Entity::update_many()
                .col_expr(
                    alert_rule::Column::AlertsGenerated,
                    Expr::col(alert_rule::Column::AlertsGenerated).add(1),
                )
                .col_expr(
                    alert_rule::Column::LastTriggeredAt,
                    Expr::value(Some(alert.created_at)),
                )
                .filter(alert_rule::Column::Id.eq(rule_id))
                .filter(alert_rule::Column::TenantId.eq(alert.tenant_id.as_str()))
                .exec(&txn)
                .await?;
        }

        let mut seen = HashSet::new();
        let intents: Vec<alert_delivery::ActiveModel> = alert
            .delivery_channels
            .iter()
            .filter(|channel| seen.insert(**channel))
            .map(|channel| alert_delivery::ActiveModel {
                id: Set(id::next_id()),
                tenant_id: Set(alert.tenant_id.clone()),
                alert_id: Set(alert.id.clone()),
                channel: Set(channel.to_string()),
                status: Set(DeliveryStatus::Pending.as_str().to_string()),
                attempts: Set(0),
                last_error: Set(None),
                delivered_at: Set(None),
                created_at: Set(alert.created_at),
                updated_at: Set(alert.created_at),
            })
            .collect();
        if !intents.is_empty() {
            alert_delivery::Entity::insert_many(intents)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(alert_number)
    }

    pub async fn get_alert(&self, tenant_id: &str, alert_id: &str) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(alert_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        model.map(to_alert).transpose()
    }

    pub async fn list_alerts(&self, tenant_id: &str, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut q = Entity::find().filter(Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            q = q.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(test_id) = &filter.test_id {
            q = q.filter(Column::TestId.eq(test_id.as_str()));
        }
        if let Some(result_id) = &filter.test_result_id {
            q = q.filter(Column::TestResultId.eq(result_id.as_str()));
        }
        if let Some(rule_id) = &filter.alert_rule_id {
            q = q.filter(Column::AlertRuleId.eq(rule_id.as_str()));
        }
        if let Some(breached) = filter.sla_breached {
            q = q.filter(Column::SlaBreached.eq(breached));
        }
        let rows = q
            .order_by(Column::AlertNumber, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_alert).collect()
    }

    pub async fn count_recent_alerts(
        &self,
        tenant_id: &str,
        test_id: &str,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::TestId.eq(test_id))
            .filter(Column::AlertRuleId.eq(rule_id))
            .filter(Column::CreatedAt.gte(since))
            .count(self.db())
            .await?)
    }

    pub async fn tenants_with_overdue_alerts(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(Entity::find()
            .select_only()
            .column(Column::TenantId)
            .distinct()
            .filter(Column::SlaDeadline.lt(now))
            .filter(Column::SlaBreached.eq(false))
            .filter(Column::Status.is_not_in(sla_exempt_statuses()))
            .order_by(Column::TenantId, Order::Asc)
            .into_tuple()
            .all(self.db())
            .await?)
    }

    pub async fn mark_sla_breaches(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let res = Entity::update_many()
            .col_expr(Column::SlaBreached, Expr::value(true))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::SlaDeadline.lt(now))
            .filter(Column::SlaBreached.eq(false))
            .filter(Column::Status.is_not_in(sla_exempt_statuses()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn tenants_with_expired_suppressions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        Ok(Entity::find()
            .select_only()
            .column(Column::TenantId)
            .distinct()
            .filter(Column::Status.eq(AlertStatus::Suppressed.as_str()))
            .filter(Column::SuppressedUntil.lt(now))
            .order_by(Column::TenantId, Order::Asc)
            .into_tuple()
            .all(self.db())
            .await?)
    }

    /// System-initiated reopen; bypasses the user transition table.
    pub async fn unsuppress_expired(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Open.as_str()))
            .col_expr(Column::SuppressedUntil, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Status.eq(AlertStatus::Suppressed.as_str()))
            .filter(Column::SuppressedUntil.lt(now))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    /// Moves an alert along its lifecycle and stamps the matching audit columns.
    pub async fn transition_alert(
        &self,
        tenant_id: &str,
        alert_id: &str,
        transition: &AlertTransition,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        let model = Entity::find_by_id(alert_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: ENTITY,
                id: alert_id.to_string(),
            })?;
        let from: AlertStatus = parse_column(ENTITY, "status", &model.status)?;
        let to = transition.to;
        if !from.can_transition_to(to) {
            return Err(ConfigError::InvalidTransition {
                entity: ENTITY,
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        let mut am: alert::ActiveModel = model.clone().into();
        am.status = Set(to.to_string());
        am.updated_at = Set(now);
        match to {
            AlertStatus::Acknowledged => {
                am.acknowledged_at = Set(Some(now));
                am.acknowledged_by = Set(transition.actor.clone());
            }
            AlertStatus::InProgress => {
                if model.acknowledged_at.is_none() {
                    am.acknowledged_at = Set(Some(now));
                    am.acknowledged_by = Set(transition.actor.clone());
                }
            }
            AlertStatus::Resolved => {
                am.resolved_at = Set(Some(now));
                am.resolved_by = Set(transition.actor.clone());
                am.resolution_notes = Set(transition.notes.clone());
            }
            AlertStatus::Closed => {
                if model.resolved_at.is_none() {
                    am.resolved_at = Set(Some(now));
                    am.resolved_by = Set(transition.actor.clone());
                }
                if transition.notes.is_some() {
                    am.resolution_notes = Set(transition.notes.clone());
                }
            }
            AlertStatus::Suppressed => {
                let until = transition
                    .suppressed_until
                    .filter(|until| *until > now)
                    .ok_or(ConfigError::InvalidSuppression)?;
                am.suppressed_until = Set(Some(until));
                am.suppression_reason = Set(transition.notes.clone());
            }
            AlertStatus::Open => {
                am.resolved_at = Set(None);
                am.resolved_by = Set(None);
                am.resolution_notes = Set(None);
                am.suppressed_until = Set(None);
                am.suppression_reason = Set(None);
            }
        }
        let updated = am.update(self.db()).await?;
        to_alert(updated)
    }

    /// Sets or clears the assignee of an alert.
    pub async fn assign_alert(
        &self,
        tenant_id: &str,
        alert_id: &str,
        assignee: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        let model = Entity::find_by_id(alert_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: ENTITY,
                id: alert_id.to_string(),
            })?;
        let mut am: alert::ActiveModel = model.into();
        am.assigned_to = Set(assignee.map(str::to_string));
        am.assigned_at = Set(assignee.map(|_| now));
        am.updated_at = Set(now);
        let updated = am.update(self.db()).await?;
        to_alert(updated)
    }
}
