use chrono::{DateTime, Utc};
use grcmon_common::types::{DeliveryIntent, DeliveryStatus};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    QueryFilter, QueryOrder, QuerySelect,
};

use crate::entities::alert_delivery::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::{parse_column, to_u32, MonitorStore};

const ENTITY: &str = "alert_delivery";

fn to_intent(m: alert_delivery::Model) -> Result<DeliveryIntent> {
    Ok(DeliveryIntent {
        channel: parse_column(ENTITY, "channel", &m.channel)?,
        status: parse_column(ENTITY, "status", &m.status)?,
        attempts: to_u32(m.attempts),
        id: m.id,
        tenant_id: m.tenant_id,
        alert_id: m.alert_id,
        last_error: m.last_error,
        delivered_at: m.delivered_at,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

impl MonitorStore {
    /// Oldest pending intents first, across tenants.
    pub async fn list_pending_deliveries(&self, limit: u64) -> Result<Vec<DeliveryIntent>> {
        let rows = Entity::find()
            .filter(Column::Status.eq(DeliveryStatus::Pending.as_str()))
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .limit(limit)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_intent).collect()
    }

    pub async fn list_deliveries_for_alert(
        &self,
        tenant_id: &str,
        alert_id: &str,
    ) -> Result<Vec<DeliveryIntent>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::AlertId.eq(alert_id))
            .order_by(Column::Channel, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_intent).collect()
    }

    pub async fn mark_delivery_sent(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(DeliveryStatus::Sent.as_str()))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .col_expr(Column::LastError, Expr::value(Option::<String>::None))
            .col_expr(Column::DeliveredAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(delivery_id))
            .filter(Column::TenantId.eq(tenant_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn mark_delivery_failed(
        &self,
        tenant_id: &str,
        delivery_id: &str,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryStatus> {
        let model = Entity::find_by_id(delivery_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: ENTITY,
                id: delivery_id.to_string(),
            })?;
        let attempts = model.attempts.saturating_add(1);
        let status = if to_u32(attempts) >= max_attempts {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Pending
        };
        let mut am: alert_delivery::ActiveModel = model.into();
        am.attempts = Set(attempts);
        am.status = Set(status.as_str().to_string());
        am.last_error = Set(Some(error.to_string()));
        am.updated_at = Set(now);
        am.update(self.db()).await?;
        Ok(status)
    }
}
