use chrono::{DateTime, Utc};
use grcmon_common::types::AlertRule;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    QueryFilter, QueryOrder,
};

use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::{decode_list, encode_list, parse_column, to_i32, to_u32, MonitorStore};

const ENTITY: &str = "alert_rule";

fn to_rule(m: alert_rule::Model) -> Result<AlertRule> {
    Ok(AlertRule {
        match_test_types: serde_json::from_str(&m.match_test_types)?,
        match_severities: decode_list(ENTITY, "match_severities", &m.match_severities)?,
        match_result_statuses: decode_list(
            ENTITY,
            "match_result_statuses",
            &m.match_result_statuses,
        )?,
        match_control_ids: serde_json::from_str(&m.match_control_ids)?,
        match_tags: serde_json::from_str(&m.match_tags)?,
        alert_severity: parse_column(ENTITY, "alert_severity", &m.alert_severity)?,
        delivery_channels: decode_list(ENTITY, "delivery_channels", &m.delivery_channels)?,
        consecutive_failures: to_u32(m.consecutive_failures),
        cooldown_minutes: to_u32(m.cooldown_minutes),
        sla_hours: m.sla_hours.map(to_u32),
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        description: m.description,
        enabled: m.enabled,
        alert_title_template: m.alert_title_template,
        auto_assign_to: m.auto_assign_to,
        priority: m.priority,
        alerts_generated: m.alerts_generated,
        last_triggered_at: m.last_triggered_at,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

impl MonitorStore {
    /// Validates and stores a new rule.
    pub async fn insert_alert_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        rule.validate()?;
        let am = alert_rule::ActiveModel {
            id: Set(rule.id.clone()),
            tenant_id: Set(rule.tenant_id.clone()),
            name: Set(rule.name.clone()),
            description: Set(rule.description.clone()),
            enabled: Set(rule.enabled),
            match_test_types: Set(serde_json::to_string(&rule.match_test_types)?),
            match_severities: Set(encode_list(&rule.match_severities)?),
            match_result_statuses: Set(encode_list(&rule.match_result_statuses)?),
            match_control_ids: Set(serde_json::to_string(&rule.match_control_ids)?),
            match_tags: Set(serde_json::to_string(&rule.match_tags)?),
            consecutive_failures: Set(to_i32(rule.consecutive_failures)),
            cooldown_minutes: Set(to_i32(rule.cooldown_minutes)),
            alert_severity: Set(rule.alert_severity.to_string()),
            alert_title_template: Set(rule.alert_title_template.clone()),
            auto_assign_to: Set(rule.auto_assign_to.clone()),
            sla_hours: Set(rule.sla_hours.map(to_i32)),
            delivery_channels: Set(encode_list(&rule.delivery_channels)?),
            priority: Set(rule.priority),
            alerts_generated: Set(0),
            last_triggered_at: Set(None),
            created_at: Set(rule.created_at),
            updated_at: Set(rule.updated_at),
        };
        let model = am.insert(self.db()).await?;
        to_rule(model)
    }

    pub async fn get_alert_rule(&self, tenant_id: &str, rule_id: &str) -> Result<Option<AlertRule>> {
        let model = Entity::find_by_id(rule_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        model.map(to_rule).transpose()
    }

    /// All rules of a tenant in evaluation order, disabled ones included.
    pub async fn list_alert_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::Priority, Order::Asc)
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_rule).collect()
    }

    pub async fn list_enabled_alert_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Enabled.eq(true))
            .order_by(Column::Priority, Order::Asc)
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_rule).collect()
    }

    pub async fn set_alert_rule_enabled(
        &self,
        tenant_id: &str,
        rule_id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let res = Entity::update_many()
            .col_expr(Column::Enabled, Expr::value(enabled))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(rule_id))
            .filter(Column::TenantId.eq(tenant_id))
            .exec(self.db())
            .await?;
        if res.rows_affected == 0 {
            return Err(StorageError::NotFound {
                entity: ENTITY,
                id: rule_id.to_string(),
            });
        }
        Ok(())
    }
}
