use sea_orm::entity::prelude::*;

/// Match sets and delivery channels are JSON string arrays.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub match_test_types: String,
    pub match_severities: String,
    pub match_result_statuses: String,
    pub match_control_ids: String,
    pub match_tags: String,
    pub consecutive_failures: i32,
    pub cooldown_minutes: i32,
    pub alert_severity: String,
    pub alert_title_template: Option<String>,
    pub auto_assign_to: Option<String>,
    pub sla_hours: Option<i32>,
    pub delivery_channels: String,
    pub priority: i32,
    pub alerts_generated: i64,
    pub last_triggered_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
