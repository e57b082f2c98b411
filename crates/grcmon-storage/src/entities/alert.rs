use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub alert_number: i64,
    pub title: String,
    pub message: Option<String>,
    pub severity: String,
    pub status: String,
    pub test_id: Option<String>,
    pub test_result_id: Option<String>,
    pub control_id: String,
    pub alert_rule_id: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTimeUtc>,
    pub sla_deadline: Option<DateTimeUtc>,
    pub sla_breached: bool,
    pub acknowledged_at: Option<DateTimeUtc>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTimeUtc>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub suppressed_until: Option<DateTimeUtc>,
    pub suppression_reason: Option<String>,
    pub delivery_channels: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
