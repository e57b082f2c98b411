use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::ConfigError;

fn unknown(kind: &'static str, value: &str) -> ConfigError {
    ConfigError::UnknownVariant {
        kind,
        value: value.to_string(),
    }
}

/// Severity of a compliance test or an alert, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use grcmon_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Informational);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "informational" | "info" => Ok(Severity::Informational),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(unknown("severity", s)),
        }
    }
}

/// Lifecycle of a test definition. Only `Active` tests are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Active,
    Paused,
    Deprecated,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Draft => "draft",
            TestStatus::Active => "active",
            TestStatus::Paused => "paused",
            TestStatus::Deprecated => "deprecated",
        }
    }

    /// draft→active; active⇄paused; {active,paused}→deprecated (terminal).
    pub fn can_transition_to(&self, to: TestStatus) -> bool {
        matches!(
            (self, to),
            (TestStatus::Draft, TestStatus::Active)
                | (TestStatus::Active, TestStatus::Paused)
                | (TestStatus::Paused, TestStatus::Active)
                | (TestStatus::Active, TestStatus::Deprecated)
                | (TestStatus::Paused, TestStatus::Deprecated)
        )
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TestStatus::Draft),
            "active" => Ok(TestStatus::Active),
            "paused" => Ok(TestStatus::Paused),
            "deprecated" => Ok(TestStatus::Deprecated),
            _ => Err(unknown("test status", s)),
        }
    }
}

/// When a test fires: every N minutes, or on a 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Interval { minutes: u32 },
    Cron { expression: String },
}

impl Schedule {
    /// Builds a schedule from its two storage columns. Exactly one must be set.
    ///
    /// # Examples
    ///
    /// ```
    /// use grcmon_common::types::Schedule;
    ///
    /// assert_eq!(
    ///     Schedule::from_parts(Some(5), None).unwrap(),
    ///     Schedule::Interval { minutes: 5 }
    /// );
    /// assert!(Schedule::from_parts(Some(5), Some("*/5 * * * *")).is_err());
    /// assert!(Schedule::from_parts(None, None).is_err());
    /// ```
    pub fn from_parts(
        interval_minutes: Option<i64>,
        cron_expression: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let cron_expression = cron_expression.map(str::trim).filter(|c| !c.is_empty());
        match (interval_minutes, cron_expression) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousSchedule),
            (None, None) => Err(ConfigError::MissingSchedule),
            (Some(m), None) if m < 1 || m > i64::from(u32::MAX) => {
                Err(ConfigError::InvalidInterval(m))
            }
            (Some(m), None) => Ok(Schedule::Interval { minutes: m as u32 }),
            (None, Some(expr)) => Ok(Schedule::Cron {
                expression: expr.to_string(),
            }),
        }
    }

    pub fn interval_minutes(&self) -> Option<u32> {
        match self {
            Schedule::Interval { minutes } => Some(*minutes),
            Schedule::Cron { .. } => None,
        }
    }

    pub fn cron_expression(&self) -> Option<&str> {
        match self {
            Schedule::Interval { .. } => None,
            Schedule::Cron { expression } => Some(expression),
        }
    }
}

/// A compliance check definition owned by one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceTest {
    pub id: String,
    pub tenant_id: String,
    /// Tenant-unique human code (e.g. `"AC-2.1"`).
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
    pub timeout_seconds: u32,
    pub retry_count: u32,
    pub retry_delay_seconds: u32,
    /// Opaque object handed to the executor adapter.
    pub config: Value,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceTest {
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::from_parts(self.interval_minutes, self.cron_expression.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and running runs hold the tenant's single-flight slot.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(unknown("run status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
    OnChange,
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Scheduled => "scheduled",
            TriggerType::Manual => "manual",
            TriggerType::OnChange => "on_change",
            TriggerType::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TriggerType::Scheduled),
            "manual" => Ok(TriggerType::Manual),
            "on_change" => Ok(TriggerType::OnChange),
            "webhook" => Ok(TriggerType::Webhook),
            _ => Err(unknown("trigger type", s)),
        }
    }
}

/// Verdict of a single test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pass,
    Fail,
    Error,
    Skip,
    Warning,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
            ResultStatus::Error => "error",
            ResultStatus::Skip => "skip",
            ResultStatus::Warning => "warning",
        }
    }

    /// `fail` and `error` results are the ones that feed alert evaluation.
    pub fn is_failing(&self) -> bool {
        matches!(self, ResultStatus::Fail | ResultStatus::Error)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(ResultStatus::Pass),
            "fail" => Ok(ResultStatus::Fail),
            "error" => Ok(ResultStatus::Error),
            "skip" => Ok(ResultStatus::Skip),
            "warning" => Ok(ResultStatus::Warning),
            _ => Err(unknown("result status", s)),
        }
    }
}

/// Per-status tallies of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    pub warnings: u32,
}

impl RunCounters {
    pub fn with_total(total: u32) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, status: ResultStatus) {
        match status {
            ResultStatus::Pass => self.passed += 1,
            ResultStatus::Fail => self.failed += 1,
            ResultStatus::Error => self.errors += 1,
            ResultStatus::Skip => self.skipped += 1,
            ResultStatus::Warning => self.warnings += 1,
        }
    }

    /// Number of results recorded so far.
    pub fn recorded(&self) -> u32 {
        self.passed + self.failed + self.errors + self.skipped + self.warnings
    }
}

/// A batched execution sweep for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub tenant_id: String,
    /// Monotonic per tenant; assigned by the store on insert.
    pub run_number: i64,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub counters: RunCounters,
    pub worker_id: Option<String>,
    pub triggered_by: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Terminal state written when a run finishes or is aborted.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub counters: RunCounters,
    pub error_message: Option<String>,
}

/// Outcome of one test within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub tenant_id: String,
    pub test_run_id: String,
    pub test_id: String,
    pub control_id: String,
    pub status: ResultStatus,
    /// Denormalized from the test at execution time.
    pub severity: Severity,
    pub message: Option<String>,
    pub details: Value,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub alert_generated: bool,
    pub alert_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outbound delivery channel for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Slack,
    Email,
    Webhook,
    InApp,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Slack => "slack",
            DeliveryChannel::Email => "email",
            DeliveryChannel::Webhook => "webhook",
            DeliveryChannel::InApp => "in_app",
        }
    }
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryChannel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(DeliveryChannel::Slack),
            "email" => Ok(DeliveryChannel::Email),
            "webhook" => Ok(DeliveryChannel::Webhook),
            "in_app" => Ok(DeliveryChannel::InApp),
            _ => Err(unknown("delivery channel", s)),
        }
    }
}

/// Tenant-configured rule turning failing results into alerts.
///
/// Every `match_*` set is a filter; an empty set matches anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub match_test_types: Vec<String>,
    pub match_severities: Vec<Severity>,
    pub match_result_statuses: Vec<ResultStatus>,
    pub match_control_ids: Vec<String>,
    pub match_tags: Vec<String>,
    pub consecutive_failures: u32,
    pub cooldown_minutes: u32,
    pub alert_severity: Severity,
    pub alert_title_template: Option<String>,
    pub auto_assign_to: Option<String>,
    pub sla_hours: Option<u32>,
    pub delivery_channels: Vec<DeliveryChannel>,
    /// Lower value wins.
    pub priority: i32,
    pub alerts_generated: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidRule("name must not be empty".into()));
        }
        if self.consecutive_failures < 1 {
            return Err(ConfigError::InvalidRule(
                "consecutive_failures must be >= 1".into(),
            ));
        }
        if self.sla_hours == Some(0) {
            return Err(ConfigError::InvalidRule("sla_hours must be >= 1".into()));
        }
        if self.delivery_channels.is_empty() {
            return Err(ConfigError::InvalidRule(
                "at least one delivery channel is required".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    InProgress,
    Resolved,
    Suppressed,
    Closed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
            AlertStatus::Closed => "closed",
        }
    }

    /// User-initiated transitions. The reconciler's suppressed→open reopen is
    /// system-initiated and bypasses this table.
    ///
    /// # Examples
    ///
    /// ```
    /// use grcmon_common::types::AlertStatus;
    ///
    /// assert!(AlertStatus::Open.can_transition_to(AlertStatus::Acknowledged));
    /// assert!(!AlertStatus::Open.can_transition_to(AlertStatus::Resolved));
    /// assert!(AlertStatus::Closed.can_transition_to(AlertStatus::Open));
    /// ```
    pub fn can_transition_to(&self, to: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, to),
            (Open, Acknowledged | InProgress | Suppressed | Closed)
                | (Acknowledged, InProgress | Suppressed | Closed)
                | (InProgress, Resolved | Suppressed | Closed)
                | (Resolved, Closed | Open)
                | (Suppressed, Open | Closed)
                | (Closed, Open)
        )
    }

    /// Statuses in which an SLA can no longer be breached.
    pub fn is_sla_exempt(&self) -> bool {
        matches!(
            self,
            AlertStatus::Resolved | AlertStatus::Closed | AlertStatus::Suppressed
        )
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "in_progress" => Ok(AlertStatus::InProgress),
            "resolved" => Ok(AlertStatus::Resolved),
            "suppressed" => Ok(AlertStatus::Suppressed),
            "closed" => Ok(AlertStatus::Closed),
            _ => Err(unknown("alert status", s)),
        }
    }
}

/// A raised incident derived from a failing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub tenant_id: String,
    /// Monotonic per tenant; assigned by the store on insert.
    pub alert_number: i64,
    pub title: String,
    pub message: Option<String>,
    pub severity: Severity,
    pub status: AlertStatus,
    pub test_id: Option<String>,
    pub test_result_id: Option<String>,
    pub control_id: String,
    pub alert_rule_id: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub sla_breached: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub suppressed_until: Option<DateTime<Utc>>,
    pub suppression_reason: Option<String>,
    pub delivery_channels: Vec<DeliveryChannel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested alert status change.
#[derive(Debug, Clone)]
pub struct AlertTransition {
    pub to: AlertStatus,
    pub actor: Option<String>,
    pub notes: Option<String>,
    /// Required when `to` is `Suppressed`.
    pub suppressed_until: Option<DateTime<Utc>>,
}

impl AlertTransition {
    pub fn to(status: AlertStatus) -> Self {
        Self {
            to: status,
            actor: None,
            notes: None,
            suppressed_until: None,
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.suppressed_until = Some(until);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(unknown("delivery status", s)),
        }
    }
}

/// Persistent intent to deliver an alert on one channel (outbox row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryIntent {
    pub id: String,
    pub tenant_id: String,
    pub alert_id: String,
    pub channel: DeliveryChannel,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
