use chrono::{DateTime, Duration, Utc};
use grcmon_common::clock::Clock;
use grcmon_common::id;
use grcmon_common::types::{Alert, AlertRule, AlertStatus, ComplianceTest, TestResult};
use grcmon_storage::{MonitorRepository, Result};
use std::sync::Arc;

use crate::matcher::matches;
use crate::template::render_title;

/// Turns failing results into alerts using the tenant's rules.
pub struct AlertGenerator {
    store: Arc<dyn MonitorRepository>,
    clock: Arc<dyn Clock>,
}

impl AlertGenerator {
    pub fn new(store: Arc<dyn MonitorRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluates the tenant's enabled rules against a stored result and
    /// raises at most one alert. Returns the new alert's id.
    ///
    /// Rules are walked by `priority`, then `created_at`. The first rule that
    /// matches decides: if it is cooling down for this test, nothing is raised
    /// and later rules are not consulted.
    pub async fn maybe_generate(
        &self,
        test: &ComplianceTest,
        result: &TestResult,
    ) -> Result<Option<String>> {
        if !result.status.is_failing() {
            return Ok(None);
        }
        let tenant_id = result.tenant_id.as_str();
        let rules = self.store.list_enabled_alert_rules(tenant_id).await?;

        for rule in &rules {
            if !matches(rule, test, result) {
                continue;
            }
            if rule.consecutive_failures > 1
                && !self
                    .store
                    .consecutive_failures_for(tenant_id, &test.id, rule.consecutive_failures)
                    .await?
            {
                tracing::debug!(
                    tenant_id,
                    rule_id = %rule.id,
                    test_id = %test.id,
                    required = rule.consecutive_failures,
                    "Consecutive failure threshold not reached"
                );
                continue;
            }

            let now = self.clock.now();
            if rule.cooldown_minutes > 0 {
                let since = now - Duration::minutes(i64::from(rule.cooldown_minutes));
                let recent = self
                    .store
                    .count_recent_alerts(tenant_id, &test.id, &rule.id, since)
                    .await?;
                if recent > 0 {
                    tracing::debug!(
                        tenant_id,
                        rule_id = %rule.id,
                        test_id = %test.id,
                        "Alert suppressed (cooldown)"
                    );
                    return Ok(None);
                }
            }

            let alert = build_alert(rule, test, result, now);
            let alert_number = self.store.insert_alert(&alert, Some(&result.id)).await?;
            tracing::info!(
                tenant_id,
                alert_id = %alert.id,
                alert_number,
                rule_id = %rule.id,
                test_id = %test.id,
                severity = %alert.severity,
                "Alert raised"
            );
            return Ok(Some(alert.id));
        }
        Ok(None)
    }
}

fn build_alert(
    rule: &AlertRule,
    test: &ComplianceTest,
    result: &TestResult,
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        id: id::next_id(),
        tenant_id: result.tenant_id.clone(),
        alert_number: 0,
        title: render_title(
            rule.alert_title_template.as_deref(),
            test,
            result,
            rule.alert_severity,
        ),
        message: result.message.clone().or_else(|| result.error_message.clone()),
        severity: rule.alert_severity,
        status: AlertStatus::Open,
        test_id: Some(test.id.clone()),
        test_result_id: Some(result.id.clone()),
        control_id: test.control_id.clone(),
        alert_rule_id: Some(rule.id.clone()),
        assigned_to: rule.auto_assign_to.clone(),
        assigned_at: rule.auto_assign_to.as_ref().map(|_| now),
        sla_deadline: rule
            .sla_hours
            .map(|hours| now + Duration::hours(i64::from(hours))),
        sla_breached: false,
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: None,
        resolved_by: None,
        resolution_notes: None,
        suppressed_until: None,
        suppression_reason: None,
        delivery_channels: rule.delivery_channels.clone(),
        created_at: now,
        updated_at: now,
    }
}
