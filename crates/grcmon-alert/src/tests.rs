use crate::generator::AlertGenerator;
use crate::matcher::matches;
use crate::template::render_title;
use chrono::{DateTime, Duration, TimeZone, Utc};
use grcmon_common::clock::{Clock, ManualClock};
use grcmon_common::id;
use grcmon_common::types::{
    AlertRule, ComplianceTest, DeliveryChannel, ResultStatus, RunCompletion, RunCounters,
    RunStatus, Severity, TestResult, TestRun, TestStatus, TriggerType,
};
use grcmon_storage::store::AlertFilter;
use grcmon_storage::MonitorStore;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn make_test(tenant: &str) -> ComplianceTest {
    ComplianceTest {
        id: id::next_id(),
        tenant_id: tenant.to_string(),
        identifier: "AC-2.1".to_string(),
        title: "MFA enforced".to_string(),
        description: None,
        test_type: "config_probe".to_string(),
        severity: Severity::High,
        status: TestStatus::Active,
        control_id: "ctrl-ac2".to_string(),
        tags: vec!["soc2".to_string(), "iam".to_string()],
        interval_minutes: Some(5),
        cron_expression: None,
        timeout_seconds: 60,
        retry_count: 0,
        retry_delay_seconds: 0,
        config: json!({}),
        last_run_at: None,
        next_run_at: Some(base()),
        created_at: base(),
        updated_at: base(),
    }
}

fn make_result(test: &ComplianceTest, status: ResultStatus, at: DateTime<Utc>) -> TestResult {
    TestResult {
        id: id::next_id(),
        tenant_id: test.tenant_id.clone(),
        test_run_id: "run-1".to_string(),
        test_id: test.id.clone(),
        control_id: test.control_id.clone(),
        status,
        severity: test.severity,
        message: Some("MFA disabled for 3 users".to_string()),
        details: json!({}),
        error_message: None,
        attempts: 1,
        started_at: at,
        completed_at: Some(at),
        duration_ms: Some(1),
        alert_generated: false,
        alert_id: None,
        created_at: at,
    }
}

fn make_rule(tenant: &str, name: &str, priority: i32, severity: Severity) -> AlertRule {
    AlertRule {
        id: id::next_id(),
        tenant_id: tenant.to_string(),
        name: name.to_string(),
        description: None,
        enabled: true,
        match_test_types: vec![],
        match_severities: vec![],
        match_result_statuses: vec![],
        match_control_ids: vec![],
        match_tags: vec![],
        consecutive_failures: 1,
        cooldown_minutes: 0,
        alert_severity: severity,
        alert_title_template: None,
        auto_assign_to: None,
        sla_hours: Some(4),
        delivery_channels: vec![DeliveryChannel::InApp],
        priority,
        alerts_generated: 0,
        last_triggered_at: None,
        created_at: base(),
        updated_at: base(),
    }
}

async fn setup() -> (TempDir, Arc<MonitorStore>, Arc<ManualClock>, AlertGenerator) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/grcmon.db?mode=rwc", dir.path().display());
    let store = Arc::new(MonitorStore::connect(&url).await.unwrap());
    let clock = Arc::new(ManualClock::new(base()));
    let generator = AlertGenerator::new(store.clone(), clock.clone());
    (dir, store, clock, generator)
}

/// Stores a result inside its own completed run.
async fn record(
    store: &MonitorStore,
    test: &ComplianceTest,
    status: ResultStatus,
    at: DateTime<Utc>,
) -> TestResult {
    let run = TestRun {
        id: id::next_id(),
        tenant_id: test.tenant_id.clone(),
        run_number: 0,
        status: RunStatus::Running,
        trigger_type: TriggerType::Scheduled,
        started_at: Some(at),
        completed_at: None,
        duration_ms: None,
        counters: RunCounters::with_total(1),
        worker_id: None,
        triggered_by: None,
        error_message: None,
        created_at: at,
    };
    store.insert_run(&run).await.unwrap().unwrap();
    let mut result = make_result(test, status, at);
    result.test_run_id = run.id.clone();
    store.insert_result(&result).await.unwrap();
    let completion = RunCompletion {
        status: RunStatus::Completed,
        completed_at: at,
        duration_ms: 1,
        counters: RunCounters::with_total(1),
        error_message: None,
    };
    store
        .finalize_run(&test.tenant_id, &run.id, &completion)
        .await
        .unwrap();
    result
}

#[test]
fn empty_match_sets_match_everything() {
    let test = make_test("t1");
    let result = make_result(&test, ResultStatus::Fail, base());
    let rule = make_rule("t1", "any", 1, Severity::High);
    assert!(matches(&rule, &test, &result));

    let mut disabled = rule.clone();
    disabled.enabled = false;
    assert!(!matches(&disabled, &test, &result));
}

#[test]
fn each_match_set_filters() {
    let test = make_test("t1");
    let result = make_result(&test, ResultStatus::Error, base());
    let any = make_rule("t1", "r", 1, Severity::High);

    let mut r = any.clone();
    r.match_test_types = vec!["endpoint".into()];
    assert!(!matches(&r, &test, &result));
    r.match_test_types.push("config_probe".into());
    assert!(matches(&r, &test, &result));

    let mut r = any.clone();
    r.match_severities = vec![Severity::Critical];
    assert!(!matches(&r, &test, &result));
    r.match_severities.push(Severity::High);
    assert!(matches(&r, &test, &result));

    let mut r = any.clone();
    r.match_result_statuses = vec![ResultStatus::Fail];
    assert!(!matches(&r, &test, &result));
    r.match_result_statuses.push(ResultStatus::Error);
    assert!(matches(&r, &test, &result));

    let mut r = any.clone();
    r.match_control_ids = vec!["ctrl-other".into()];
    assert!(!matches(&r, &test, &result));

    let mut r = any.clone();
    r.match_tags = vec!["pci".into()];
    assert!(!matches(&r, &test, &result));
    r.match_tags.push("iam".into());
    assert!(matches(&r, &test, &result));
}

#[test]
fn template_substitutes_known_placeholders_once() {
    let test = make_test("t1");
    let result = make_result(&test, ResultStatus::Fail, base());
    let title = render_title(
        Some("{{test.title}} ({{test.identifier}}/{{test.id}}) {{result.status}} on {{control_id}} as {{severity}}"),
        &test,
        &result,
        Severity::Critical,
    );
    assert_eq!(
        title,
        format!("MFA enforced (AC-2.1/{}) fail on ctrl-ac2 as critical", test.id)
    );

    // Substituted values are not rescanned.
    let mut tricky = test.clone();
    tricky.title = "{{test.identifier}}".to_string();
    assert_eq!(
        render_title(Some("{{test.title}}"), &tricky, &result, Severity::Low),
        "{{test.identifier}}"
    );
}

#[test]
fn template_keeps_unknown_and_unclosed_tokens() {
    let test = make_test("t1");
    let result = make_result(&test, ResultStatus::Fail, base());
    assert_eq!(
        render_title(Some("{{owner}} / {{test.identifier"), &test, &result, Severity::Low),
        "{{owner}} / {{test.identifier"
    );
    assert_eq!(
        render_title(Some("   "), &test, &result, Severity::Low),
        "MFA enforced failed on AC-2.1"
    );
}

#[test]
fn stray_open_braces_do_not_swallow_a_placeholder() {
    let test = make_test("t1");
    let result = make_result(&test, ResultStatus::Fail, base());
    assert_eq!(
        render_title(Some("{{x {{test.identifier}}"), &test, &result, Severity::Low),
        "{{x AC-2.1"
    );
    assert_eq!(
        render_title(Some("{{ {{ {{severity}} done"), &test, &result, Severity::High),
        "{{ {{ high done"
    );
    assert_eq!(
        render_title(Some("{{{test.identifier}}"), &test, &result, Severity::Low),
        "{{{test.identifier}}"
    );
}

#[tokio::test]
async fn first_matching_rule_wins() {
    let (_dir, store, _clock, generator) = setup().await;
    let test = make_test("t1");
    let r2 = make_rule("t1", "low", 2, Severity::Low);
    let r1 = make_rule("t1", "critical", 1, Severity::Critical);
    store.insert_alert_rule(&r2).await.unwrap();
    store.insert_alert_rule(&r1).await.unwrap();

    let result = record(&store, &test, ResultStatus::Fail, base()).await;
    let alert_id = generator.maybe_generate(&test, &result).await.unwrap().unwrap();

    let alerts = store.list_alerts("t1", &AlertFilter::default()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, alert_id);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].alert_rule_id.as_deref(), Some(r1.id.as_str()));
    assert_eq!(alerts[0].sla_deadline, Some(base() + Duration::hours(4)));
    assert_eq!(alerts[0].title, "MFA enforced failed on AC-2.1");

    let linked = store.get_result("t1", &result.id).await.unwrap().unwrap();
    assert!(linked.alert_generated);
    assert_eq!(linked.alert_id, Some(alert_id));
}

#[tokio::test]
async fn cooldown_blocks_without_falling_through() {
    let (_dir, store, clock, generator) = setup().await;
    let test = make_test("t1");
    let mut r1 = make_rule("t1", "primary", 1, Severity::High);
    r1.cooldown_minutes = 30;
    let r2 = make_rule("t1", "fallback", 2, Severity::Low);
    store.insert_alert_rule(&r1).await.unwrap();
    store.insert_alert_rule(&r2).await.unwrap();

    let first = record(&store, &test, ResultStatus::Fail, base()).await;
    assert!(generator.maybe_generate(&test, &first).await.unwrap().is_some());

    clock.advance(Duration::minutes(3));
    let second = record(&store, &test, ResultStatus::Fail, clock.now()).await;
    assert!(generator.maybe_generate(&test, &second).await.unwrap().is_none());

    let alerts = store.list_alerts("t1", &AlertFilter::default()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    let second = store.get_result("t1", &second.id).await.unwrap().unwrap();
    assert!(!second.alert_generated);

    clock.advance(Duration::minutes(30));
    let third = record(&store, &test, ResultStatus::Fail, clock.now()).await;
    assert!(generator.maybe_generate(&test, &third).await.unwrap().is_some());
}

#[tokio::test]
async fn consecutive_failures_threshold_falls_through_until_met() {
    let (_dir, store, clock, generator) = setup().await;
    let test = make_test("t1");
    let mut strict = make_rule("t1", "three strikes", 1, Severity::Critical);
    strict.consecutive_failures = 3;
    let mut lenient = make_rule("t1", "any failure", 2, Severity::Low);
    lenient.match_result_statuses = vec![ResultStatus::Error];
    store.insert_alert_rule(&strict).await.unwrap();
    store.insert_alert_rule(&lenient).await.unwrap();

    for _ in 0..2 {
        let result = record(&store, &test, ResultStatus::Fail, clock.now()).await;
        assert!(generator.maybe_generate(&test, &result).await.unwrap().is_none());
        clock.advance(Duration::minutes(5));
    }
    let result = record(&store, &test, ResultStatus::Fail, clock.now()).await;
    generator.maybe_generate(&test, &result).await.unwrap().unwrap();

    let alerts = store.list_alerts("t1", &AlertFilter::default()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
}

#[tokio::test]
async fn auto_assign_and_templates_are_applied() {
    let (_dir, store, _clock, generator) = setup().await;
    let test = make_test("t1");
    let mut rule = make_rule("t1", "assign", 1, Severity::Medium);
    rule.auto_assign_to = Some("secops".to_string());
    rule.alert_title_template = Some("[{{severity}}] {{test.identifier}} {{result.status}}".into());
    rule.sla_hours = None;
    rule.delivery_channels = vec![DeliveryChannel::InApp, DeliveryChannel::Slack];
    store.insert_alert_rule(&rule).await.unwrap();

    let result = record(&store, &test, ResultStatus::Error, base()).await;
    let alert_id = generator.maybe_generate(&test, &result).await.unwrap().unwrap();

    let alert = store.get_alert("t1", &alert_id).await.unwrap().unwrap();
    assert_eq!(alert.title, "[medium] AC-2.1 error");
    assert_eq!(alert.assigned_to.as_deref(), Some("secops"));
    assert_eq!(alert.assigned_at, Some(base()));
    assert_eq!(alert.sla_deadline, None);
    assert_eq!(alert.message.as_deref(), Some("MFA disabled for 3 users"));
    assert_eq!(
        store.list_deliveries_for_alert("t1", &alert_id).await.unwrap().len(),
        2
    );
    let rule = store.get_alert_rule("t1", &rule.id).await.unwrap().unwrap();
    assert_eq!(rule.alerts_generated, 1);
}

#[tokio::test]
async fn rules_never_cross_tenants() {
    let (_dir, store, _clock, generator) = setup().await;
    store
        .insert_alert_rule(&make_rule("other", "theirs", 1, Severity::High))
        .await
        .unwrap();
    let test = make_test("t1");
    let result = record(&store, &test, ResultStatus::Fail, base()).await;
    assert!(generator.maybe_generate(&test, &result).await.unwrap().is_none());

    let passing = record(&store, &test, ResultStatus::Pass, base() + Duration::minutes(1)).await;
    store
        .insert_alert_rule(&make_rule("t1", "mine", 1, Severity::High))
        .await
        .unwrap();
    assert!(generator.maybe_generate(&test, &passing).await.unwrap().is_none());
}
