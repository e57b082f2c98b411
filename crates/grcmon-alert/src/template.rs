use grcmon_common::types::{ComplianceTest, Severity, TestResult};

/// Renders an alert title.
///
/// Known placeholders are `{{test.title}}`, `{{test.identifier}}`,
/// `{{test.id}}`, `{{severity}}` (the alert severity), `{{control_id}}` and
/// `{{result.status}}`. Whitespace inside the braces is ignored. Anything
/// else is copied through verbatim. A missing or blank template yields
/// `"<title> failed on <identifier>"`.
///
/// # Examples
///
/// ```
/// # use chrono::Utc;
/// # use grcmon_common::types::*;
/// # let now = Utc::now();
/// # let test = ComplianceTest {
/// #     id: "t-1".into(), tenant_id: "acme".into(), identifier: "AC-2".into(),
/// #     title: "MFA enforced".into(), description: None, test_type: "endpoint".into(),
/// #     severity: Severity::High, status: TestStatus::Active, control_id: "ctl-7".into(),
/// #     tags: vec![], interval_minutes: Some(5), cron_expression: None,
/// #     timeout_seconds: 60, retry_count: 0, retry_delay_seconds: 0,
/// #     config: serde_json::json!({}), last_run_at: None, next_run_at: None,
/// #     created_at: now, updated_at: now,
/// # };
/// # let result = TestResult {
/// #     id: "r-1".into(), tenant_id: "acme".into(), test_run_id: "run-1".into(),
/// #     test_id: "t-1".into(), control_id: "ctl-7".into(), status: ResultStatus::Fail,
/// #     severity: Severity::High, message: None, details: serde_json::json!({}),
/// #     error_message: None, attempts: 1, started_at: now, completed_at: None,
/// #     duration_ms: None, alert_generated: false, alert_id: None, created_at: now,
/// # };
/// use grcmon_alert::render_title;
///
/// let title = render_title(Some("[{{severity}}] {{ test.identifier }} {{unknown}}"), &test, &result, Severity::Critical);
/// assert_eq!(title, "[critical] AC-2 {{unknown}}");
/// assert_eq!(render_title(None, &test, &result, Severity::Low), "MFA enforced failed on AC-2");
/// ```
pub fn render_title(
    template: Option<&str>,
    test: &ComplianceTest,
    result: &TestResult,
    severity: Severity,
) -> String {
    let template = match template {
        Some(t) if !t.trim().is_empty() => t,
        _ => return format!("{} failed on {}", test.title, test.identifier),
    };

    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        // A stray `{{` before a real placeholder is literal text.
        if let Some(nested) = after_open[..close].rfind("{{") {
            out.push_str(&rest[open..open + 2 + nested]);
            rest = &after_open[nested..];
            continue;
        }
        let token = &rest[open..open + 2 + close + 2];
        match lookup(after_open[..close].trim(), test, result, severity) {
            Some(value) => out.push_str(value),
            None => out.push_str(token),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(
    key: &str,
    test: &'a ComplianceTest,
    result: &'a TestResult,
    severity: Severity,
) -> Option<&'a str> {
    match key {
        "test.title" => Some(&test.title),
        "test.identifier" => Some(&test.identifier),
        "test.id" => Some(&test.id),
        "severity" => Some(severity.as_str()),
        "control_id" => Some(&test.control_id),
        "result.status" => Some(result.status.as_str()),
        _ => None,
    }
}
