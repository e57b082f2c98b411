use grcmon_common::types::{AlertRule, ComplianceTest, TestResult};

/// Pure match-set predicate. Each non-empty set must contain the
/// corresponding attribute; an empty set matches anything. Disabled rules
/// never match.
///
/// The `consecutive_failures` threshold needs result history and is
/// checked by the generator against the store.
pub fn matches(rule: &AlertRule, test: &ComplianceTest, result: &TestResult) -> bool {
    rule.enabled
        && in_set(&rule.match_test_types, &test.test_type)
        && in_set(&rule.match_severities, &test.severity)
        && in_set(&rule.match_result_statuses, &result.status)
        && in_set(&rule.match_control_ids, &test.control_id)
        && (rule.match_tags.is_empty() || test.tags.iter().any(|t| rule.match_tags.contains(t)))
}

fn in_set<T: PartialEq>(set: &[T], value: &T) -> bool {
    set.is_empty() || set.contains(value)
}
