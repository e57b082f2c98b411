/// Configuration errors raised when a test or alert rule definition is
/// created or updated.
///
/// At runtime the worker never propagates these: a test whose definition
/// no longer validates is recorded with `status = error`.
///
/// # Examples
///
/// ```rust
/// use grcmon_common::error::ConfigError;
///
/// let err = ConfigError::UnknownTestType("quantum_probe".to_string());
/// assert!(err.to_string().contains("quantum_probe"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Neither `interval_minutes` nor `cron_expression` is set.
    #[error("Config: test has no schedule (set interval_minutes or cron_expression)")]
    MissingSchedule,

    /// Both schedule forms are set.
    #[error("Config: test has both interval_minutes and cron_expression")]
    AmbiguousSchedule,

    #[error("Config: interval_minutes must be >= 1 (got {0})")]
    InvalidInterval(i64),

    #[error("Config: invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Config: timeout_seconds must be >= 1 (got {0})")]
    InvalidTimeout(i64),

    /// No executor adapter is registered for the test type.
    #[error("Config: unknown test type '{0}'")]
    UnknownTestType(String),

    /// Adapter-specific validation of the test's `config` object failed.
    #[error("Config: invalid executor config for '{test_type}': {reason}")]
    InvalidExecutorConfig { test_type: String, reason: String },

    #[error("Config: invalid alert rule: {0}")]
    InvalidRule(String),

    #[error("Config: {entity} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Suppressing an alert needs a `suppressed_until` in the future.
    #[error("Config: suppressed_until must be in the future")]
    InvalidSuppression,

    #[error("Config: unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}
