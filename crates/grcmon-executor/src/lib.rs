//! Executor adapter contract for compliance tests.
//!
//! Each `test_type` is served by one [`TestExecutor`] registered in an
//! [`ExecutorRegistry`]. Adapters only perform the check: they never touch
//! persistence, and the run executor owns timeouts, retries and recording.

pub mod probes;
pub mod registry;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grcmon_common::error::ConfigError;
use grcmon_common::types::ResultStatus;
use serde_json::Value;

pub use registry::ExecutorRegistry;

/// Verdict returned by an adapter for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: ResultStatus,
    pub message: Option<String>,
    pub details: Value,
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn new(status: ResultStatus) -> Self {
        Self {
            status,
            message: None,
            details: Value::Object(Default::default()),
            error_message: None,
        }
    }

    pub fn pass() -> Self {
        Self::new(ResultStatus::Pass)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Fail).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

/// Failures an adapter can signal instead of a verdict.
///
/// # Examples
///
/// ```rust
/// use grcmon_executor::AdapterError;
///
/// let err = AdapterError::Transient("connection reset".to_string());
/// assert!(err.is_transient());
/// assert!(err.to_string().contains("connection reset"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The check could not run this time and may succeed on retry.
    #[error("Executor: transient failure: {0}")]
    Transient(String),

    /// The check failed to run and retrying will not help.
    #[error("Executor: {0}")]
    Failed(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

/// A pluggable implementation of one `test_type`.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// The test type served (e.g. `"endpoint"`).
    fn test_type(&self) -> &str;

    /// Checks a test's `config` object when the test is created or updated.
    fn validate_config(&self, _config: &Value) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Runs the check. `deadline` is the instant after which the caller
    /// abandons the attempt and records `deadline_exceeded`.
    async fn execute(
        &self,
        config: &Value,
        deadline: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, AdapterError>;
}
