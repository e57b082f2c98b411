use grcmon_common::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::TestExecutor;

/// Registry of [`TestExecutor`]s keyed by test type.
///
/// Built explicitly at startup and handed to the worker; there is no global
/// instance.
///
/// # Examples
///
/// ```
/// use grcmon_executor::ExecutorRegistry;
///
/// let registry = ExecutorRegistry::default();
/// assert!(registry.has("endpoint"));
/// assert!(registry.resolve("nonexistent").is_none());
/// ```
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TestExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registers `executor` under its own test type, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn TestExecutor>) {
        let test_type = executor.test_type().to_string();
        self.executors.insert(test_type, executor);
    }

    pub fn resolve(&self, test_type: &str) -> Option<Arc<dyn TestExecutor>> {
        self.executors.get(test_type).cloned()
    }

    pub fn has(&self, test_type: &str) -> bool {
        self.executors.contains_key(test_type)
    }

    pub fn test_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Validates a test definition's type and config against the registered adapter.
    pub fn validate(&self, test_type: &str, config: &Value) -> Result<(), ConfigError> {
        let executor = self
            .executors
            .get(test_type)
            .ok_or_else(|| ConfigError::UnknownTestType(test_type.to_string()))?;
        executor.validate_config(config)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::probes::endpoint::EndpointProbe::new()));
        registry
    }
}
