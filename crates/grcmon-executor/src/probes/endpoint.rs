use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grcmon_common::error::ConfigError;
use grcmon_common::types::ResultStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::{AdapterError, ExecutionOutcome, TestExecutor};

pub const TEST_TYPE: &str = "endpoint";

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

/// Config object of an `endpoint` test.
///
/// ```json
/// {"url": "https://app.example.com/health", "expected_status": [200, 204], "max_latency_ms": 500}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,
    /// Responses slower than this are reported as `warning`.
    pub max_latency_ms: Option<u64>,
}

impl EndpointConfig {
    fn parse(config: &Value) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidExecutorConfig {
            test_type: TEST_TYPE.to_string(),
            reason,
        };
        let cfg: EndpointConfig =
            serde_json::from_value(config.clone()).map_err(|e| invalid(e.to_string()))?;
        if !(cfg.url.starts_with("http://") || cfg.url.starts_with("https://")) {
            return Err(invalid(format!("url must be http(s): {}", cfg.url)));
        }
        if !matches!(cfg.method.to_uppercase().as_str(), "GET" | "HEAD") {
            return Err(invalid(format!("unsupported method {}", cfg.method)));
        }
        if cfg.expected_status.is_empty() {
            return Err(invalid("expected_status must not be empty".to_string()));
        }
        Ok(cfg)
    }
}

/// HTTP reachability probe: passes when the endpoint answers with one of the
/// expected status codes.
pub struct EndpointProbe {
    client: reqwest::Client,
}

impl EndpointProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for EndpointProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TestExecutor for EndpointProbe {
    fn test_type(&self) -> &str {
        TEST_TYPE
    }

    fn validate_config(&self, config: &Value) -> Result<(), ConfigError> {
        EndpointConfig::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        config: &Value,
        deadline: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, AdapterError> {
        let cfg = EndpointConfig::parse(config).map_err(|e| AdapterError::Failed(e.to_string()))?;
        let budget = (deadline - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_millis(1));

        let request = if cfg.method.eq_ignore_ascii_case("HEAD") {
            self.client.head(&cfg.url)
        } else {
            self.client.get(&cfg.url)
        };

        let started = Instant::now();
        let response = request.timeout(budget).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AdapterError::Transient(e.to_string())
            } else {
                AdapterError::Failed(e.to_string())
            }
        })?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let status = response.status().as_u16();
        let details = json!({
            "url": cfg.url,
            "status_code": status,
            "latency_ms": latency_ms,
        });

        if !cfg.expected_status.contains(&status) {
            tracing::debug!(url = %cfg.url, status, "Endpoint returned unexpected status");
            return Ok(ExecutionOutcome::fail(format!(
                "unexpected status {status}, expected one of {:?}",
                cfg.expected_status
            ))
            .with_details(details));
        }
        if let Some(max) = cfg.max_latency_ms.filter(|max| latency_ms > *max) {
            return Ok(ExecutionOutcome::new(ResultStatus::Warning)
                .with_message(format!("latency {latency_ms}ms exceeds {max}ms"))
                .with_details(details));
        }
        Ok(ExecutionOutcome::pass()
            .with_message(format!("status {status} in {latency_ms}ms"))
            .with_details(details))
    }
}
