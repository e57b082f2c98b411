use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Upper bound for `monitor.stale_run_timeout_secs` (30 days).
pub const MAX_STALE_RUN_TIMEOUT_SECS: u64 = 30 * 24 * 3600;

/// Worker process configuration, loaded from TOML.
///
/// Every section and field is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite://...` or `postgres://...`
    #[serde(default = "default_database_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Maximum number of due tests picked up per tick, across all tenants.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u64,
    /// Applied on test create when the definition omits it.
    #[serde(default)]
    pub default_retry_count: u32,
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u32,
    /// Defaults to `<hostname>-<short id>`.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// Runs left pending or running longer than this are failed as stale.
    #[serde(default = "default_stale_run_timeout_secs")]
    pub stale_run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_delivery_batch_limit")]
    pub batch_limit: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Enables the webhook dispatcher.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default directive merged with `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_database_url() -> String {
    "sqlite://data/grcmon.db?mode=rwc".to_string()
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_batch_limit() -> u64 {
    100
}

fn default_timeout_seconds() -> u32 {
    60
}

fn default_stale_run_timeout_secs() -> u64 {
    3600
}

fn default_delivery_batch_limit() -> u64 {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_log_filter() -> String {
    "grcmon=info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            batch_limit: default_batch_limit(),
            default_retry_count: 0,
            default_timeout_seconds: default_timeout_seconds(),
            worker_id: None,
            stale_run_timeout_secs: default_stale_run_timeout_secs(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_limit: default_delivery_batch_limit(),
            max_attempts: default_max_attempts(),
            webhook_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: true,
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::parse(&content).with_context(|| format!("invalid config file {path}"))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.monitor.tick_interval_secs == 0 {
            anyhow::bail!("monitor.tick_interval_secs must be >= 1");
        }
        if config.monitor.batch_limit == 0 {
            anyhow::bail!("monitor.batch_limit must be >= 1");
        }
        if config.monitor.default_timeout_seconds == 0 {
            anyhow::bail!("monitor.default_timeout_seconds must be >= 1");
        }
        let stale = config.monitor.stale_run_timeout_secs;
        if !(1..=MAX_STALE_RUN_TIMEOUT_SECS).contains(&stale) {
            anyhow::bail!(
                "monitor.stale_run_timeout_secs must be between 1 and {MAX_STALE_RUN_TIMEOUT_SECS}, got {stale}"
            );
        }
        Ok(config)
    }

    /// Configured worker id, or `<hostname>-<short id>`.
    pub fn worker_id(&self) -> String {
        match self.monitor.worker_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let host = sysinfo::System::host_name().unwrap_or_else(|| "worker".to_string());
                format!("{host}-{}", grcmon_common::id::short_id())
            }
        }
    }
}
