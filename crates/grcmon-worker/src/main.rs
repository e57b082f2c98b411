use anyhow::{Context, Result};
use grcmon_common::clock::{Clock, SystemClock};
use grcmon_executor::ExecutorRegistry;
use grcmon_storage::{MonitorRepository, MonitorStore};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use grcmon_worker::config::WorkerConfig;
use grcmon_worker::{build_worker, logging};

const DEFAULT_CONFIG_PATH: &str = "config/worker.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  grcmon-worker [config.toml]    Run the monitoring worker (default {DEFAULT_CONFIG_PATH})");
}

/// SQLite creates the database file on demand but not its directory.
fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match std::env::args().nth(1) {
        Some(arg) if arg == "-h" || arg == "--help" => {
            print_usage();
            return Ok(());
        }
        Some(path) => path,
        None => DEFAULT_CONFIG_PATH.to_string(),
    };
    let config = WorkerConfig::load(&config_path)?;
    logging::init(&config.logging)?;
    ensure_sqlite_dir(&config.database.url)?;

    let store: Arc<dyn MonitorRepository> = Arc::new(
        MonitorStore::connect(&config.database.url)
            .await
            .context("failed to open monitoring database")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let executors = Arc::new(ExecutorRegistry::default());
    tracing::info!(test_types = ?executors.test_types(), "Executor adapters registered");

    let worker = build_worker(&config, store, executors, clock)?;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, finishing current tick");
    cancel.cancel();
    handle.await?;
    Ok(())
}
