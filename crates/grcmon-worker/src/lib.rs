//! Background side of the compliance monitoring core.
//!
//! A [`worker::MonitorWorker`] ticks on a fixed interval. Each tick the
//! [`runner::RunExecutor`] executes due tests as one run per tenant (never
//! more than one active run per tenant), failing results are turned into
//! alerts, the [`reconciler::Reconciler`] flags SLA breaches and reopens
//! expired suppressions, and pending alert deliveries are drained.

pub mod catalog;
pub mod config;
pub mod logging;
pub mod reconciler;
pub mod runner;
pub mod schedule;
pub mod worker;

use anyhow::Context;
use grcmon_common::clock::Clock;
use grcmon_common::types::DeliveryChannel;
use grcmon_executor::ExecutorRegistry;
use grcmon_notify::channels::log::LogDispatcher;
use grcmon_notify::channels::webhook::WebhookDispatcher;
use grcmon_notify::{DeliveryPump, DispatcherRegistry};
use grcmon_storage::MonitorRepository;
use std::sync::Arc;
use std::time::Duration;

use config::WorkerConfig;
use reconciler::Reconciler;
use runner::RunExecutor;
use worker::MonitorWorker;

/// Dispatchers for every channel: in-app, webhook when a URL is configured,
/// and the log for channels without an integration.
pub fn build_dispatchers(config: &WorkerConfig) -> anyhow::Result<DispatcherRegistry> {
    let mut registry = DispatcherRegistry::default();
    registry.register(Arc::new(LogDispatcher::new(DeliveryChannel::Slack)));
    registry.register(Arc::new(LogDispatcher::new(DeliveryChannel::Email)));
    match config.delivery.webhook_url.as_deref() {
        Some(url) => registry.register(Arc::new(WebhookDispatcher::new(url)?)),
        None => registry.register(Arc::new(LogDispatcher::new(DeliveryChannel::Webhook))),
    }
    Ok(registry)
}

/// Wires the worker from configuration.
pub fn build_worker(
    config: &WorkerConfig,
    store: Arc<dyn MonitorRepository>,
    executors: Arc<ExecutorRegistry>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<MonitorWorker> {
    let runner = RunExecutor::new(
        store.clone(),
        executors,
        clock.clone(),
        config.worker_id(),
        config.monitor.batch_limit,
    );
    let stale_after = i64::try_from(config.monitor.stale_run_timeout_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .with_context(|| {
            format!(
                "monitor.stale_run_timeout_secs out of range: {}",
                config.monitor.stale_run_timeout_secs
            )
        })?;
    let reconciler = Reconciler::new(store.clone(), stale_after);
    let pump = if config.delivery.enabled {
        Some(DeliveryPump::new(
            store,
            Arc::new(build_dispatchers(config)?),
            clock.clone(),
            config.delivery.batch_limit,
            config.delivery.max_attempts,
        ))
    } else {
        None
    };
    Ok(MonitorWorker::new(
        runner,
        reconciler,
        pump,
        clock,
        Duration::from_secs(config.monitor.tick_interval_secs),
    ))
}
