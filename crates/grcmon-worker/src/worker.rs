use grcmon_common::clock::Clock;
use grcmon_notify::{DeliveryPump, DrainStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::reconciler::Reconciler;
use crate::runner::{RunExecutor, RunSummary};

/// What one tick did. Failed steps are logged and leave their fields at zero.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub runs: Vec<RunSummary>,
    pub skipped_tenants: Vec<String>,
    pub sla_breached: u64,
    pub unsuppressed: u64,
    pub stale_runs: u64,
    pub deliveries: DrainStats,
}

/// The supervised background loop: run due tests, reconcile alert state,
/// drain deliveries, then wait for the next tick.
pub struct MonitorWorker {
    runner: RunExecutor,
    reconciler: Reconciler,
    pump: Option<DeliveryPump>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl MonitorWorker {
    pub fn new(
        runner: RunExecutor,
        reconciler: Reconciler,
        pump: Option<DeliveryPump>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            runner,
            reconciler,
            pump,
            clock,
            tick_interval: tick_interval.max(Duration::from_secs(1)),
        }
    }

    pub fn runner(&self) -> &RunExecutor {
        &self.runner
    }

    /// Ticks until `cancel` fires. A tick in progress always completes.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = self.runner.worker_id(),
            tick_secs = self.tick_interval.as_secs(),
            delivery = self.pump.is_some(),
            "Monitor worker started"
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!(worker_id = self.runner.worker_id(), "Monitor worker stopped");
    }

    /// One pass over every step. Errors never escape a tick.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        match self.runner.poll_and_run(now).await {
            Ok(poll) => {
                report.runs = poll.runs;
                report.skipped_tenants = poll.skipped_tenants;
            }
            Err(e) => tracing::error!(error = %e, "Polling due tests failed"),
        }
        match self.reconciler.reconcile_sla_breaches(now).await {
            Ok(n) => report.sla_breached = n,
            Err(e) => tracing::error!(error = %e, "SLA reconciliation failed"),
        }
        match self.reconciler.reconcile_suppression_expiry(now).await {
            Ok(n) => report.unsuppressed = n,
            Err(e) => tracing::error!(error = %e, "Suppression reconciliation failed"),
        }
        match self.reconciler.reap_stale_runs(now).await {
            Ok(n) => report.stale_runs = n,
            Err(e) => tracing::error!(error = %e, "Stale run sweep failed"),
        }
        if let Some(pump) = &self.pump {
            match pump.drain().await {
                Ok(stats) => report.deliveries = stats,
                Err(e) => tracing::error!(error = %e, "Delivery drain failed"),
            }
        }
        report
    }
}
