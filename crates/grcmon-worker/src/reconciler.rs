use chrono::{DateTime, Duration, Utc};
use grcmon_common::types::{RunCompletion, RunStatus};
use grcmon_storage::{MonitorRepository, Result};
use std::sync::Arc;

pub const STALE_RUN: &str = "stale_run";

/// Idempotent sweeps over alert and run state. Each is safe to run on every
/// tick and by several workers at once.
pub struct Reconciler {
    store: Arc<dyn MonitorRepository>,
    stale_run_timeout: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn MonitorRepository>, stale_run_timeout: Duration) -> Self {
        Self {
            store,
            stale_run_timeout,
        }
    }

    /// Flags open alerts whose SLA deadline has passed. Returns how many
    /// alerts were newly flagged.
    pub async fn reconcile_sla_breaches(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut flagged = 0;
        for tenant_id in self.store.tenants_with_overdue_alerts(now).await? {
            match self.store.mark_sla_breaches(&tenant_id, now).await {
                Ok(0) => {}
                Ok(n) => {
                    tracing::info!(tenant_id = %tenant_id, count = n, "SLA breaches flagged");
                    flagged += n;
                }
                Err(e) => {
                    tracing::error!(tenant_id = %tenant_id, error = %e, "SLA breach sweep failed");
                }
            }
        }
        Ok(flagged)
    }

    /// Reopens suppressed alerts whose suppression window has ended.
    pub async fn reconcile_suppression_expiry(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut reopened = 0;
        for tenant_id in self.store.tenants_with_expired_suppressions(now).await? {
            match self.store.unsuppress_expired(&tenant_id, now).await {
                Ok(0) => {}
                Ok(n) => {
                    tracing::info!(tenant_id = %tenant_id, count = n, "Expired suppressions reopened");
                    reopened += n;
                }
                Err(e) => {
                    tracing::error!(tenant_id = %tenant_id, error = %e, "Unsuppress sweep failed");
                }
            }
        }
        Ok(reopened)
    }

    /// Fails runs left pending or running past the stale timeout so the
    /// tenant can be scheduled again.
    pub async fn reap_stale_runs(&self, now: DateTime<Utc>) -> Result<u64> {
        let Some(started_before) = now.checked_sub_signed(self.stale_run_timeout) else {
            tracing::warn!(
                timeout_secs = self.stale_run_timeout.num_seconds(),
                "Stale run timeout reaches before the earliest representable time, skipping"
            );
            return Ok(0);
        };
        let mut reaped = 0;
        for run in self.store.list_stale_runs(started_before).await? {
            let started_at = run.started_at.unwrap_or(run.created_at);
            let completion = RunCompletion {
                status: RunStatus::Failed,
                completed_at: now,
                duration_ms: (now - started_at).num_milliseconds().max(1),
                counters: run.counters,
                error_message: Some(STALE_RUN.to_string()),
            };
            match self
                .store
                .finalize_run(&run.tenant_id, &run.id, &completion)
                .await
            {
                Ok(false) => {
                    tracing::debug!(tenant_id = %run.tenant_id, run_id = %run.id, "Stale run finished before it was reaped");
                }
                Ok(true) => {
                    tracing::warn!(
                        tenant_id = %run.tenant_id,
                        run_id = %run.id,
                        worker_id = run.worker_id.as_deref().unwrap_or("-"),
                        "Stale run failed"
                    );
                    reaped += 1;
                }
                Err(e) => {
                    tracing::error!(tenant_id = %run.tenant_id, run_id = %run.id, error = %e, "Stale run could not be failed");
                }
            }
        }
        Ok(reaped)
    }
}
