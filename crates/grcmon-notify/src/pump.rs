use grcmon_common::clock::Clock;
use grcmon_common::types::{DeliveryIntent, DeliveryStatus};
use grcmon_storage::{MonitorRepository, Result};
use std::sync::Arc;

use crate::registry::DispatcherRegistry;

/// Outcome counts of one [`DeliveryPump::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: u64,
    /// Failed attempts that stay pending for a later pass.
    pub retrying: u64,
    /// Intents that reached the attempt limit.
    pub failed: u64,
    /// Intents skipped because of a storage error.
    pub errored: u64,
}

/// Drains pending delivery intents through the registered dispatchers.
pub struct DeliveryPump {
    store: Arc<dyn MonitorRepository>,
    registry: Arc<DispatcherRegistry>,
    clock: Arc<dyn Clock>,
    batch_limit: u64,
    max_attempts: u32,
}

impl DeliveryPump {
    pub fn new(
        store: Arc<dyn MonitorRepository>,
        registry: Arc<DispatcherRegistry>,
        clock: Arc<dyn Clock>,
        batch_limit: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            batch_limit,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Attempts each pending intent once, oldest first. A storage error on
    /// one intent is logged and leaves it pending for the next pass.
    pub async fn drain(&self) -> Result<DrainStats> {
        let pending = self.store.list_pending_deliveries(self.batch_limit).await?;
        let mut stats = DrainStats::default();
        for intent in &pending {
            match self.deliver(intent).await {
                Ok(DeliveryStatus::Sent) => stats.sent += 1,
                Ok(DeliveryStatus::Pending) => stats.retrying += 1,
                Ok(DeliveryStatus::Failed) => stats.failed += 1,
                Err(e) => {
                    tracing::error!(
                        tenant_id = %intent.tenant_id,
                        delivery_id = %intent.id,
                        error = %e,
                        "Delivery could not be processed"
                    );
                    stats.errored += 1;
                }
            }
        }
        if !pending.is_empty() {
            tracing::debug!(
                sent = stats.sent,
                retrying = stats.retrying,
                failed = stats.failed,
                errored = stats.errored,
                "Delivery pass complete"
            );
        }
        Ok(stats)
    }

    async fn deliver(&self, intent: &DeliveryIntent) -> Result<DeliveryStatus> {
        let Some(alert) = self
            .store
            .get_alert(&intent.tenant_id, &intent.alert_id)
            .await?
        else {
            return self.fail(intent, "alert_not_found").await;
        };
        let Some(dispatcher) = self.registry.get(intent.channel) else {
            tracing::warn!(
                tenant_id = %intent.tenant_id,
                alert_id = %intent.alert_id,
                channel = %intent.channel,
                "No dispatcher registered for channel"
            );
            return self.fail(intent, "no_dispatcher_for_channel").await;
        };

        match dispatcher.dispatch(&alert).await {
            Ok(()) => {
                self.store
                    .mark_delivery_sent(&intent.tenant_id, &intent.id, self.clock.now())
                    .await?;
                tracing::debug!(
                    tenant_id = %intent.tenant_id,
                    alert_id = %intent.alert_id,
                    channel = %intent.channel,
                    "Alert delivered"
                );
                Ok(DeliveryStatus::Sent)
            }
            Err(e) => self.fail(intent, &e.to_string()).await,
        }
    }

    async fn fail(&self, intent: &DeliveryIntent, error: &str) -> Result<DeliveryStatus> {
        let status = self
            .store
            .mark_delivery_failed(
                &intent.tenant_id,
                &intent.id,
                error,
                self.max_attempts,
                self.clock.now(),
            )
            .await?;
        if status == DeliveryStatus::Failed {
            tracing::error!(
                tenant_id = %intent.tenant_id,
                alert_id = %intent.alert_id,
                channel = %intent.channel,
                error,
                "Alert delivery abandoned"
            );
        } else {
            tracing::warn!(
                tenant_id = %intent.tenant_id,
                alert_id = %intent.alert_id,
                channel = %intent.channel,
                error,
                "Alert delivery failed, will retry"
            );
        }
        Ok(status)
    }
}
