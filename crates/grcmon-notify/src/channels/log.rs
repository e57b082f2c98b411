use anyhow::Result;
use async_trait::async_trait;
use grcmon_common::types::{Alert, DeliveryChannel};

use crate::AlertDispatcher;

/// Writes the alert to the log instead of an external service. Used for
/// channels without a configured integration.
pub struct LogDispatcher {
    channel: DeliveryChannel,
}

impl LogDispatcher {
    pub fn new(channel: DeliveryChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    fn channel(&self) -> DeliveryChannel {
        self.channel
    }

    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        tracing::info!(
            channel = %self.channel,
            tenant_id = %alert.tenant_id,
            alert_id = %alert.id,
            alert_number = alert.alert_number,
            severity = %alert.severity,
            title = %alert.title,
            "Alert delivered to log"
        );
        Ok(())
    }
}
