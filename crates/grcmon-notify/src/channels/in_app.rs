use anyhow::Result;
use async_trait::async_trait;
use grcmon_common::types::{Alert, DeliveryChannel};

use crate::AlertDispatcher;

/// In-app delivery: the stored alert is what the UI shows, so there is
/// nothing left to send.
pub struct InAppDispatcher;

#[async_trait]
impl AlertDispatcher for InAppDispatcher {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::InApp
    }

    async fn dispatch(&self, _alert: &Alert) -> Result<()> {
        Ok(())
    }
}
