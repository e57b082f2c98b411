//! Outbound delivery of raised alerts.
//!
//! Alerts are enqueued as `alert_deliveries` rows in the same transaction
//! that creates them. The [`pump::DeliveryPump`] drains pending rows and
//! hands each to the [`AlertDispatcher`] registered for its channel.
//! Built-in dispatchers: in-app (the alert row is the delivery), log, and
//! webhook.

pub mod channels;
pub mod error;
pub mod pump;
pub mod registry;


use anyhow::Result;
use async_trait::async_trait;
use grcmon_common::types::{Alert, DeliveryChannel};

pub use pump::{DeliveryPump, DrainStats};
pub use registry::DispatcherRegistry;

/// Sends an alert through one delivery channel.
///
/// A returned error leaves the delivery intent pending for another attempt
/// on a later tick, up to the pump's attempt limit.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// The channel this dispatcher serves.
    fn channel(&self) -> DeliveryChannel;

    async fn dispatch(&self, alert: &Alert) -> Result<()>;
}
