use grcmon_common::types::DeliveryChannel;
use std::collections::HashMap;
use std::sync::Arc;

use crate::channels::in_app::InAppDispatcher;
use crate::AlertDispatcher;

/// Dispatchers keyed by delivery channel.
///
/// # Examples
///
/// ```
/// use grcmon_common::types::DeliveryChannel;
/// use grcmon_notify::DispatcherRegistry;
///
/// let registry = DispatcherRegistry::default();
/// assert!(registry.has(DeliveryChannel::InApp));
/// assert!(!registry.has(DeliveryChannel::Slack));
/// ```
pub struct DispatcherRegistry {
    dispatchers: HashMap<DeliveryChannel, Arc<dyn AlertDispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self {
            dispatchers: HashMap::new(),
        }
    }

    pub fn register(&mut self, dispatcher: Arc<dyn AlertDispatcher>) {
        self.dispatchers.insert(dispatcher.channel(), dispatcher);
    }

    pub fn get(&self, channel: DeliveryChannel) -> Option<Arc<dyn AlertDispatcher>> {
        self.dispatchers.get(&channel).cloned()
    }

    pub fn has(&self, channel: DeliveryChannel) -> bool {
        self.dispatchers.contains_key(&channel)
    }

    pub fn channels(&self) -> Vec<DeliveryChannel> {
        let mut channels: Vec<DeliveryChannel> = self.dispatchers.keys().copied().collect();
        channels.sort_by_key(|c| c.as_str());
        channels
    }
}

impl Default for DispatcherRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InAppDispatcher));
        registry
    }
}
