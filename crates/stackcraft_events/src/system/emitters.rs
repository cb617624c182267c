/// Event emission methods
use crate::events::{Event, EventError};
use crate::world::WorldNotification;
use super::core::EventSystem;
use compact_str::CompactString;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{error, trace};

impl EventSystem {
    /// Emits a core event to all registered handlers.
    #[inline]
    pub async fn emit_core<T>(&self, event_name: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let event_key = CompactString::new_inline("core:") + event_name;
        self.emit_event(&event_key, event).await
    }

    /// Emits a plugin event to all registered handlers.
    #[inline]
    pub async fn emit_plugin<T>(
        &self,
        plugin_name: &str,
        event_name: &str,
        event: &T,
    ) -> Result<(), EventError>
    where
        T: Event,
    {
        let event_key = CompactString::new_inline("plugin:") + plugin_name + ":" + event_name;
        self.emit_event(&event_key, event).await
    }

    /// Emits a queued world notification as its core event.
    pub async fn emit_world(&self, notification: &WorldNotification) -> Result<(), EventError> {
        let name = notification.event_name();
        match notification {
            WorldNotification::Spawned(event) => self.emit_core(name, event).await,
            WorldNotification::Died(event) => self.emit_core(name, event).await,
            WorldNotification::Removed(event) => self.emit_core(name, event).await,
        }
    }

    /// Internal emit implementation.
    ///
    /// The event is serialized once and every handler of the key is driven to
    /// completion before this returns. Handler failures are logged and counted
    /// but never abort delivery to the remaining handlers.
    async fn emit_event<T>(&self, event_key: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let data = Arc::new(event.serialize()?);

        // Clone the handler list out so no map lock is held while handlers run
        let event_handlers: Vec<_> = self
            .handlers
            .get(event_key)
            .map(|entry| entry.value().iter().map(|registered| registered.handler.clone()).collect())
            .unwrap_or_default();

        let mut failures = 0u64;
        if !event_handlers.is_empty() {
            if cfg!(debug_assertions) {
                trace!("📤 Emitting {} to {} handlers", event_key, event_handlers.len());
            }

            let mut futures = FuturesUnordered::new();
            for handler in event_handlers.iter() {
                let data = data.clone();
                futures.push(async move {
                    let result = handler.handle(&data).await;
                    (handler.handler_name(), result)
                });
            }

            while let Some((handler_name, result)) = futures.next().await {
                if let Err(e) = result {
                    error!("❌ Handler {} failed: {}", handler_name, e);
                    failures += 1;
                }
            }
        } else {
            trace!("📭 No handlers for {}", event_key);
        }

        let mut stats = self.stats.write().await;
        stats.events_emitted += 1;
        stats.handler_failures += failures;

        Ok(())
    }
}
