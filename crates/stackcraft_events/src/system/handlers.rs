/// Event handler registration and removal
use crate::events::{Event, EventError, EventHandler, TypedEventHandler};
use super::core::{EventSystem, RegisteredHandler};
use super::subscription::SubscriptionId;
use std::sync::Arc;
use tracing::{debug, info};
use compact_str::CompactString;

impl EventSystem {
    /// Registers a handler for core server events.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stackcraft_events::{EventSystem, ServerTickEvent};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let events = EventSystem::new();
    /// let id = events.on_core("server_tick", |event: ServerTickEvent| {
    ///     println!("tick {}", event.tick_count);
    ///     Ok(())
    /// }).await?;
    /// events.unsubscribe(id).await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn on_core<T, F>(&self, event_name: &str, handler: F) -> Result<SubscriptionId, EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = CompactString::new_inline("core:") + event_name;
        self.register_typed_handler(event_key, None, handler).await
    }

    /// Registers a core event handler filed under `group`.
    ///
    /// All handlers of a group can later be removed with
    /// [`EventSystem::unsubscribe_group`].
    pub async fn on_core_grouped<T, F>(
        &self,
        group: &str,
        event_name: &str,
        handler: F,
    ) -> Result<SubscriptionId, EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = CompactString::new_inline("core:") + event_name;
        self.register_typed_handler(event_key, Some(CompactString::new(group)), handler)
            .await
    }

    /// Registers a handler for plugin-to-plugin events.
    pub async fn on_plugin<T, F>(
        &self,
        plugin_name: &str,
        event_name: &str,
        handler: F,
    ) -> Result<SubscriptionId, EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = CompactString::new_inline("plugin:") + plugin_name + ":" + event_name;
        self.register_typed_handler(event_key, None, handler).await
    }

    /// Removes a single handler. Returns `false` if the id is unknown,
    /// which makes repeated calls harmless.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, event_key)) = self.subscriptions.remove(&id) else {
            return false;
        };

        let removed = match self.handlers.get_mut(&event_key) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|registered| registered.id != id);
                before != entry.len()
            }
            None => false,
        };
        self.handlers.remove_if(&event_key, |_, list| list.is_empty());

        if removed {
            let mut stats = self.stats.write().await;
            stats.total_handlers = stats.total_handlers.saturating_sub(1);
            stats.unsubscribed += 1;
            debug!("🗑️ Unsubscribed {} from {}", id, event_key);
        }
        removed
    }

    /// Removes every handler registered under `group` and returns how many
    /// were removed.
    pub async fn unsubscribe_group(&self, group: &str) -> usize {
        let ids: Vec<SubscriptionId> = self
            .handlers
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|registered| registered.group.as_deref() == Some(group))
                    .map(|registered| registered.id)
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut removed = 0;
        for id in ids {
            if self.unsubscribe(id).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("🗑️ Removed {} handlers of group '{}'", removed, group);
        }
        removed
    }

    /// Internal helper for registering typed handlers.
    async fn register_typed_handler<T, F>(
        &self,
        event_key: CompactString,
        group: Option<CompactString>,
        handler: F,
    ) -> Result<SubscriptionId, EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let handler_name = format!("{}::{}", event_key, T::type_name());
        let typed_handler = TypedEventHandler::new(handler_name, handler);
        let handler_arc: Arc<dyn EventHandler> = Arc::new(typed_handler);
        let id = SubscriptionId::new();

        self.handlers
            .entry(event_key.clone())
            .or_default()
            .push(RegisteredHandler { id, group, handler: handler_arc });
        self.subscriptions.insert(id, event_key.clone());

        let mut stats = self.stats.write().await;
        stats.total_handlers += 1;

        info!("📝 Registered handler for {}", event_key);
        Ok(id)
    }
}
