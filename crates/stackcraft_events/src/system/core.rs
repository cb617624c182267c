/// Core EventSystem implementation
use crate::events::EventHandler;
use super::stats::EventSystemStats;
use super::subscription::SubscriptionId;
use std::sync::Arc;
use dashmap::DashMap;
use compact_str::CompactString;
use tokio::sync::RwLock;

/// A handler together with the bookkeeping needed to remove it again.
#[derive(Debug, Clone)]
pub(super) struct RegisteredHandler {
    pub(super) id: SubscriptionId,
    pub(super) group: Option<CompactString>,
    pub(super) handler: Arc<dyn EventHandler>,
}

/// The core event system that manages event routing and handler execution.
///
/// This is the central hub for all event processing. It provides type-safe
/// event registration and emission for core (`core:*`) and plugin
/// (`plugin:<name>:*`) events.
///
/// Uses DashMap for lock-free concurrent access to handlers. Every
/// registration yields a [`SubscriptionId`], and registrations may be filed
/// under a named group so a component can drop all of its handlers at once.
pub struct EventSystem {
    /// Map of event keys to their registered handlers
    pub(super) handlers: DashMap<CompactString, Vec<RegisteredHandler>>,
    /// Reverse index from subscription to event key
    pub(super) subscriptions: DashMap<SubscriptionId, CompactString>,
    /// System statistics for monitoring
    pub(super) stats: RwLock<EventSystemStats>,
}

impl std::fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("handlers", &"[handlers]")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventSystem {
    /// Creates a new event system with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            subscriptions: DashMap::new(),
            stats: RwLock::new(EventSystemStats::default()),
        }
    }

    /// Gets the current event system statistics
    #[inline]
    pub async fn get_stats(&self) -> EventSystemStats {
        self.stats.read().await.clone()
    }

    /// Number of handlers currently registered for an exact event key.
    pub fn handler_count(&self, event_key: &str) -> usize {
        self.handlers.get(event_key).map(|entry| entry.len()).unwrap_or(0)
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}
