/// Statistics tracking for the event system
use serde::{Deserialize, Serialize};

/// Core event system statistics for monitoring
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventSystemStats {
    /// Number of currently registered event handlers
    pub total_handlers: usize,
    /// Total number of events emitted since system start
    pub events_emitted: u64,
    /// Number of handler invocations that returned an error
    pub handler_failures: u64,
    /// Number of subscriptions removed through `unsubscribe*`
    pub unsubscribed: u64,
}
