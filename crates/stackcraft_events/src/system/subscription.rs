/// Subscription identity for registered handlers
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle returned for every handler registration.
///
/// Dropping the id does not unsubscribe; pass it to
/// [`super::EventSystem::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
