//! Removal handling: repair the group of an object that left the world.

use crate::config::ItemStackerSettings;
use crate::reconcile::{publish_label, repair_lost_object};
use crate::tracker::{GroupTracker, Promotion};
use stackcraft_events::{EntityRemovedEvent, WorldHost};
use tracing::debug;

/// Handles an `entity_removed` notification.
///
/// Objects the tracker no longer knows (for example because a pass already
/// expired them) are ignored, so repeated notifications are harmless.
pub fn handle_removal(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    event: &EntityRemovedEvent,
    now_ms: u64,
) -> Promotion {
    if !settings.enabled {
        return Promotion::NotTracked;
    }
    let outcome = repair_lost_object(tracker, world, settings, event.entity_id);
    if let Promotion::Promoted { new_primary, associates } = outcome {
        debug!(
            "📦 ItemStacker: {} promoted after {} was removed ({} associates)",
            new_primary, event.entity_id, associates
        );
        publish_label(tracker, world, new_primary, now_ms);
    }
    outcome
}
