//! Spawn handling: insert new items, joining a nearby group when possible.

use crate::config::ItemStackerSettings;
use crate::label::display_name_for;
use crate::reconcile::{absorb_into, neighbor_query, publish_label, sorted_neighbors};
use crate::tracker::GroupTracker;
use stackcraft_events::{EntityId, EntityRef, EntitySpawnedEvent, WorldError, WorldHost};
use tracing::{debug, trace};

/// What happened to a newly observed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Not an item, already tracked, gone, or the stacker is disabled
    Ignored,
    /// The payload was not readable yet; the next pass retries
    AwaitingPayload,
    /// Tracked as the primary of a new group
    Tracked,
    /// Tracked and attached to an existing group
    Joined { primary: EntityId },
}

/// Handles an `entity_spawned` notification.
pub fn handle_spawn(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    event: &EntitySpawnedEvent,
    now_ms: u64,
) -> SpawnOutcome {
    if !settings.enabled || event.type_id != settings.item_type {
        return SpawnOutcome::Ignored;
    }
    observe_object(tracker, world, settings, event.entity_id, now_ms)
}

/// Starts tracking `id`, attaching it to the nearest compatible primary in
/// the distance band if there is one.
pub(crate) fn observe_object(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    id: EntityId,
    now_ms: u64,
) -> SpawnOutcome {
    if tracker.contains(id) || !world.is_valid(id) {
        tracker.forget_deferred(id);
        return SpawnOutcome::Ignored;
    }

    let entity = EntityRef::new(world, id);
    let payload = match entity.payload() {
        Ok(payload) => payload,
        Err(WorldError::MissingComponent { .. }) => {
            trace!("📦 ItemStacker: {} has no payload yet", id);
            tracker.defer(id);
            return SpawnOutcome::AwaitingPayload;
        }
        Err(_) => return SpawnOutcome::Ignored,
    };
    let Ok(location) = entity.location() else {
        return SpawnOutcome::Ignored;
    };

    let host = sorted_neighbors(world, &neighbor_query(settings, location), location)
        .into_iter()
        .find(|candidate| {
            *candidate != id
                && tracker
                    .get(*candidate)
                    .is_some_and(|group| group.is_primary() && !group.is_absorbed())
                && world.is_stackable_with(id, *candidate).unwrap_or(false)
        });

    let name = display_name_for(&payload.type_id, payload.name_tag.as_deref());
    tracker.insert(id, name, u64::from(payload.amount), now_ms);
    if world.remove_tag(id, &settings.combined_tag).unwrap_or(false) {
        trace!("📦 ItemStacker: {} carried a stale marker", id);
    }

    let Some(primary) = host else {
        publish_label(tracker, world, id, now_ms);
        return SpawnOutcome::Tracked;
    };
    if let Err(e) = tracker.attach(id, primary) {
        debug!("📦 ItemStacker: {} could not join {}: {}", id, primary, e);
        publish_label(tracker, world, id, now_ms);
        return SpawnOutcome::Tracked;
    }

    let at = world.location(primary).unwrap_or(location);
    absorb_into(tracker, world, settings, id, at);
    publish_label(tracker, world, primary, now_ms);
    SpawnOutcome::Joined { primary }
}
