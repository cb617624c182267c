//! # Reconciliation Loop
//!
//! One pass re-evaluates every tracked group against the live world:
//!
//! 1. **Liveness** - a vanished object leaves the tracker; a vanished primary
//!    hands its group to an associate
//! 2. **Expiry** - an expired primary is removed from the world together with
//!    all of its associates
//! 3. **Repair** - orphaned associates become primaries of their own
//! 4. **Re-sync** - associates are moved onto their primary and amounts are
//!    re-read from the payloads
//! 5. **Merge** - untracked neighbors still carrying an absorbed marker from
//!    an earlier run are released first; then compatible neighbors inside the distance band, nearest
//!    first, are absorbed with their whole star
//! 6. **Overflow** - totals above one physical stack stay on a single proxy;
//!    only the label shows the combined amount
//! 7. **Labels** - written in a final sweep once every group is settled
//!
//! The world may lose objects at any point, including through this pass's
//! own removals. Every world call is re-validated and a stale object only
//! ever costs its own tracker record.

use crate::config::ItemStackerSettings;
use crate::handlers::spawn::{observe_object, SpawnOutcome};
use crate::label::{display_name_for, remaining_secs, render_label};
use crate::tracker::{GroupTracker, Promotion, TrackedGroup};
use serde::{Deserialize, Serialize};
use stackcraft_events::{EntityId, EntityQuery, EntityRef, Vec3, WorldError, WorldHost};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Counters describing what one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub groups_checked: usize,
    pub stale_dropped: usize,
    pub promoted: usize,
    pub expired_groups: usize,
    pub expired_objects: usize,
    pub healed: usize,
    pub merged: usize,
    pub adopted: usize,
    pub markers_released: usize,
    pub awaiting_payload: usize,
    pub overflowing: usize,
    pub labels_written: usize,
    /// Set when the pass stopped early because the stacker was cancelled
    pub interrupted: bool,
}

impl PassReport {
    /// Whether the pass changed any group membership.
    pub fn changed_groups(&self) -> bool {
        self.stale_dropped + self.promoted + self.expired_groups + self.healed + self.merged + self.adopted > 0
    }
}

/// Runs one reconciliation pass. See [`Reconciler`].
pub fn run_pass(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    now_ms: u64,
) -> PassReport {
    Reconciler::new(tracker, world, settings, now_ms).run()
}

/// State of one reconciliation pass.
pub struct Reconciler<'a> {
    tracker: &'a mut GroupTracker,
    world: &'a dyn WorldHost,
    settings: &'a ItemStackerSettings,
    now_ms: u64,
    cancel: Option<&'a AtomicBool>,
    report: PassReport,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        tracker: &'a mut GroupTracker,
        world: &'a dyn WorldHost,
        settings: &'a ItemStackerSettings,
        now_ms: u64,
    ) -> Self {
        Self {
            tracker,
            world,
            settings,
            now_ms,
            cancel: None,
            report: PassReport::default(),
        }
    }

    /// Stops the pass between groups once `cancel` is set.
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        !self.settings.enabled || self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Executes the pass and returns its report.
    pub fn run(mut self) -> PassReport {
        if self.cancelled() {
            self.report.interrupted = true;
            return self.report;
        }

        self.retry_deferred();

        for id in self.tracker.ids() {
            if self.cancelled() {
                self.report.interrupted = true;
                return self.report;
            }
            self.reconcile_group(id);
        }

        self.write_labels();
        self.report
    }

    fn retry_deferred(&mut self) {
        for id in self.tracker.take_deferred() {
            match observe_object(self.tracker, self.world, self.settings, id, self.now_ms) {
                SpawnOutcome::AwaitingPayload => self.report.awaiting_payload += 1,
                SpawnOutcome::Tracked | SpawnOutcome::Joined { .. } => self.report.adopted += 1,
                SpawnOutcome::Ignored => {}
            }
        }
    }

    fn reconcile_group(&mut self, id: EntityId) {
        let Some(group) = self.tracker.get(id) else {
            // Removed earlier in this pass
            return;
        };
        let expired = self.now_ms >= group.expires_at_ms();
        self.report.groups_checked += 1;

        if !self.world.is_valid(id) {
            self.drop_lost(id);
            return;
        }

        if expired {
            self.expire(id);
            return;
        }

        if self.tracker.heal(id) {
            debug!("📦 ItemStacker: healed orphaned associate {}", id);
            let _ = self.world.remove_tag(id, &self.settings.combined_tag);
            self.report.healed += 1;
        }

        if self.tracker.get(id).is_some_and(TrackedGroup::is_primary) {
            self.reconcile_primary(id);
        }
    }

    fn drop_lost(&mut self, id: EntityId) {
        match repair_lost_object(self.tracker, self.world, self.settings, id) {
            Promotion::Promoted { new_primary, .. } => {
                debug!("📦 ItemStacker: {} vanished, {} took over its group", id, new_primary);
                self.report.promoted += 1;
            }
            Promotion::Deleted => {
                trace!("📦 ItemStacker: dropped stale group {}", id);
                self.report.stale_dropped += 1;
            }
            Promotion::NotTracked => {}
        }
    }

    fn expire(&mut self, id: EntityId) {
        let is_primary = self.tracker.get(id).is_some_and(TrackedGroup::is_primary);
        let removed = if is_primary {
            self.tracker.remove_group(id)
        } else {
            self.tracker.remove(id).map(|_| vec![id]).unwrap_or_default()
        };

        for object in &removed {
            match self.world.remove(*object) {
                Ok(()) => self.report.expired_objects += 1,
                Err(e) => trace!("📦 ItemStacker: expired object already gone: {}", e),
            }
        }
        if is_primary {
            self.report.expired_groups += 1;
            debug!("📦 ItemStacker: group {} expired ({} objects)", id, removed.len());
        }
    }

    fn reconcile_primary(&mut self, id: EntityId) {
        let entity = EntityRef::new(self.world, id);
        let payload = match entity.payload() {
            Ok(payload) => payload,
            Err(WorldError::MissingComponent { .. }) => {
                self.report.awaiting_payload += 1;
                return;
            }
            Err(_) => {
                self.drop_lost(id);
                return;
            }
        };
        let Ok(location) = entity.location() else {
            self.drop_lost(id);
            return;
        };

        self.tracker.refresh_amount(id, u64::from(payload.amount));
        self.resync_associates(id, location);
        self.release_stale_markers(id, location);

        for neighbor in sorted_neighbors(self.world, &neighbor_query(self.settings, location), location) {
            self.try_merge(id, neighbor, location);
        }

        let total = self.tracker.recompute_total(id).unwrap_or_default();
        let limit = self.settings.stack_limit(payload.max_amount);
        if total > limit {
            trace!("📦 ItemStacker: group {} holds {} items, above one stack of {}", id, total, limit);
            self.report.overflowing += 1;
        }
    }

    fn resync_associates(&mut self, primary: EntityId, location: Vec3) {
        let associates: Vec<EntityId> = self
            .tracker
            .get(primary)
            .map(|group| group.associates().collect())
            .unwrap_or_default();

        for associate in associates {
            let rider = EntityRef::new(self.world, associate);
            let refreshed = rider
                .teleport_to(location)
                .and_then(|()| self.world.item_payload(associate));
            match refreshed {
                Ok(Some(payload)) => {
                    self.tracker.refresh_amount(associate, u64::from(payload.amount));
                }
                Ok(None) => {}
                Err(_) => {
                    self.tracker.remove(associate);
                    self.report.stale_dropped += 1;
                }
            }
        }
        self.tracker.recompute_total(primary);
    }

    /// Clears the absorbed marker of untracked objects around `location` so
    /// the neighbor query can see them again.
    fn release_stale_markers(&mut self, primary: EntityId, location: Vec3) {
        let query = EntityQuery::around(location)
            .of_type(self.settings.item_type.clone())
            .within_radius(self.settings.max_distance);
        for candidate in self.world.query_entities(&query) {
            if candidate == primary || self.tracker.contains(candidate) {
                continue;
            }
            if self.world.remove_tag(candidate, &self.settings.combined_tag).unwrap_or(false) {
                trace!("📦 ItemStacker: released stale marker of {}", candidate);
                self.report.markers_released += 1;
            }
        }
    }

    fn try_merge(&mut self, primary: EntityId, neighbor: EntityId, location: Vec3) {
        if neighbor == primary || !self.world.is_valid(neighbor) {
            return;
        }
        if self.world.has_tag(neighbor, &self.settings.combined_tag).unwrap_or(true) {
            return;
        }
        if let Some(record) = self.tracker.get(neighbor) {
            if record.is_absorbed() || !record.is_primary() {
                return;
            }
        }
        if !self.world.is_stackable_with(primary, neighbor).unwrap_or(false) {
            return;
        }

        let payload = match self.world.item_payload(neighbor) {
            Ok(Some(payload)) => payload,
            _ => return,
        };
        if self.tracker.contains(neighbor) {
            self.tracker.refresh_amount(neighbor, u64::from(payload.amount));
            self.tracker.recompute_total(neighbor);
        } else {
            let name = display_name_for(&payload.type_id, payload.name_tag.as_deref());
            self.tracker.insert(neighbor, name, u64::from(payload.amount), self.now_ms);
            self.report.adopted += 1;
        }

        let moved = match self.tracker.attach(neighbor, primary) {
            Ok(moved) => moved,
            Err(e) => {
                debug!("📦 ItemStacker: cannot merge {} into {}: {}", neighbor, primary, e);
                return;
            }
        };
        for member in moved {
            absorb_into(self.tracker, self.world, self.settings, member, location);
        }
        self.report.merged += 1;
    }

    fn write_labels(&mut self) {
        for id in self.tracker.ids() {
            if !self.world.is_valid(id) {
                continue;
            }
            let Some(group) = self.tracker.get(id) else {
                continue;
            };
            let label = label_for(group, self.now_ms);
            let current = self.world.name_tag(id).unwrap_or_default();
            if current != label && self.world.set_name_tag(id, &label).is_ok() {
                self.report.labels_written += 1;
            }
        }
    }
}

/// Spatial query for merge candidates around `location`.
pub(crate) fn neighbor_query(settings: &ItemStackerSettings, location: Vec3) -> EntityQuery {
    EntityQuery::around(location)
        .of_type(settings.item_type.clone())
        .within(settings.min_distance, settings.max_distance)
        .excluding_tag(settings.combined_tag.clone())
}

/// Runs `query` and orders the hits by distance to `origin`, nearest first.
pub(crate) fn sorted_neighbors(world: &dyn WorldHost, query: &EntityQuery, origin: Vec3) -> Vec<EntityId> {
    let mut hits: Vec<(f64, EntityId)> = world
        .query_entities(query)
        .into_iter()
        .filter_map(|id| world.location(id).ok().map(|at| (at.distance(origin), id)))
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, id)| id).collect()
}

/// Marks `member` as absorbed and hides it at `location`.
pub(crate) fn absorb_into(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    member: EntityId,
    location: Vec3,
) {
    tracker.set_absorbed(member, true);
    let rider = EntityRef::new(world, member);
    let projected = rider
        .add_marker(&settings.combined_tag)
        .and_then(|_| rider.teleport_to(location))
        .and_then(|()| rider.set_label(""));
    if let Err(e) = projected {
        trace!("📦 ItemStacker: absorbed {} vanished: {}", member, e);
    }
}

/// Repairs the tracker after `id` left the world.
///
/// A primary hands its group to its first live associate, which is made
/// visible to neighbor queries again; an associate just leaves its group.
pub fn repair_lost_object(
    tracker: &mut GroupTracker,
    world: &dyn WorldHost,
    settings: &ItemStackerSettings,
    id: EntityId,
) -> Promotion {
    tracker.forget_deferred(id);
    let outcome = tracker.detach_and_promote(id, |candidate| world.is_valid(candidate));
    if let Promotion::Promoted { new_primary, .. } = outcome {
        let _ = world.remove_tag(new_primary, &settings.combined_tag);
    }
    outcome
}

/// Writes the current label of a tracked object right away.
pub(crate) fn publish_label(tracker: &GroupTracker, world: &dyn WorldHost, id: EntityId, now_ms: u64) {
    if let Some(group) = tracker.get(id) {
        if let Err(e) = world.set_name_tag(id, &label_for(group, now_ms)) {
            trace!("📦 ItemStacker: cannot label {}: {}", id, e);
        }
    }
}

/// Label a group's object should carry: the primary shows the total and the
/// countdown, associates show nothing.
pub(crate) fn label_for(group: &TrackedGroup, now_ms: u64) -> String {
    if group.is_primary() {
        render_label(
            group.total_amount(),
            group.display_name(),
            remaining_secs(group.expires_at_ms(), now_ms),
        )
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests;
