//! # Mob Stacks
//!
//! Every tracked mob stands for `amount` mobs of its type. Newly spawned mobs
//! are folded into the biggest stack nearby, a periodic pass merges
//! neighboring stacks, and a killed stack leaves a replacement carrying the
//! rest.
//!
//! Like the item stacker, all functions here operate on plain state so the
//! plugin can call them under its own lock and tests can call them directly.

use crate::config::{is_blacklisted, EntityStackerSettings, BLACKLISTED_TYPES};
use crate::name::render_name;
use serde::{Deserialize, Serialize};
use stackcraft_events::{
    display_name_for, DamageCause, EntityDiedEvent, EntityId, EntityQuery, EntityRemovedEvent,
    EntitySpawnedEvent, Vec3, WorldError, WorldHost,
};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// One tracked mob and the number of mobs it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobStack {
    pub display_name: String,
    pub amount: u64,
}

/// All tracked stacks, keyed by the entity that carries them.
#[derive(Debug, Default)]
pub struct MobStacks {
    stacks: BTreeMap<EntityId, MobStack>,
}

impl MobStacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.stacks.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&MobStack> {
        self.stacks.get(&id)
    }

    /// Sum of all stack amounts.
    pub fn total_mobs(&self) -> u64 {
        self.stacks.values().map(|stack| stack.amount).sum()
    }

    fn ids(&self) -> Vec<EntityId> {
        self.stacks.keys().copied().collect()
    }

    fn get_mut(&mut self, id: EntityId) -> Option<&mut MobStack> {
        self.stacks.get_mut(&id)
    }

    fn insert(&mut self, id: EntityId, stack: MobStack) {
        self.stacks.insert(id, stack);
    }

    fn remove(&mut self, id: EntityId) -> Option<MobStack> {
        self.stacks.remove(&id)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Blacklisted, already tracked, gone, or the stacker is disabled
    Ignored,
    /// Became a stack of one
    Tracked,
    /// Removed and counted into an existing stack
    Stacked { into: EntityId, amount: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathOutcome {
    /// Not tracked, or the stacker is disabled
    Ignored,
    /// The stack ended with this death
    Untracked,
    /// A replacement carries the rest of the stack
    Respawned { replacement: EntityId, amount: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectSpawn {
    Stacked { into: EntityId, amount: u64 },
    Spawned(EntityId),
}

/// Counters of one merge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub checked: usize,
    pub dropped: usize,
    pub merged: usize,
    pub renamed: usize,
}

// ============================================================================
// Operations
// ============================================================================

/// Handles an `entity_spawned` notification.
pub fn handle_spawn(
    stacks: &mut MobStacks,
    world: &dyn WorldHost,
    settings: &EntityStackerSettings,
    event: &EntitySpawnedEvent,
) -> SpawnOutcome {
    let id = event.entity_id;
    if !settings.enabled || is_blacklisted(&event.type_id) || stacks.contains(id) || !world.is_valid(id) {
        return SpawnOutcome::Ignored;
    }
    let Ok(location) = world.location(id) else {
        return SpawnOutcome::Ignored;
    };

    if let Some(target) = biggest_stack_near(stacks, world, settings, &event.type_id, location, id) {
        if let Err(e) = world.remove(id) {
            trace!("🐄 EntityStacker: spawned {} vanished before stacking: {}", id, e);
            return SpawnOutcome::Ignored;
        }
        if let Some(stack) = stacks.get_mut(target) {
            stack.amount += 1;
            rename(world, settings, target, stack);
            return SpawnOutcome::Stacked {
                into: target,
                amount: stack.amount,
            };
        }
    }

    let stack = MobStack {
        display_name: display_name_for(&event.type_id, None),
        amount: 1,
    };
    rename(world, settings, id, &stack);
    stacks.insert(id, stack);
    SpawnOutcome::Tracked
}

/// Handles an `entity_died` notification.
///
/// Deaths by void or suicide end the whole stack; any other death leaves a
/// replacement at the same spot carrying one mob less.
pub fn handle_death(
    stacks: &mut MobStacks,
    world: &dyn WorldHost,
    settings: &EntityStackerSettings,
    event: &EntityDiedEvent,
) -> DeathOutcome {
    if !settings.enabled {
        return DeathOutcome::Ignored;
    }
    let Some(stack) = stacks.remove(event.entity_id) else {
        return DeathOutcome::Ignored;
    };
    if matches!(event.cause, DamageCause::Void | DamageCause::Suicide) || stack.amount <= 1 {
        return DeathOutcome::Untracked;
    }

    let replacement = match world.spawn_entity(&event.type_id, event.location) {
        Ok(id) => id,
        Err(e) => {
            warn!("🐄 EntityStacker: could not respawn {} of {}: {}", stack.display_name, event.entity_id, e);
            return DeathOutcome::Untracked;
        }
    };
    let rest = MobStack {
        display_name: stack.display_name,
        amount: stack.amount - 1,
    };
    rename(world, settings, replacement, &rest);
    let amount = rest.amount;
    stacks.insert(replacement, rest);
    debug!("🐄 EntityStacker: {} died, {} carries {} more", event.entity_id, replacement, amount);
    DeathOutcome::Respawned { replacement, amount }
}

/// Handles an `entity_removed` notification. Returns true if a stack was
/// dropped.
pub fn handle_removal(stacks: &mut MobStacks, event: &EntityRemovedEvent) -> bool {
    stacks.remove(event.entity_id).is_some()
}

/// Runs one merge pass over every tracked stack.
pub fn run_pass(stacks: &mut MobStacks, world: &dyn WorldHost, settings: &EntityStackerSettings) -> PassSummary {
    let mut summary = PassSummary::default();
    if !settings.enabled {
        return summary;
    }

    for id in stacks.ids() {
        let Some(amount) = stacks.get(id).map(|stack| stack.amount) else {
            // Merged into another stack earlier in this pass
            continue;
        };
        let (Ok(type_id), Ok(location)) = (world.type_id(id), world.location(id)) else {
            stacks.remove(id);
            summary.dropped += 1;
            continue;
        };
        summary.checked += 1;

        let partner = nearby(world, settings, &type_id, location).into_iter().find(|neighbor| {
            *neighbor != id
                && world.is_valid(*neighbor)
                && stacks.get(*neighbor).map_or(1, |stack| stack.amount) + amount < settings.max_stack_size
        });
        if let Some(neighbor) = partner {
            let absorbed = stacks.remove(neighbor).map_or(1, |stack| stack.amount);
            if let Err(e) = world.remove(neighbor) {
                trace!("🐄 EntityStacker: merged {} already gone: {}", neighbor, e);
            }
            if let Some(stack) = stacks.get_mut(id) {
                stack.amount += absorbed;
            }
            summary.merged += 1;
        }

        if let Some(stack) = stacks.get(id) {
            if rename(world, settings, id, stack) {
                summary.renamed += 1;
            }
        }
    }
    summary
}

/// Spawns a mob, or counts it into a nearby stack that still has room.
pub fn direct_spawn(
    stacks: &mut MobStacks,
    world: &dyn WorldHost,
    settings: &EntityStackerSettings,
    type_id: &str,
    location: Vec3,
) -> Result<DirectSpawn, WorldError> {
    if settings.enabled && !is_blacklisted(type_id) {
        for neighbor in nearby(world, settings, type_id, location) {
            let Some(stack) = stacks.get_mut(neighbor) else {
                continue;
            };
            if stack.amount < settings.max_stack_size {
                stack.amount += 1;
                rename(world, settings, neighbor, stack);
                return Ok(DirectSpawn::Stacked {
                    into: neighbor,
                    amount: stack.amount,
                });
            }
        }
    }
    world.spawn_entity(type_id, location).map(DirectSpawn::Spawned)
}

// ============================================================================
// Helpers
// ============================================================================

/// Same-type mobs within the merge radius, nearest first.
fn nearby(world: &dyn WorldHost, settings: &EntityStackerSettings, type_id: &str, location: Vec3) -> Vec<EntityId> {
    let query = EntityQuery::around(location)
        .of_type(type_id)
        .within_radius(settings.radius)
        .excluding_types(BLACKLISTED_TYPES);
    let mut hits: Vec<(f64, EntityId)> = world
        .query_entities(&query)
        .into_iter()
        .filter_map(|id| world.location(id).ok().map(|at| (at.distance(location), id)))
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, id)| id).collect()
}

/// The largest tracked stack near `location` that still has room.
fn biggest_stack_near(
    stacks: &MobStacks,
    world: &dyn WorldHost,
    settings: &EntityStackerSettings,
    type_id: &str,
    location: Vec3,
    exclude: EntityId,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, u64)> = None;
    for candidate in nearby(world, settings, type_id, location) {
        if candidate == exclude {
            continue;
        }
        let Some(stack) = stacks.get(candidate) else {
            continue;
        };
        if stack.amount < settings.max_stack_size && best.map_or(true, |(_, amount)| stack.amount > amount) {
            best = Some((candidate, stack.amount));
        }
    }
    best.map(|(id, _)| id)
}

/// Writes the stack's name tag if it changed. Returns true on a write.
fn rename(world: &dyn WorldHost, settings: &EntityStackerSettings, id: EntityId, stack: &MobStack) -> bool {
    let name = render_name(&settings.name_template, stack.amount, &stack.display_name);
    if world.name_tag(id).is_ok_and(|current| current == name) {
        return false;
    }
    world.set_name_tag(id, &name).is_ok()
}
