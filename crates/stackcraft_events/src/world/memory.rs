//! In-memory world backed by an R*-tree.
//!
//! [`MemoryWorld`] is the reference [`WorldHost`]: the host server simulates
//! on it and the plugin test suites drive their scenarios against it.
//! Mutations never call back into plugins; lifecycle changes are queued and
//! handed out by [`MemoryWorld::drain_notifications`].

use super::{EntityQuery, WorldError, WorldHost, WorldNotification};
use crate::events::{EntityDiedEvent, EntityRemovedEvent, EntitySpawnedEvent};
use crate::types::{DamageCause, EntityId, ItemPayload, Vec3};
use crate::utils::current_timestamp_millis;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Engine type of dropped item objects.
pub const ITEM_TYPE: &str = "minecraft:item";

/// Entry stored inside the R-tree.
#[derive(Debug, Clone, PartialEq)]
struct SpatialEntry {
    id: EntityId,
    point: [f64; 3],
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for SpatialEntry {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        let dz = self.point[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// One object living in the world.
#[derive(Debug, Clone)]
struct WorldEntity {
    type_id: String,
    location: Vec3,
    name_tag: String,
    tags: BTreeSet<String>,
    item: Option<ItemPayload>,
}

#[derive(Debug, Default)]
struct WorldState {
    entities: HashMap<EntityId, WorldEntity>,
    tree: RTree<SpatialEntry>,
    notifications: Vec<WorldNotification>,
}

impl WorldState {
    fn entity(&self, id: EntityId) -> Result<&WorldEntity, WorldError> {
        self.entities.get(&id).ok_or(WorldError::StaleEntity(id))
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut WorldEntity, WorldError> {
        self.entities.get_mut(&id).ok_or(WorldError::StaleEntity(id))
    }

    fn insert(&mut self, type_id: &str, location: Vec3, item: Option<ItemPayload>) -> EntityId {
        let id = EntityId::new();
        self.entities.insert(
            id,
            WorldEntity {
                type_id: type_id.to_string(),
                location,
                name_tag: String::new(),
                tags: BTreeSet::new(),
                item,
            },
        );
        self.tree.insert(SpatialEntry { id, point: location.as_point() });
        self.notifications.push(WorldNotification::Spawned(EntitySpawnedEvent {
            entity_id: id,
            type_id: type_id.to_string(),
            location,
            timestamp: current_timestamp_millis(),
        }));
        id
    }

    fn take(&mut self, id: EntityId) -> Result<WorldEntity, WorldError> {
        let entity = self.entities.remove(&id).ok_or(WorldError::StaleEntity(id))?;
        self.tree.remove(&SpatialEntry { id, point: entity.location.as_point() });
        Ok(entity)
    }
}

fn matches(entity: &WorldEntity, query: &EntityQuery) -> bool {
    if let Some(type_id) = &query.type_id {
        if &entity.type_id != type_id {
            return false;
        }
    }
    if query.exclude_types.iter().any(|t| t == &entity.type_id) {
        return false;
    }
    if query.exclude_tags.iter().any(|t| entity.tags.contains(t)) {
        return false;
    }
    query.accepts_distance(entity.location.distance(query.location))
}

/// A thread-safe world kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    state: Mutex<WorldState>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops an item object carrying `payload` at `location`.
    pub fn spawn_item(&self, payload: ItemPayload, location: Vec3) -> EntityId {
        self.state().insert(ITEM_TYPE, location, Some(payload))
    }

    /// Drops an item object whose payload is not attached yet.
    pub fn spawn_item_without_payload(&self, location: Vec3) -> EntityId {
        self.state().insert(ITEM_TYPE, location, None)
    }

    /// Attaches or replaces the payload of an object.
    pub fn set_item_payload(&self, id: EntityId, payload: ItemPayload) -> Result<(), WorldError> {
        self.state().entity_mut(id)?.item = Some(payload);
        Ok(())
    }

    /// Changes the amount of an item object in place.
    pub fn set_item_amount(&self, id: EntityId, amount: u32) -> Result<(), WorldError> {
        let mut state = self.state();
        let entity = state.entity_mut(id)?;
        match entity.item.as_mut() {
            Some(item) => {
                item.amount = amount;
                Ok(())
            }
            None => Err(WorldError::MissingComponent {
                entity: id,
                component: super::ITEM_COMPONENT,
            }),
        }
    }

    /// Kills a living entity: queues a death notification followed by the
    /// removal notification.
    pub fn kill(&self, id: EntityId, cause: DamageCause) -> Result<(), WorldError> {
        let mut state = self.state();
        let entity = state.take(id)?;
        let timestamp = current_timestamp_millis();
        state.notifications.push(WorldNotification::Died(EntityDiedEvent {
            entity_id: id,
            type_id: entity.type_id.clone(),
            location: entity.location,
            cause,
            timestamp,
        }));
        state.notifications.push(WorldNotification::Removed(EntityRemovedEvent {
            entity_id: id,
            type_id: entity.type_id,
            timestamp,
        }));
        Ok(())
    }

    /// Number of live objects.
    pub fn entity_count(&self) -> usize {
        self.state().entities.len()
    }

    /// Number of live objects of one type.
    pub fn count_of_type(&self, type_id: &str) -> usize {
        self.state()
            .entities
            .values()
            .filter(|entity| entity.type_id == type_id)
            .count()
    }

    /// Every live object that shows a non-empty label, sorted by id.
    pub fn visible_labels(&self) -> Vec<(EntityId, String)> {
        let state = self.state();
        let mut labels: Vec<_> = state
            .entities
            .iter()
            .filter(|(_, entity)| !entity.name_tag.is_empty())
            .map(|(id, entity)| (*id, entity.name_tag.clone()))
            .collect();
        labels.sort();
        labels
    }

    /// Takes all queued lifecycle notifications in the order they happened.
    pub fn drain_notifications(&self) -> Vec<WorldNotification> {
        std::mem::take(&mut self.state().notifications)
    }
}

impl WorldHost for MemoryWorld {
    fn query_entities(&self, query: &EntityQuery) -> Vec<EntityId> {
        let state = self.state();
        let candidates: Vec<EntityId> = match query.max_distance {
            Some(max) => state
                .tree
                .locate_within_distance(query.location.as_point(), max * max)
                .map(|entry| entry.id)
                .collect(),
            None => state.entities.keys().copied().collect(),
        };

        candidates
            .into_iter()
            .filter(|id| {
                state
                    .entities
                    .get(id)
                    .is_some_and(|entity| matches(entity, query))
            })
            .collect()
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.state().entities.contains_key(&id)
    }

    fn type_id(&self, id: EntityId) -> Result<String, WorldError> {
        Ok(self.state().entity(id)?.type_id.clone())
    }

    fn location(&self, id: EntityId) -> Result<Vec3, WorldError> {
        Ok(self.state().entity(id)?.location)
    }

    fn remove(&self, id: EntityId) -> Result<(), WorldError> {
        let mut state = self.state();
        let entity = state.take(id)?;
        state.notifications.push(WorldNotification::Removed(EntityRemovedEvent {
            entity_id: id,
            type_id: entity.type_id,
            timestamp: current_timestamp_millis(),
        }));
        Ok(())
    }

    fn teleport(&self, id: EntityId, to: Vec3) -> Result<(), WorldError> {
        let mut state = self.state();
        let from = state.entity(id)?.location;
        state.tree.remove(&SpatialEntry { id, point: from.as_point() });
        state.tree.insert(SpatialEntry { id, point: to.as_point() });
        state.entity_mut(id)?.location = to;
        Ok(())
    }

    fn name_tag(&self, id: EntityId) -> Result<String, WorldError> {
        Ok(self.state().entity(id)?.name_tag.clone())
    }

    fn set_name_tag(&self, id: EntityId, name_tag: &str) -> Result<(), WorldError> {
        self.state().entity_mut(id)?.name_tag = name_tag.to_string();
        Ok(())
    }

    fn add_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError> {
        Ok(self.state().entity_mut(id)?.tags.insert(tag.to_string()))
    }

    fn has_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError> {
        Ok(self.state().entity(id)?.tags.contains(tag))
    }

    fn remove_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError> {
        Ok(self.state().entity_mut(id)?.tags.remove(tag))
    }

    fn item_payload(&self, id: EntityId) -> Result<Option<ItemPayload>, WorldError> {
        Ok(self.state().entity(id)?.item.clone())
    }

    fn is_stackable_with(&self, a: EntityId, b: EntityId) -> Result<bool, WorldError> {
        let state = self.state();
        let (first, second) = (state.entity(a)?, state.entity(b)?);
        Ok(match (&first.item, &second.item) {
            (Some(x), Some(y)) => x.type_id == y.type_id && x.name_tag == y.name_tag,
            _ => false,
        })
    }

    fn spawn_entity(&self, type_id: &str, location: Vec3) -> Result<EntityId, WorldError> {
        if type_id.is_empty() {
            return Err(WorldError::SpawnRejected(type_id.to_string()));
        }
        Ok(self.state().insert(type_id, location, None))
    }
}
