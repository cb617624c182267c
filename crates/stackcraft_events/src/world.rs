//! # Host World Interface
//!
//! The game engine is an external collaborator. Plugins see it only through
//! [`WorldHost`]: a spatial query plus a handful of per-object mutations.
//!
//! ## Liveness
//!
//! Any object may be destroyed by mechanisms outside the plugins between two
//! calls, including as a side effect of a plugin's own mutations earlier in
//! the same pass. Every per-object operation therefore re-checks liveness and
//! reports a dead object as [`WorldError::StaleEntity`]. Callers are expected
//! to recover locally (drop their record) rather than propagate.
//!
//! ## Notifications
//!
//! Spawn, removal and death notifications are delivered as core events
//! (`entity_spawned`, `entity_removed`, `entity_died`). [`MemoryWorld`] queues
//! them as [`WorldNotification`]s which the host drains after each tick.

use crate::events::{EntityDiedEvent, EntityRemovedEvent, EntitySpawnedEvent};
use crate::types::{EntityId, ItemPayload, Vec3};
use std::fmt::Debug;

pub mod memory;

pub use memory::MemoryWorld;

/// Component name reported by [`WorldError::MissingComponent`] for item payloads.
pub const ITEM_COMPONENT: &str = "item";

// ============================================================================
// Queries
// ============================================================================

/// Parameters of a spatial query.
///
/// Matches objects whose distance `d` from `location` satisfies
/// `min_distance <= d <= max_distance` (unset bounds are open). Results carry
/// no ordering guarantee.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Only objects of this engine type
    pub type_id: Option<String>,
    /// Query origin
    pub location: Vec3,
    /// Inclusive lower distance bound
    pub min_distance: Option<f64>,
    /// Inclusive upper distance bound
    pub max_distance: Option<f64>,
    /// Skip objects carrying any of these tags
    pub exclude_tags: Vec<String>,
    /// Skip objects of any of these types
    pub exclude_types: Vec<String>,
}

impl EntityQuery {
    /// Creates a query around `location` with no filters.
    pub fn around(location: Vec3) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    /// Restricts the query to one engine type.
    pub fn of_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    /// Sets the inclusive distance band.
    pub fn within(mut self, min_distance: f64, max_distance: f64) -> Self {
        self.min_distance = Some(min_distance);
        self.max_distance = Some(max_distance);
        self
    }

    /// Sets only the upper distance bound.
    pub fn within_radius(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    /// Excludes objects carrying `tag`.
    pub fn excluding_tag(mut self, tag: impl Into<String>) -> Self {
        self.exclude_tags.push(tag.into());
        self
    }

    /// Excludes objects of the given types.
    pub fn excluding_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Returns true if a distance falls inside the band.
    pub fn accepts_distance(&self, distance: f64) -> bool {
        self.min_distance.map_or(true, |min| distance >= min)
            && self.max_distance.map_or(true, |max| distance <= max)
    }
}

// ============================================================================
// Host Interface
// ============================================================================

/// The services plugins consume from the game engine.
///
/// Implementations must be cheap to call repeatedly; plugins re-validate
/// liveness before every use instead of caching object state.
pub trait WorldHost: Send + Sync + Debug {
    /// Returns the live objects matching `query`, unordered.
    fn query_entities(&self, query: &EntityQuery) -> Vec<EntityId>;

    /// Returns true while the object exists in the world.
    fn is_valid(&self, id: EntityId) -> bool;

    /// Engine type of the object.
    fn type_id(&self, id: EntityId) -> Result<String, WorldError>;

    /// Current location of the object.
    fn location(&self, id: EntityId) -> Result<Vec3, WorldError>;

    /// Removes the object from the world.
    fn remove(&self, id: EntityId) -> Result<(), WorldError>;

    /// Moves the object to `to`.
    fn teleport(&self, id: EntityId, to: Vec3) -> Result<(), WorldError>;

    /// The visible label of the object; empty when it has none.
    fn name_tag(&self, id: EntityId) -> Result<String, WorldError>;

    /// Replaces the visible label of the object.
    fn set_name_tag(&self, id: EntityId, name_tag: &str) -> Result<(), WorldError>;

    /// Adds a marker tag. Returns false if it was already present.
    fn add_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError>;

    /// Tests for a marker tag.
    fn has_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError>;

    /// Removes a marker tag. Returns false if it was not present.
    fn remove_tag(&self, id: EntityId, tag: &str) -> Result<bool, WorldError>;

    /// The item payload of the object, or `None` if it has no item component
    /// (yet).
    fn item_payload(&self, id: EntityId) -> Result<Option<ItemPayload>, WorldError>;

    /// Whether two item objects may be merged into one logical stack.
    fn is_stackable_with(&self, a: EntityId, b: EntityId) -> Result<bool, WorldError>;

    /// Spawns a new object of `type_id` at `location`.
    fn spawn_entity(&self, type_id: &str, location: Vec3) -> Result<EntityId, WorldError>;
}

/// A borrowed handle to one object of a [`WorldHost`].
///
/// Holds no object state; every call goes to the host and is re-validated.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w dyn WorldHost,
    id: EntityId,
}

impl<'w> EntityRef<'w> {
    /// Creates a handle to `id` in `world`.
    pub fn new(world: &'w dyn WorldHost, id: EntityId) -> Self {
        Self { world, id }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.world.is_valid(self.id)
    }

    pub fn type_id(&self) -> Result<String, WorldError> {
        self.world.type_id(self.id)
    }

    pub fn location(&self) -> Result<Vec3, WorldError> {
        self.world.location(self.id)
    }

    pub fn remove(&self) -> Result<(), WorldError> {
        self.world.remove(self.id)
    }

    pub fn teleport_to(&self, to: Vec3) -> Result<(), WorldError> {
        self.world.teleport(self.id, to)
    }

    pub fn label(&self) -> Result<String, WorldError> {
        self.world.name_tag(self.id)
    }

    pub fn set_label(&self, label: &str) -> Result<(), WorldError> {
        self.world.set_name_tag(self.id, label)
    }

    pub fn add_marker(&self, tag: &str) -> Result<bool, WorldError> {
        self.world.add_tag(self.id, tag)
    }

    pub fn has_marker(&self, tag: &str) -> Result<bool, WorldError> {
        self.world.has_tag(self.id, tag)
    }

    pub fn remove_marker(&self, tag: &str) -> Result<bool, WorldError> {
        self.world.remove_tag(self.id, tag)
    }

    /// The item payload; a live object without one is reported as
    /// [`WorldError::MissingComponent`].
    pub fn payload(&self) -> Result<ItemPayload, WorldError> {
        self.world
            .item_payload(self.id)?
            .ok_or(WorldError::MissingComponent {
                entity: self.id,
                component: ITEM_COMPONENT,
            })
    }

    pub fn is_compatible_with(&self, other: EntityId) -> Result<bool, WorldError> {
        self.world.is_stackable_with(self.id, other)
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// A lifecycle notification queued by a world implementation.
#[derive(Debug, Clone)]
pub enum WorldNotification {
    Spawned(EntitySpawnedEvent),
    Died(EntityDiedEvent),
    Removed(EntityRemovedEvent),
}

impl WorldNotification {
    /// Name of the core event this notification is emitted as.
    pub fn event_name(&self) -> &'static str {
        match self {
            WorldNotification::Spawned(_) => "entity_spawned",
            WorldNotification::Died(_) => "entity_died",
            WorldNotification::Removed(_) => "entity_removed",
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by world operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The object no longer exists
    #[error("Entity {0} is no longer valid")]
    StaleEntity(EntityId),
    /// The object exists but lacks a component the caller needs
    #[error("Entity {entity} has no {component} component")]
    MissingComponent {
        entity: EntityId,
        component: &'static str,
    },
    /// The host refused to spawn an object
    #[error("Cannot spawn {0}")]
    SpawnRejected(String),
}
