//! # Core Type Definitions
//!
//! This module contains the fundamental types shared by the event system, the
//! host world interface and the stacking plugins.
//!
//! ## Key Types
//!
//! - [`EntityId`] - Opaque identity of a live world object
//! - [`Vec3`] - 3D position with double precision
//! - [`ItemPayload`] - Countable payload carried by dropped item objects
//! - [`DamageCause`] - Why an entity died
//!
//! Entity identities are only stable for the lifetime of the running world;
//! nothing in the workspace persists them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Unique identifier for an object living in the host world.
///
/// This is a wrapper around UUID that provides type safety and ensures entity
/// IDs cannot be confused with other identifiers. It is `Ord` so that
/// collections keyed by entity give a deterministic iteration order.
///
/// # Examples
///
/// ```rust
/// use stackcraft_events::EntityId;
///
/// let entity_id = EntityId::new();
/// let parsed: EntityId = entity_id.to_string().parse()?;
/// assert_eq!(entity_id, parsed);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Creates a new random entity ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Spatial
// ============================================================================

/// Represents a 3D vector with double-precision components.
///
/// # Examples
///
/// ```rust
/// use stackcraft_events::Vec3;
///
/// let drop_point = Vec3::new(100.5, 64.0, -200.25);
/// let distance = drop_point.distance(Vec3::zero());
/// assert!(distance > 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate (typically east-west axis)
    pub x: f64,
    /// Y coordinate (typically vertical axis)
    pub y: f64,
    /// Z coordinate (typically north-south axis)
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3 with the specified coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculates the Euclidean distance to another Vec3.
    pub fn distance(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Returns this vector moved by the given deltas.
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Creates a zero vector (0, 0, 0).
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub(crate) fn as_point(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::zero()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// The countable payload of a dropped item object.
///
/// Two payloads are stack-compatible when their type and custom name agree;
/// the host decides that through `WorldHost::is_stackable_with`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Namespaced item type, e.g. `minecraft:stone`
    pub type_id: String,
    /// Number of items in this physical stack
    pub amount: u32,
    /// Largest amount one physical stack of this type can hold
    pub max_amount: u32,
    /// Custom name given to the item, if any
    #[serde(default)]
    pub name_tag: Option<String>,
}

impl ItemPayload {
    /// Creates a payload without a custom name.
    pub fn new(type_id: impl Into<String>, amount: u32, max_amount: u32) -> Self {
        Self {
            type_id: type_id.into(),
            amount,
            max_amount,
            name_tag: None,
        }
    }

    /// Sets a custom name on the payload.
    pub fn with_name_tag(mut self, name_tag: impl Into<String>) -> Self {
        self.name_tag = Some(name_tag.into());
        self
    }
}

/// Enumeration of the ways an entity can die.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageCause {
    /// Killed by another entity
    Attack,
    /// Fell from a height
    Fall,
    /// Burned
    Fire,
    /// Fell out of the world
    Void,
    /// Killed itself or was killed by a command
    Suicide,
    /// Anything the host does not classify
    Other(String),
}
