//! # Event Traits and Core Events
//!
//! This module defines the event infrastructure and all built-in event types
//! of the Stackcraft event system. It includes the fundamental [`Event`] trait,
//! handler abstractions, and the world lifecycle events the host emits.
//!
//! ## Event Categories
//!
//! ### Core Events
//! Emitted by the host server:
//! - `server_tick` - one per simulation tick
//! - `entity_spawned` - a new object appeared in the world
//! - `entity_removed` - an object left the world, for any reason
//! - `entity_died` - a living entity was killed
//!
//! ### Plugin Events
//! Free-form inter-plugin messages routed by plugin name.
//!
//! Events travel as JSON so handlers in different plugins never share
//! Rust types at runtime, only serde schemas.

use crate::types::{DamageCause, EntityId, Vec3};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{any::{Any, TypeId}, fmt::Debug};

// ============================================================================
// Event Traits and Core Infrastructure
// ============================================================================

/// Core trait that all events must implement.
///
/// Most types implement this trait through the blanket implementation below;
/// deriving `Serialize`, `Deserialize` and `Debug` is enough.
pub trait Event: Send + Sync + Any + std::fmt::Debug {
    /// Returns the type name of this event for debugging and routing.
    fn type_name() -> &'static str
    where
        Self: Sized;

    /// Serializes the event to bytes.
    fn serialize(&self) -> Result<Vec<u8>, EventError>;

    /// Deserializes an event from bytes.
    fn deserialize(data: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized;

    /// Returns a reference to this event as `&dyn Any` for dynamic typing.
    fn as_any(&self) -> &dyn Any;
}

/// Blanket implementation of Event trait for serde types.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct StackMergedEvent {
///     total: u64,
/// }
/// // StackMergedEvent now implements Event automatically!
/// ```
impl<T> Event for T
where
    T: Serialize + DeserializeOwned + Send + Sync + Any + std::fmt::Debug + 'static,
{
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| {
            tracing::error!(
                "🔴 Event serialization failed for type '{}': {} (event debug: {:?})",
                Self::type_name(),
                e,
                self
            );
            EventError::Serialization(e)
        })
    }

    fn deserialize(data: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(data).map_err(EventError::Deserialization)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handler trait for processing events from serialized data.
///
/// Most users will not implement this trait directly, but register closures
/// through [`crate::EventSystem::on_core`] which wraps them in a
/// [`TypedEventHandler`].
#[async_trait]
pub trait EventHandler: Send + Sync + 'static + Debug {
    /// Handles an event from serialized data.
    async fn handle(&self, data: &[u8]) -> Result<(), EventError>;

    /// Returns the TypeId of the event type this handler expects.
    fn expected_type_id(&self) -> TypeId;

    /// Returns a human-readable name for this handler for debugging.
    fn handler_name(&self) -> &str;
}

/// Type-safe wrapper for event handlers.
///
/// Bridges the generic [`EventHandler`] trait and a closure taking one
/// concrete event type.
pub struct TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    handler: F,
    name: String,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> std::fmt::Debug for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedEventHandler")
            .field("name", &self.name)
            .finish()
    }
}

impl<T, F> TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    /// Creates a new typed event handler.
    pub fn new(name: String, handler: F) -> Self {
        Self {
            handler,
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> EventHandler for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
{
    async fn handle(&self, data: &[u8]) -> Result<(), EventError> {
        match T::deserialize(data) {
            Ok(event) => (self.handler)(event),
            Err(e) => {
                let data_preview = if data.len() > 100 {
                    format!(
                        "{}... ({} more bytes)",
                        String::from_utf8_lossy(&data[..100]),
                        data.len() - 100
                    )
                } else {
                    String::from_utf8_lossy(data).to_string()
                };

                tracing::warn!(
                    "🟡 EventHandler '{}' (expects type '{}'): Deserialization failed - {}. Data preview: '{}'. Handler skipped.",
                    self.name,
                    std::any::type_name::<T>(),
                    e,
                    data_preview
                );
                Ok(())
            }
        }
    }

    fn expected_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Core World Events
// ============================================================================

/// Emitted once per simulation tick by the host tick loop.
///
/// Plugins derive their own cadences from `tick_count`, e.g. a pass every
/// 20 ticks is one pass per second at 20 ticks per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTickEvent {
    /// Monotonic tick counter, starting at 1
    pub tick_count: u64,
    /// Unix timestamp in milliseconds when the tick started
    pub timestamp: u64,
}

/// Emitted after a new object appeared in the world.
///
/// # Examples
///
/// ```rust
/// use stackcraft_events::{EntitySpawnedEvent, EntityId, Vec3, current_timestamp_millis};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #     let events = stackcraft_events::create_event_system();
/// events.emit_core("entity_spawned", &EntitySpawnedEvent {
///     entity_id: EntityId::new(),
///     type_id: "minecraft:item".to_string(),
///     location: Vec3::new(0.0, 64.0, 0.0),
///     timestamp: current_timestamp_millis(),
/// }).await?;
/// #     Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySpawnedEvent {
    /// Identity of the new object
    pub entity_id: EntityId,
    /// Engine type of the object, e.g. `minecraft:item` or `minecraft:cow`
    pub type_id: String,
    /// Where the object appeared
    pub location: Vec3,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Emitted when an object has left the world for any reason.
///
/// The host delivers this after the mutation that removed the object has
/// completed, so the object is no longer valid when handlers run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRemovedEvent {
    /// Identity of the removed object
    pub entity_id: EntityId,
    /// Engine type of the removed object
    pub type_id: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Emitted when a living entity is killed, before its removal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDiedEvent {
    /// Identity of the dead entity
    pub entity_id: EntityId,
    /// Engine type of the dead entity
    pub type_id: String,
    /// Where the entity died
    pub location: Vec3,
    /// What killed it
    pub cause: DamageCause,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during event processing.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Serialization failed when converting event to bytes
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Deserialization failed when converting bytes to event
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    /// No handler found for the specified event type
    #[error("Handler not found: {0}")]
    HandlerNotFound(String),
    /// Handler execution failed during event processing
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}
