//! # Stackcraft Event System
//!
//! The shared runtime surface of the Stackcraft server: a type-safe event
//! bus, the plugin and server-context traits, the abstract host world plugins
//! operate on, and a live settings registry.
//!
//! ## Core Features
//!
//! - **Type Safety**: events are plain serde structs, routed by name
//! - **Async/Await Support**: built on Tokio; every handler of an event runs to
//!   completion before `emit_*` returns
//! - **Subscriptions**: every registration yields a [`SubscriptionId`] and may
//!   be filed under a group for bulk removal
//! - **Host World**: [`WorldHost`] abstracts spatial queries and per-object
//!   mutation; [`MemoryWorld`] implements it on an R*-tree
//! - **Live Settings**: [`SettingsRegistry`] holds per-plugin settings that can
//!   be changed while the server runs
//!
//! ## Event Keys
//!
//! - **Core Events** (`core:*`): emitted by the host (`server_tick`,
//!   `entity_spawned`, `entity_removed`, `entity_died`)
//! - **Plugin Events** (`plugin:plugin_name:event`): inter-plugin messages
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use stackcraft_events::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let events = create_event_system();
//!     let world = MemoryWorld::new();
//!
//!     events.on_core("entity_spawned", |event: EntitySpawnedEvent| {
//!         println!("{} appeared at {:?}", event.type_id, event.location);
//!         Ok(())
//!     }).await?;
//!
//!     world.spawn_item(ItemPayload::new("minecraft:stone", 1, 64), Vec3::zero());
//!     for notification in world.drain_notifications() {
//!         if let WorldNotification::Spawned(event) = notification {
//!             events.emit_core("entity_spawned", &event).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod events;
pub mod plugin;
pub mod settings;
pub mod shutdown;
pub mod system;
pub mod types;
pub mod utils;
pub mod world;

pub use context::{LogLevel, ServerContext};
pub use events::{
    EntityDiedEvent, EntityRemovedEvent, EntitySpawnedEvent, Event, EventError, EventHandler,
    ServerTickEvent, TypedEventHandler,
};
pub use plugin::{PluginError, SimplePlugin};
pub use settings::{SettingsError, SettingsRegistry};
pub use shutdown::ShutdownState;
pub use system::{EventSystem, EventSystemStats, SubscriptionId};
pub use types::*;
pub use utils::{create_event_system, current_timestamp, current_timestamp_millis, display_name_for};
pub use world::memory::ITEM_TYPE;
pub use world::{EntityQuery, EntityRef, MemoryWorld, WorldError, WorldHost, WorldNotification};

// External dependencies that plugins commonly need
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
