//! # Event Handlers
//!
//! The item stacker reacts to three core events:
//!
//! - [`spawn`] - `entity_spawned`: track the new item, joining a nearby
//!   group right away when one is in range
//! - [`removal`] - `entity_removed`: repair the group the object belonged to
//! - [`tick`] - `server_tick`: run a reconciliation pass on the configured
//!   cadence
//!
//! Every handler is a plain function over the tracker and the world so the
//! plugin can call it under its own lock, and tests can call it directly.
//! All of them are idempotent and return immediately when the stacker is
//! disabled.

pub mod removal;
pub mod spawn;
pub mod tick;

pub use removal::handle_removal;
pub use spawn::{handle_spawn, SpawnOutcome};
pub use tick::{handle_tick, is_pass_due};
