//! # Plugin Interface
//!
//! Plugins are statically linked into the host and driven through the
//! [`SimplePlugin`] lifecycle:
//!
//! 1. **Creation** - the host constructs the plugin value
//! 2. **Handler Registration** - `register_handlers()` subscribes to events
//! 3. **Initialization** - `on_init()` with the server context
//! 4. **Operation** - the plugin reacts to events
//! 5. **Shutdown** - `on_shutdown()` unsubscribes and releases state
//!
//! A failing plugin never takes the host down: lifecycle errors are logged by
//! the host and the remaining plugins keep running.

use crate::context::ServerContext;
use crate::events::EventError;
use crate::settings::SettingsError;
use crate::system::EventSystem;
use async_trait::async_trait;
use std::sync::Arc;

/// Safe, high-level plugin trait.
///
/// # Examples
///
/// ```rust,no_run
/// use stackcraft_events::*;
///
/// struct TickCounter;
///
/// #[async_trait]
/// impl SimplePlugin for TickCounter {
///     fn name(&self) -> &str { "tick_counter" }
///     fn version(&self) -> &str { "1.0.0" }
///
///     async fn register_handlers(
///         &mut self,
///         events: Arc<EventSystem>,
///         _context: Arc<dyn ServerContext>,
///     ) -> Result<(), PluginError> {
///         events.on_core("server_tick", |event: ServerTickEvent| {
///             tracing::trace!("tick {}", event.tick_count);
///             Ok(())
///         }).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SimplePlugin: Send + Sync + 'static {
    /// Unique, stable plugin name used for logging and settings lookup.
    fn name(&self) -> &str;

    /// Semantic version string.
    fn version(&self) -> &str;

    /// Registers event handlers. Called before `on_init()`.
    async fn register_handlers(
        &mut self,
        events: Arc<EventSystem>,
        context: Arc<dyn ServerContext>,
    ) -> Result<(), PluginError>;

    /// Initializes the plugin with the server context.
    async fn on_init(&mut self, _context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Shuts the plugin down. Errors are logged but do not stop the host.
    async fn on_shutdown(&mut self, _context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Errors that can occur during plugin lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin initialization failed during startup
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Error occurred during plugin execution
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    /// Requested plugin was not found
    #[error("Plugin not found: {0}")]
    NotFound(String),
    /// Handler registration on the event bus failed
    #[error("Event registration failed: {0}")]
    Event(#[from] EventError),
    /// The plugin's settings could not be registered or read
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}
