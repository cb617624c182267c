//! # Server Context Interface
//!
//! The bridge between plugin code and the host: the shared event bus, the
//! host world, the live settings registry and host-integrated logging.

use crate::settings::SettingsRegistry;
use crate::system::EventSystem;
use crate::world::WorldHost;
use std::fmt::Debug;
use std::sync::Arc;

/// Services the host exposes to plugins.
///
/// # Examples
///
/// ```rust,no_run
/// use stackcraft_events::{LogLevel, PluginError, ServerContext};
/// use std::sync::Arc;
///
/// async fn on_init(context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
///     let world = context.world();
///     context.log(LogLevel::Info, "Stacker initialized");
///     let _ = world;
///     Ok(())
/// }
/// ```
pub trait ServerContext: Send + Sync + Debug {
    /// The event system shared by the host and all plugins.
    fn events(&self) -> Arc<EventSystem>;

    /// The world the plugins operate on.
    fn world(&self) -> Arc<dyn WorldHost>;

    /// The live settings registry.
    fn settings(&self) -> Arc<SettingsRegistry>;

    /// Logs a message through the host's logging pipeline.
    fn log(&self, level: LogLevel, message: &str);
}

/// Enumeration of log levels for [`ServerContext::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Critical errors that may affect system stability
    Error,
    /// Warning conditions that should be investigated
    Warn,
    /// General informational messages
    Info,
    /// Detailed information for debugging
    Debug,
    /// Very detailed trace information
    Trace,
}
