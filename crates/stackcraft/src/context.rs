//! The [`ServerContext`] the host hands to its plugins.

use stackcraft_events::{EventSystem, LogLevel, MemoryWorld, ServerContext, SettingsRegistry, WorldHost};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Host services shared with every plugin.
#[derive(Debug, Clone)]
pub struct HostContext {
    events: Arc<EventSystem>,
    world: Arc<MemoryWorld>,
    settings: Arc<SettingsRegistry>,
}

impl HostContext {
    pub fn new(events: Arc<EventSystem>, world: Arc<MemoryWorld>, settings: Arc<SettingsRegistry>) -> Self {
        Self { events, world, settings }
    }
}

impl ServerContext for HostContext {
    fn events(&self) -> Arc<EventSystem> {
        self.events.clone()
    }

    fn world(&self) -> Arc<dyn WorldHost> {
        self.world.clone()
    }

    fn settings(&self) -> Arc<SettingsRegistry> {
        self.settings.clone()
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => error!(target: "plugin", "{}", message),
            LogLevel::Warn => warn!(target: "plugin", "{}", message),
            LogLevel::Info => info!(target: "plugin", "{}", message),
            LogLevel::Debug => debug!(target: "plugin", "{}", message),
            LogLevel::Trace => trace!(target: "plugin", "{}", message),
        }
    }
}
