//! Lifecycle driver for the statically linked plugins.
//!
//! Initialization runs in two phases: every plugin registers its handlers
//! first, then every plugin is initialized. A failing plugin is logged and
//! skipped; the rest keep running.

use stackcraft_events::{EventSystem, ServerContext, SimplePlugin};
use std::sync::Arc;
use tracing::{error, info};

/// Owns the plugins and drives them through their lifecycle.
pub struct PluginHost {
    plugins: Vec<Box<dyn SimplePlugin>>,
    event_system: Arc<EventSystem>,
    context: Arc<dyn ServerContext>,
}

impl PluginHost {
    pub fn new(event_system: Arc<EventSystem>, context: Arc<dyn ServerContext>) -> Self {
        Self {
            plugins: Vec::new(),
            event_system,
            context,
        }
    }

    /// Adds a plugin. It is initialized by the next [`initialize`](Self::initialize).
    pub fn add(&mut self, plugin: Box<dyn SimplePlugin>) {
        info!("✅ Plugin loaded: {} v{}", plugin.name(), plugin.version());
        self.plugins.push(plugin);
    }

    /// Registers handlers of every plugin, then initializes them.
    ///
    /// Returns the number of plugins that completed both phases.
    pub async fn initialize(&mut self) -> usize {
        info!("🔧 Initializing {} loaded plugins", self.plugins.len());
        let mut registered = vec![false; self.plugins.len()];

        // Phase 1: register handlers
        for (plugin, registered) in self.plugins.iter_mut().zip(registered.iter_mut()) {
            let name = plugin.name().to_string();
            info!("🔧 Pre-initializing plugin: {}", name);
            match plugin
                .register_handlers(self.event_system.clone(), self.context.clone())
                .await
            {
                Ok(()) => {
                    info!("📡 Event handlers registered for plugin: {}", name);
                    *registered = true;
                }
                Err(e) => error!("❌ Failed to register handlers for plugin {}: {}", name, e),
            }
        }

        // Phase 2: full initialization
        let mut initialized = 0;
        for (plugin, registered) in self.plugins.iter_mut().zip(registered) {
            if !registered {
                continue;
            }
            let name = plugin.name().to_string();
            info!("🔧 Initializing plugin: {}", name);
            match plugin.on_init(self.context.clone()).await {
                Ok(()) => {
                    info!("✅ Plugin initialized successfully: {}", name);
                    initialized += 1;
                }
                Err(e) => error!("❌ Plugin initialization failed for {}: {}", name, e),
            }
        }
        initialized
    }

    /// Shuts every plugin down in reverse load order. Failures are logged.
    pub async fn shutdown(&mut self) {
        info!("🛑 Shutting down {} plugins", self.plugins.len());
        for plugin in self.plugins.iter_mut().rev() {
            let name = plugin.name().to_string();
            info!("🛑 Shutting down plugin: {}", name);
            match plugin.on_shutdown(self.context.clone()).await {
                Ok(()) => info!("✅ Plugin shutdown completed: {}", name),
                Err(e) => error!("❌ Plugin shutdown failed for {}: {}", name, e),
            }
        }
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.plugins.len()
    }
}
