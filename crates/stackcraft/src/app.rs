//! Main application logic and lifecycle management.
//!
//! [`Application`] wires the event system, the in-memory world, the settings
//! registry and the plugins together, drives the tick loop and coordinates a
//! graceful shutdown. [`TickDriver`] owns everything that happens on a tick.

use crate::config::AppConfig;
use crate::context::HostContext;
use crate::logging::display_banner;
use crate::plugins::PluginHost;
use crate::signals::{wait_for_shutdown_signal, wait_for_signal};
use crate::simulation::DropSimulator;
use plugin_entity_stacker::EntityStackerPlugin;
use plugin_item_stacker::ItemStackerPlugin;
use stackcraft_events::{
    current_timestamp_millis, EventSystem, MemoryWorld, ServerTickEvent, SettingsRegistry, ShutdownState,
};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Upper bound of notification rounds flushed per tick. Handlers that keep
/// spawning objects in reaction to spawns get the rest on the next tick.
const MAX_FLUSH_ROUNDS: usize = 16;

/// Main application struct.
pub struct Application {
    config: AppConfig,
    events: Arc<EventSystem>,
    world: Arc<MemoryWorld>,
    registry: Arc<SettingsRegistry>,
    plugins: PluginHost,
}

impl Application {
    /// Builds the application from a validated configuration.
    ///
    /// The stacker sections of the configuration are seeded into the settings
    /// registry; both stacker plugins are loaded but not yet initialized.
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        let events = Arc::new(EventSystem::new());
        let world = Arc::new(MemoryWorld::new());
        let registry = Arc::new(SettingsRegistry::new());
        registry.seed(plugin_item_stacker::SETTINGS_MODULE, &config.item_stacker)?;
        registry.seed(plugin_entity_stacker::SETTINGS_MODULE, &config.entity_stacker)?;

        let context = HostContext::new(events.clone(), world.clone(), registry.clone());
        let mut plugins = PluginHost::new(events.clone(), Arc::new(context));
        plugins.add(Box::new(ItemStackerPlugin::new()));
        plugins.add(Box::new(EntityStackerPlugin::new()));

        Ok(Self {
            config,
            events,
            world,
            registry,
            plugins,
        })
    }

    pub fn events(&self) -> Arc<EventSystem> {
        self.events.clone()
    }

    pub fn world(&self) -> Arc<MemoryWorld> {
        self.world.clone()
    }

    pub fn settings(&self) -> Arc<SettingsRegistry> {
        self.registry.clone()
    }

    /// Runs both plugin lifecycle phases. Returns the number of plugins that
    /// came up.
    pub async fn initialize_plugins(&mut self) -> usize {
        self.plugins.initialize().await
    }

    /// Creates the driver for this application's tick loop.
    pub fn tick_driver(&self) -> TickDriver {
        let simulator = self
            .config
            .simulation
            .enabled
            .then(|| DropSimulator::new(self.config.simulation.clone()));
        TickDriver::new(self.events.clone(), self.world.clone(), simulator)
    }

    /// Runs the server until a termination signal arrives.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        display_banner();
        info!("🌟 Starting Stackcraft Server");
        self.log_configuration_summary();

        let loaded = self.initialize_plugins().await;
        info!("🔌 {}/{} plugins running: {}", loaded, self.plugins.count(), self.plugins.plugin_names().join(", "));

        let initial_stats = self.events.get_stats().await;
        info!("📊 Initial Event System State:");
        info!("  - Handlers registered: {}", initial_stats.total_handlers);
        info!("  - Events emitted: {}", initial_stats.events_emitted);

        let shutdown_state = ShutdownState::new();

        let tick_handle = {
            let driver = self.tick_driver();
            let tick_interval = Duration::from_millis(self.config.server.tick_interval_ms);
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { driver.run(tick_interval, shutdown_state).await })
        };
        info!("🕒 Server tick started with interval: {}ms", self.config.server.tick_interval_ms);

        let monitoring_handle = {
            let events = self.events.clone();
            let world = self.world.clone();
            let period = Duration::from_secs(self.config.server.monitoring_interval_secs);
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await;
                let mut last_events_emitted = 0u64;

                loop {
                    ticker.tick().await;

                    let stats = events.get_stats().await;
                    let events_this_period = stats.events_emitted - last_events_emitted;
                    last_events_emitted = stats.events_emitted;

                    info!(
                        "📊 System Health - {} events/period | {} handlers | {} objects in world",
                        events_this_period,
                        stats.total_handlers,
                        world.entity_count()
                    );
                    if stats.handler_failures > 0 {
                        warn!("⚠️ {} handler invocations have failed so far", stats.handler_failures);
                    }
                }
            })
        };

        info!("✅ Stackcraft Server is now running!");
        info!("🔍 Health monitoring active - stats every {} seconds", self.config.server.monitoring_interval_secs);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown_signal(&shutdown_state).await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping tick loop...");
        monitoring_handle.abort();
        match tokio::time::timeout(Duration::from_secs(5), tick_handle).await {
            Ok(Ok(ticks)) => info!("✅ Tick loop stopped after {} ticks", ticks),
            Ok(Err(e)) => error!("❌ Tick loop task failed: {}", e),
            Err(_) => warn!("⏰ Tick loop did not stop within timeout, proceeding with shutdown"),
        }

        info!("🔌 Phase 2: Shutting down plugins...");
        self.plugins.shutdown().await;
        shutdown_state.complete_shutdown();

        log_final_statistics(&self.events, &self.world).await;

        info!("✅ Stackcraft Server shutdown complete");
        info!("👋 Thank you for using Stackcraft!");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let item = &self.config.item_stacker;
        let entity = &self.config.entity_stacker;
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Tick interval: {}ms", self.config.server.tick_interval_ms);
        info!(
            "  📦 Item stacker: {} | every {} ticks | {}..{} blocks | expires after {}s",
            if item.enabled { "on" } else { "off" },
            item.check_interval_ticks,
            item.min_distance,
            item.max_distance,
            item.expire_timeout_ms / 1000
        );
        info!(
            "  🐄 Entity stacker: {} | every {} ticks | radius {} | max {}",
            if entity.enabled { "on" } else { "off" },
            entity.check_interval_ticks,
            entity.radius,
            entity.max_stack_size
        );
        info!(
            "  🎲 Simulation: {}",
            if self.config.simulation.enabled { "on" } else { "off" }
        );
    }
}

/// Drives one tick after another: simulation, `server_tick`, world events.
#[derive(Debug)]
pub struct TickDriver {
    events: Arc<EventSystem>,
    world: Arc<MemoryWorld>,
    simulator: Option<DropSimulator>,
    tick_count: u64,
}

impl TickDriver {
    pub fn new(events: Arc<EventSystem>, world: Arc<MemoryWorld>, simulator: Option<DropSimulator>) -> Self {
        Self {
            events,
            world,
            simulator,
            tick_count: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs a single tick. Every handler has finished when this returns.
    pub async fn tick(&mut self) -> u64 {
        self.tick_count += 1;

        if let Some(simulator) = self.simulator.as_mut() {
            simulator.step(self.tick_count, &self.world);
        }

        let tick_event = ServerTickEvent {
            tick_count: self.tick_count,
            timestamp: current_timestamp_millis(),
        };
        if let Err(e) = self.events.emit_core("server_tick", &tick_event).await {
            error!("Failed to emit server_tick event: {}", e);
        }

        self.flush_world_events().await;
        self.tick_count
    }

    /// Emits queued world notifications as core events, including the ones
    /// handlers queue while reacting.
    pub async fn flush_world_events(&self) -> usize {
        let mut emitted = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let batch = self.world.drain_notifications();
            if batch.is_empty() {
                break;
            }
            for notification in &batch {
                if let Err(e) = self.events.emit_world(notification).await {
                    error!("Failed to emit {} event: {}", notification.event_name(), e);
                }
            }
            emitted += batch.len();
        }
        emitted
    }

    /// Ticks every `tick_interval` until shutdown is initiated. Returns the
    /// number of ticks run.
    pub async fn run(mut self, tick_interval: Duration, shutdown_state: ShutdownState) -> u64 {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if shutdown_state.is_shutdown_initiated() {
                info!("🕒 Server tick stopping - shutdown initiated");
                break;
            }

            ticker.tick().await;

            if shutdown_state.is_shutdown_initiated() {
                info!("🕒 Server tick stopping - shutdown initiated during tick wait");
                break;
            }

            self.tick().await;
        }

        info!("✅ Server tick loop completed gracefully");
        self.tick_count
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(events: &EventSystem, world: &MemoryWorld) {
    info!("📊 Final Statistics:");
    let final_stats = events.get_stats().await;
    info!("  - Total events processed: {}", final_stats.events_emitted);
    info!("  - Handler failures: {}", final_stats.handler_failures);
    info!("  - Handlers removed: {}", final_stats.unsubscribed);
    info!("  - Objects left in world: {}", world.entity_count());
}
