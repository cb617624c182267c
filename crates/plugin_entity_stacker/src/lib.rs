//! # Entity Stacker Plugin
//!
//! Collapses mobs of one type that gather in a small radius into a single
//! entity whose name tag shows how many mobs it stands for. Killing a stacked
//! mob leaves a replacement carrying the rest of the stack, so farms keep
//! working while the world holds a fraction of the entities.
//!
//! Consumes `core:entity_spawned`, `core:entity_died`, `core:entity_removed`
//! and `core:server_tick`.

pub mod config;
pub mod name;
pub mod stacks;

pub use config::{EntityStackerSettings, BLACKLISTED_TYPES, SETTINGS_MODULE};
pub use stacks::{DeathOutcome, DirectSpawn, MobStack, MobStacks, PassSummary, SpawnOutcome};

use async_trait::async_trait;
use stackcraft_events::{
    EntityDiedEvent, EntityRemovedEvent, EntitySpawnedEvent, EventSystem, LogLevel,
    PluginError, ServerContext, ServerTickEvent, SettingsRegistry, SimplePlugin, Vec3, WorldError,
    WorldHost,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct StackerState {
    stacks: MobStacks,
    settings: EntityStackerSettings,
    revision: u64,
}

/// The running entity stacker.
#[derive(Debug, Clone)]
pub struct EntityStackerService {
    events: Arc<EventSystem>,
    world: Arc<dyn WorldHost>,
    registry: Arc<SettingsRegistry>,
    state: Arc<Mutex<StackerState>>,
    stopped: Arc<AtomicBool>,
}

impl EntityStackerService {
    pub fn new(
        events: Arc<EventSystem>,
        world: Arc<dyn WorldHost>,
        registry: Arc<SettingsRegistry>,
    ) -> Result<Self, PluginError> {
        let settings: EntityStackerSettings =
            registry.get_or_register(SETTINGS_MODULE, &EntityStackerSettings::default())?;
        settings.validate().map_err(PluginError::InitializationFailed)?;

        let state = StackerState {
            stacks: MobStacks::new(),
            revision: registry.revision(SETTINGS_MODULE),
            settings,
        };
        Ok(Self {
            events,
            world,
            registry,
            state: Arc::new(Mutex::new(state)),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn start(&self) -> Result<(), PluginError> {
        self.stopped.store(false, Ordering::Release);

        let service = self.clone();
        self.events
            .on_core_grouped(SETTINGS_MODULE, "entity_spawned", move |event: EntitySpawnedEvent| {
                service.on_spawned(&event);
                Ok(())
            })
            .await?;

        let service = self.clone();
        self.events
            .on_core_grouped(SETTINGS_MODULE, "entity_died", move |event: EntityDiedEvent| {
                service.on_died(&event);
                Ok(())
            })
            .await?;

        let service = self.clone();
        self.events
            .on_core_grouped(SETTINGS_MODULE, "entity_removed", move |event: EntityRemovedEvent| {
                service.on_removed(&event);
                Ok(())
            })
            .await?;

        let service = self.clone();
        self.events
            .on_core_grouped(SETTINGS_MODULE, "server_tick", move |event: ServerTickEvent| {
                service.on_tick(&event);
                Ok(())
            })
            .await?;

        info!("🐄 EntityStacker: started");
        Ok(())
    }

    pub async fn stop(&self) -> usize {
        self.stopped.store(true, Ordering::Release);
        let removed = self.events.unsubscribe_group(SETTINGS_MODULE).await;
        info!("🐄 EntityStacker: stopped ({} handlers removed)", removed);
        removed
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn on_spawned(&self, event: &EntitySpawnedEvent) -> SpawnOutcome {
        if self.is_stopped() {
            return SpawnOutcome::Ignored;
        }
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { stacks, settings, .. } = &mut *state;
        stacks::handle_spawn(stacks, self.world.as_ref(), settings, event)
    }

    pub fn on_died(&self, event: &EntityDiedEvent) -> DeathOutcome {
        if self.is_stopped() {
            return DeathOutcome::Ignored;
        }
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { stacks, settings, .. } = &mut *state;
        stacks::handle_death(stacks, self.world.as_ref(), settings, event)
    }

    pub fn on_removed(&self, event: &EntityRemovedEvent) -> bool {
        stacks::handle_removal(&mut self.lock().stacks, event)
    }

    /// Runs a merge pass when one is due on this tick.
    pub fn on_tick(&self, event: &ServerTickEvent) -> Option<PassSummary> {
        if self.is_stopped() {
            return None;
        }
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { stacks, settings, .. } = &mut *state;
        if !settings.enabled || event.tick_count % settings.check_interval_ticks != 0 {
            return None;
        }
        let summary = stacks::run_pass(stacks, self.world.as_ref(), settings);
        if summary.merged + summary.dropped > 0 {
            debug!(
                "🐄 EntityStacker: pass on tick {}: {} merged, {} dropped",
                event.tick_count, summary.merged, summary.dropped
            );
        }
        Some(summary)
    }

    /// Spawns a mob of `type_id`, stacking it onto a nearby stack with room.
    pub fn direct_spawn(&self, type_id: &str, location: Vec3) -> Result<DirectSpawn, WorldError> {
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { stacks, settings, .. } = &mut *state;
        stacks::direct_spawn(stacks, self.world.as_ref(), settings, type_id, location)
    }

    /// Number of tracked stacks.
    pub fn stack_count(&self) -> usize {
        self.lock().stacks.len()
    }

    /// Number of mobs all stacks stand for.
    pub fn total_mobs(&self) -> u64 {
        self.lock().stacks.total_mobs()
    }

    fn lock(&self) -> MutexGuard<'_, StackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_settings(&self, state: &mut StackerState) {
        let revision = self.registry.revision(SETTINGS_MODULE);
        if revision == state.revision {
            return;
        }
        state.revision = revision;
        match self.registry.get::<EntityStackerSettings>(SETTINGS_MODULE) {
            Ok(fresh) => match fresh.validate() {
                Ok(()) => state.settings = fresh,
                Err(reason) => warn!("🐄 EntityStacker: rejected settings change: {}", reason),
            },
            Err(e) => warn!("🐄 EntityStacker: cannot read settings, keeping previous: {}", e),
        }
    }
}

/// [`SimplePlugin`] wrapper around [`EntityStackerService`].
pub struct EntityStackerPlugin {
    name: String,
    service: Option<EntityStackerService>,
}

impl EntityStackerPlugin {
    pub fn new() -> Self {
        info!("🐄 EntityStackerPlugin: Creating new instance");
        Self {
            name: "entity_stacker".to_string(),
            service: None,
        }
    }

    pub fn service(&self) -> Option<&EntityStackerService> {
        self.service.as_ref()
    }
}

impl Default for EntityStackerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimplePlugin for EntityStackerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn register_handlers(
        &mut self,
        events: Arc<EventSystem>,
        context: Arc<dyn ServerContext>,
    ) -> Result<(), PluginError> {
        info!("🐄 EntityStackerPlugin: Registering event handlers...");
        let service = EntityStackerService::new(events, context.world(), context.settings())?;
        service.start().await?;
        self.service = Some(service);
        info!("🐄 EntityStackerPlugin: ✅ All handlers registered successfully!");
        Ok(())
    }

    async fn on_init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        context.log(LogLevel::Info, "🐄 EntityStacker: Ready to stack mobs!");
        Ok(())
    }

    async fn on_shutdown(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        if let Some(service) = self.service.take() {
            service.stop().await;
        }
        context.log(LogLevel::Info, "🐄 EntityStacker: Shut down");
        Ok(())
    }
}
