//! # Item Stacker Plugin
//!
//! Merges dropped items that lie close together into groups. One object of
//! each group, the primary, stays visible and carries a label with the
//! combined amount and the time left until the whole group expires; every
//! other member is tagged, moved onto the primary and hidden.
//!
//! The plugin keeps all of its state in a [`GroupTracker`] behind a single
//! lock. Event handlers mutate it synchronously; the host only emits world
//! notifications between ticks, so a handler never observes a pass half done.
//!
//! ## Events
//!
//! - consumes `core:entity_spawned`, `core:entity_removed`, `core:server_tick`
//! - emits `plugin:ItemStacker:pass_completed` with a [`PassReport`] after
//!   every pass that changed group membership

pub mod config;
pub mod handlers;
pub mod label;
pub mod reconcile;
pub mod tracker;

pub use config::{ItemStackerSettings, SETTINGS_MODULE};
pub use handlers::SpawnOutcome;
pub use reconcile::{run_pass, PassReport, Reconciler};
pub use tracker::{GroupRole, GroupTracker, Promotion, TrackedGroup, TrackerError};

use async_trait::async_trait;
use stackcraft_events::{
    current_timestamp_millis, EntityRemovedEvent, EntitySpawnedEvent, EventSystem,
    LogLevel, PluginError, ServerContext, ServerTickEvent, SettingsRegistry, SimplePlugin,
    WorldHost,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// ============================================================================
// Service
// ============================================================================

#[derive(Debug)]
struct StackerState {
    tracker: GroupTracker,
    settings: ItemStackerSettings,
    /// Settings registry revision `settings` was read at
    revision: u64,
}

/// The running item stacker: shared state plus its event subscriptions.
///
/// Cloning is cheap; all clones drive the same tracker.
#[derive(Debug, Clone)]
pub struct ItemStackerService {
    events: Arc<EventSystem>,
    world: Arc<dyn WorldHost>,
    registry: Arc<SettingsRegistry>,
    state: Arc<Mutex<StackerState>>,
    cancelled: Arc<AtomicBool>,
}

impl ItemStackerService {
    /// Creates the service, registering default settings if none exist yet.
    pub fn new(
        events: Arc<EventSystem>,
        world: Arc<dyn WorldHost>,
        registry: Arc<SettingsRegistry>,
    ) -> Result<Self, PluginError> {
        let settings: ItemStackerSettings =
            registry.get_or_register(SETTINGS_MODULE, &ItemStackerSettings::default())?;
        settings.validate().map_err(PluginError::InitializationFailed)?;

        let state = StackerState {
            tracker: GroupTracker::new(settings.expire_timeout_ms),
            revision: registry.revision(SETTINGS_MODULE),
            settings,
        };
        Ok(Self {
            events,
            world,
            registry,
            state: Arc::new(Mutex::new(state)),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Subscribes the stacker to the core events it reacts to.
    pub async fn start(&self) -> Result<(), PluginError> {
        self.cancelled.store(false, Ordering::Release);

        let service = self.clone();
        self.events
            .on_core_grouped(SETTINGS_MODULE, "entity_spawned", move |event: EntitySpawnedEvent| {
                service.on_spawned(&event);
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

        info!("📦 ItemStacker: started");
        Ok(())
    }

    /// Cancels any running pass and removes every subscription. Returns the
    /// number of removed handlers; calling it again removes nothing.
    pub async fn stop(&self) -> usize {
        self.cancelled.store(true, Ordering::Release);
        let removed = self.events.unsubscribe_group(SETTINGS_MODULE).await;
        let tracked = self.lock().tracker.len();
        info!("📦 ItemStacker: stopped ({} handlers removed, {} objects tracked)", removed, tracked);
        removed
    }

    /// Whether [`ItemStackerService::stop`] was called since the last start.
    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Handles a spawn notification.
    pub fn on_spawned(&self, event: &EntitySpawnedEvent) -> SpawnOutcome {
        if self.is_stopped() {
            return SpawnOutcome::Ignored;
        }
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { tracker, settings, .. } = &mut *state;
        handlers::handle_spawn(tracker, self.world.as_ref(), settings, event, current_timestamp_millis())
    }

    /// Handles a removal notification.
    pub fn on_removed(&self, event: &EntityRemovedEvent) -> Promotion {
        if self.is_stopped() {
            return Promotion::NotTracked;
        }
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        let StackerState { tracker, settings, .. } = &mut *state;
        handlers::handle_removal(tracker, self.world.as_ref(), settings, event, current_timestamp_millis())
    }

    /// Handles a tick, running a pass when one is due.
    pub fn on_tick(&self, event: &ServerTickEvent) -> Option<PassReport> {
        let report = {
            let mut state = self.lock();
            self.refresh_settings(&mut state);
            let StackerState { tracker, settings, .. } = &mut *state;
            handlers::handle_tick(
                tracker,
                self.world.as_ref(),
                settings,
                event,
                current_timestamp_millis(),
                &self.cancelled,
            )?
        };

        if report.interrupted {
            debug!("📦 ItemStacker: pass on tick {} interrupted", event.tick_count);
        } else if report.changed_groups() {
            debug!(
                "📦 ItemStacker: pass on tick {}: {} merged, {} expired, {} promoted",
                event.tick_count, report.merged, report.expired_groups, report.promoted
            );
            self.publish_report(report.clone());
        }
        Some(report)
    }

    /// Number of tracked objects.
    pub fn tracked_count(&self) -> usize {
        self.lock().tracker.len()
    }

    /// Number of groups, i.e. visible stacks.
    pub fn group_count(&self) -> usize {
        self.lock().tracker.primaries().count()
    }

    /// Settings currently in effect.
    pub fn settings(&self) -> ItemStackerSettings {
        let mut state = self.lock();
        self.refresh_settings(&mut state);
        state.settings.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-reads the settings when the registry changed since the last read.
    /// Invalid values are reported and the previous settings stay in effect.
    fn refresh_settings(&self, state: &mut StackerState) {
        let revision = self.registry.revision(SETTINGS_MODULE);
        if revision == state.revision {
            return;
        }
        state.revision = revision;

        let fresh = match self.registry.get::<ItemStackerSettings>(SETTINGS_MODULE) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("📦 ItemStacker: cannot read settings, keeping previous: {}", e);
                return;
            }
        };
        if let Err(reason) = fresh.validate() {
            warn!("📦 ItemStacker: rejected settings change: {}", reason);
            return;
        }
        if fresh.expire_timeout_ms != state.settings.expire_timeout_ms {
            state.tracker.set_expire_timeout(fresh.expire_timeout_ms);
        }
        info!("📦 ItemStacker: settings updated (revision {})", revision);
        state.settings = fresh;
    }

    fn publish_report(&self, report: PassReport) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let events = self.events.clone();
        runtime.spawn(async move {
            if let Err(e) = events.emit_plugin(SETTINGS_MODULE, "pass_completed", &report).await {
                warn!("📦 ItemStacker: failed to publish pass report: {}", e);
            }
        });
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// [`SimplePlugin`] wrapper that creates and owns the [`ItemStackerService`].
pub struct ItemStackerPlugin {
    name: String,
    service: Option<ItemStackerService>,
}

impl ItemStackerPlugin {
    pub fn new() -> Self {
        info!("📦 ItemStackerPlugin: Creating new instance");
        Self {
            name: "item_stacker".to_string(),
            service: None,
        }
    }

    /// The running service, once handlers are registered.
    pub fn service(&self) -> Option<&ItemStackerService> {
        self.service.as_ref()
    }
}

impl Default for ItemStackerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimplePlugin for ItemStackerPlugin {
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
        info!("📦 ItemStackerPlugin: Registering event handlers...");
        let service = ItemStackerService::new(events, context.world(), context.settings())?;
        service.start().await?;
        self.service = Some(service);
        info!("📦 ItemStackerPlugin: ✅ All handlers registered successfully!");
        Ok(())
    }

    async fn on_init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        let Some(service) = &self.service else {
            return Err(PluginError::InitializationFailed(
                "handlers were not registered".to_string(),
            ));
        };
        let settings = service.settings();
        context.log(
            LogLevel::Info,
            &format!(
                "📦 ItemStacker: Ready! Merging items {}-{} blocks apart every {} ticks",
                settings.min_distance, settings.max_distance, settings.check_interval_ticks
            ),
        );
        Ok(())
    }

    async fn on_shutdown(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        if let Some(service) = self.service.take() {
            service.stop().await;
        }
        context.log(LogLevel::Info, "📦 ItemStacker: Shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcraft_events::{create_event_system, ItemPayload, MemoryWorld, Vec3};

    #[derive(Debug)]
    struct TestContext {
        events: Arc<EventSystem>,
        world: Arc<MemoryWorld>,
        settings: Arc<SettingsRegistry>,
    }

    impl ServerContext for TestContext {
        fn events(&self) -> Arc<EventSystem> {
            self.events.clone()
        }

        fn world(&self) -> Arc<dyn WorldHost> {
            self.world.clone()
        }

        fn settings(&self) -> Arc<SettingsRegistry> {
            self.settings.clone()
        }

        fn log(&self, _level: LogLevel, message: &str) {
            debug!("{}", message);
        }
    }

    fn context() -> Arc<TestContext> {
        Arc::new(TestContext {
            events: create_event_system(),
            world: Arc::new(MemoryWorld::new()),
            settings: Arc::new(SettingsRegistry::new()),
        })
    }

    async fn pump(context: &TestContext) {
        for notification in context.world.drain_notifications() {
            context.events.emit_world(&notification).await.unwrap();
        }
    }

    async fn tick(context: &TestContext, tick_count: u64) {
        let event = ServerTickEvent { tick_count, timestamp: 0 };
        context.events.emit_core("server_tick", &event).await.unwrap();
        pump(context).await;
    }

    fn stone(amount: u32) -> ItemPayload {
        ItemPayload::new("minecraft:stone", amount, 64)
    }

    fn service_for(context: &TestContext) -> ItemStackerService {
        ItemStackerService::new(context.events.clone(), context.world.clone(), context.settings.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_events_drive_the_stacker() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();

        let p = Vec3::new(0.0, 64.0, 0.0);
        context.world.spawn_item(stone(1), p);
        context.world.spawn_item(stone(2), p.offset(0.2, 0.0, 0.0));
        pump(&context).await;
        tick(&context, 20).await;

        assert_eq!(service.tracked_count(), 2);
        assert_eq!(service.group_count(), 1);
        let labels = context.world.visible_labels();
        assert_eq!(labels.len(), 1);
        assert!(labels[0].1.starts_with("3x Stone"));
    }

    #[tokio::test]
    async fn test_removal_event_promotes_associate() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();

        let first = context.world.spawn_item(stone(1), Vec3::zero());
        let second = context.world.spawn_item(stone(5), Vec3::new(0.2, 0.0, 0.0));
        pump(&context).await;

        context.world.remove(first).unwrap();
        pump(&context).await;

        assert_eq!(service.tracked_count(), 1);
        assert!(context.world.name_tag(second).unwrap().starts_with("5x Stone"));
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_everything() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();
        assert_eq!(context.events.handler_count("core:server_tick"), 1);

        assert_eq!(service.stop().await, 3);
        assert_eq!(service.stop().await, 0);
        assert_eq!(context.events.handler_count("core:entity_spawned"), 0);

        context.world.spawn_item(stone(1), Vec3::zero());
        pump(&context).await;
        assert_eq!(service.tracked_count(), 0);
        assert!(service.on_tick(&ServerTickEvent { tick_count: 20, timestamp: 0 }).unwrap().interrupted);
    }

    #[tokio::test]
    async fn test_settings_changes_apply_live() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();

        context.settings.set(SETTINGS_MODULE, "enabled", "false").unwrap();
        context.world.spawn_item(stone(1), Vec3::zero());
        pump(&context).await;
        assert_eq!(service.tracked_count(), 0);

        context.settings.set(SETTINGS_MODULE, "enabled", "true").unwrap();
        context.settings.set(SETTINGS_MODULE, "check_interval_ticks", "5").unwrap();
        context.world.spawn_item(stone(1), Vec3::new(50.0, 0.0, 0.0));
        pump(&context).await;
        assert_eq!(service.tracked_count(), 1);
        assert_eq!(service.settings().check_interval_ticks, 5);
        assert!(service.on_tick(&ServerTickEvent { tick_count: 5, timestamp: 0 }).is_some());
    }

    #[tokio::test]
    async fn test_mistyped_number_does_not_freeze_settings() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();

        assert!(context.settings.set(SETTINGS_MODULE, "check_interval_ticks", "2.5").is_err());
        assert!(context.settings.set(SETTINGS_MODULE, "check_interval_ticks", "-5").is_err());
        context.settings.set(SETTINGS_MODULE, "max_distance", "4").unwrap();

        let settings = service.settings();
        assert_eq!(settings.max_distance, 4.0);
        assert_eq!(settings.check_interval_ticks, 20);
    }

    #[tokio::test]
    async fn test_invalid_settings_keep_previous_values() {
        let context = context();
        let service = service_for(&context);

        context.settings.set(SETTINGS_MODULE, "min_distance", "50").unwrap();
        let settings = service.settings();
        assert_eq!(settings.min_distance, 0.1);
        assert_eq!(settings.max_distance, 10.0);
    }

    #[tokio::test]
    async fn test_pass_report_is_published() {
        let context = context();
        let service = service_for(&context);
        service.start().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        context
            .events
            .on_plugin(SETTINGS_MODULE, "pass_completed", move |report: PassReport| {
                let _ = tx.send(report);
                Ok(())
            })
            .await
            .unwrap();

        // Already in the world before the stacker saw any event
        context.world.spawn_item(stone(2), Vec3::zero());
        context.world.spawn_item(stone(2), Vec3::new(1.0, 0.0, 0.0));
        context.world.drain_notifications();
        context.world.spawn_item(stone(2), Vec3::new(0.0, 0.0, 1.0));
        pump(&context).await;
        tick(&context, 20).await;

        let report = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.adopted, 2);
        assert_eq!(service.group_count(), 1);
    }

    #[tokio::test]
    async fn test_plugin_lifecycle() {
        let context = context();
        let mut plugin = ItemStackerPlugin::new();
        assert_eq!(plugin.name(), "item_stacker");

        let dyn_context: Arc<dyn ServerContext> = context.clone();
        plugin
            .register_handlers(context.events.clone(), dyn_context.clone())
            .await
            .unwrap();
        plugin.on_init(dyn_context.clone()).await.unwrap();
        assert!(plugin.service().is_some());
        assert_eq!(context.settings.modules(), vec![SETTINGS_MODULE.to_string()]);

        plugin.on_shutdown(dyn_context).await.unwrap();
        assert!(plugin.service().is_none());
        assert_eq!(context.events.handler_count("core:server_tick"), 0);
    }
}
