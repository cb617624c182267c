//! Tests for handler registration, emission and unsubscription

#[cfg(test)]
mod tests {
    use crate::events::{EventError, ServerTickEvent};
    use crate::EventSystem;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn tick(tick_count: u64) -> ServerTickEvent {
        ServerTickEvent { tick_count, timestamp: 0 }
    }

    #[tokio::test]
    async fn test_core_handler_receives_events() {
        let events = EventSystem::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();

        events
            .on_core("server_tick", move |event: ServerTickEvent| {
                seen_clone.fetch_add(event.tick_count, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        events.emit_core("server_tick", &tick(2)).await.unwrap();
        events.emit_core("server_tick", &tick(3)).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        let stats = events.get_stats().await;
        assert_eq!(stats.total_handlers, 1);
        assert_eq!(stats.events_emitted, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();

        let id = events
            .on_core("server_tick", move |_event: ServerTickEvent| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        events.emit_core("server_tick", &tick(1)).await.unwrap();
        assert!(events.unsubscribe(id).await);
        assert!(!events.unsubscribe(id).await);
        events.emit_core("server_tick", &tick(2)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.handler_count("core:server_tick"), 0);
        assert_eq!(events.get_stats().await.total_handlers, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_group_leaves_other_handlers() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicU64::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            events
                .on_core_grouped("ItemStacker", "server_tick", move |_event: ServerTickEvent| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        let calls_clone = calls.clone();
        events
            .on_core("server_tick", move |_event: ServerTickEvent| {
                calls_clone.fetch_add(100, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(events.unsubscribe_group("ItemStacker").await, 2);
        events.emit_core("server_tick", &tick(1)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();

        events
            .on_core("server_tick", |_event: ServerTickEvent| {
                Err(EventError::HandlerExecution("boom".to_string()))
            })
            .await
            .unwrap();
        events
            .on_core("server_tick", move |_event: ServerTickEvent| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        events.emit_core("server_tick", &tick(1)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.get_stats().await.handler_failures, 1);
    }

    #[tokio::test]
    async fn test_plugin_events_are_namespaced() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();

        events
            .on_plugin("ItemStacker", "merged", move |_event: serde_json::Value| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        events
            .emit_plugin("EntityStacker", "merged", &serde_json::json!({"total": 3}))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        events
            .emit_plugin("ItemStacker", "merged", &serde_json::json!({"total": 3}))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_world_notifications_become_core_events() {
        use crate::{EntityRemovedEvent, EntitySpawnedEvent, ItemPayload, MemoryWorld, Vec3, WorldHost};

        let events = EventSystem::new();
        let world = MemoryWorld::new();
        let spawned = Arc::new(AtomicU64::new(0));
        let removed = Arc::new(AtomicU64::new(0));
        let (spawned_clone, removed_clone) = (spawned.clone(), removed.clone());

        events
            .on_core("entity_spawned", move |_event: EntitySpawnedEvent| {
                spawned_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        events
            .on_core("entity_removed", move |_event: EntityRemovedEvent| {
                removed_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        let id = world.spawn_item(ItemPayload::new("minecraft:stone", 1, 64), Vec3::zero());
        world.remove(id).unwrap();
        for notification in world.drain_notifications() {
            events.emit_world(&notification).await.unwrap();
        }

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }
}
