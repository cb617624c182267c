//! Scenario tests for reconciliation passes against the in-memory world.

use super::*;
use crate::handlers::{handle_removal, handle_spawn};
use crate::tracker::GroupRole;
use stackcraft_events::{
    EntityRemovedEvent, EntitySpawnedEvent, ItemPayload, MemoryWorld, ITEM_TYPE,
};
use std::collections::BTreeSet;

const TIMEOUT: u64 = 300_000;

fn stone(amount: u32) -> ItemPayload {
    ItemPayload::new("minecraft:stone", amount, 64)
}

fn setup() -> (GroupTracker, MemoryWorld, ItemStackerSettings) {
    let settings = ItemStackerSettings::default();
    (GroupTracker::new(settings.expire_timeout_ms), MemoryWorld::new(), settings)
}

fn drop_item(
    tracker: &mut GroupTracker,
    world: &MemoryWorld,
    settings: &ItemStackerSettings,
    payload: ItemPayload,
    at: Vec3,
    now_ms: u64,
) -> EntityId {
    let id = world.spawn_item(payload, at);
    let event = EntitySpawnedEvent {
        entity_id: id,
        type_id: ITEM_TYPE.to_string(),
        location: at,
        timestamp: now_ms,
    };
    handle_spawn(tracker, world, settings, &event, now_ms);
    id
}

fn removed(id: EntityId) -> EntityRemovedEvent {
    EntityRemovedEvent {
        entity_id: id,
        type_id: ITEM_TYPE.to_string(),
        timestamp: 0,
    }
}

#[test]
fn test_two_nearby_drops_show_one_label() {
    let (mut tracker, world, settings) = setup();
    let p = Vec3::new(10.0, 64.0, 10.0);
    let x = drop_item(&mut tracker, &world, &settings, stone(1), p, 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(2), p.offset(0.2, 0.0, 0.0), 100);

    run_pass(&mut tracker, &world, &settings, 1_000);

    let labels = world.visible_labels();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].0, x);
    assert!(labels[0].1.contains("3x Stone"));
    assert_eq!(world.name_tag(y).unwrap(), "");
    assert_eq!(tracker.get(y).unwrap().primary(), Some(x));
    assert_eq!(world.location(y).unwrap(), p);
    tracker.check_invariants().unwrap();
}

#[test]
fn test_label_counts_down_to_expiry() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);

    run_pass(&mut tracker, &world, &settings, 1_500);

    assert_eq!(world.name_tag(x).unwrap(), "1x Stone — expires in 299s");
}

#[test]
fn test_merging_two_stars_keeps_union() {
    let (mut tracker, world, mut settings) = setup();
    settings.max_distance = 1.0;
    let la = Vec3::new(0.0, 64.0, 0.0);
    let lb = la.offset(5.0, 0.0, 0.0);

    // A(5) = 1 + 2 + 2, B(3) = 1 + 2
    let a = drop_item(&mut tracker, &world, &settings, stone(1), la, 0);
    let a1 = drop_item(&mut tracker, &world, &settings, stone(2), la.offset(0.3, 0.0, 0.0), 0);
    let a2 = drop_item(&mut tracker, &world, &settings, stone(2), la.offset(0.0, 0.0, 0.3), 0);
    let b = drop_item(&mut tracker, &world, &settings, stone(1), lb, 0);
    let b1 = drop_item(&mut tracker, &world, &settings, stone(2), lb.offset(0.3, 0.0, 0.0), 0);
    assert_eq!(tracker.get(a).unwrap().total_amount(), 5);
    assert_eq!(tracker.get(b).unwrap().total_amount(), 3);

    settings.max_distance = 10.0;
    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.merged, 1);
    let primaries: Vec<_> = tracker.primaries().map(|g| g.entity_id()).collect();
    assert_eq!(primaries.len(), 1);
    let survivor = primaries[0];
    let absorbed = if survivor == a { b } else { a };
    let group = tracker.get(survivor).unwrap();
    assert_eq!(group.total_amount(), 8);

    let expected: BTreeSet<_> = [a, a1, a2, b, b1].into_iter().filter(|id| *id != survivor).collect();
    assert_eq!(group.associates().collect::<BTreeSet<_>>(), expected);

    let labels = world.visible_labels();
    assert_eq!(labels.len(), 1);
    assert!(labels[0].1.starts_with("8x Stone"));
    assert!(world.has_tag(absorbed, &settings.combined_tag).unwrap());
    assert_eq!(world.location(absorbed).unwrap(), world.location(survivor).unwrap());
    assert!(tracker.get(absorbed).unwrap().is_absorbed());
    tracker.check_invariants().unwrap();
}

#[test]
fn test_untracked_neighbor_is_adopted() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(4), Vec3::zero(), 0);
    // Present before the stacker ever saw it
    let old = world.spawn_item(stone(6), Vec3::new(2.0, 0.0, 0.0));

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.adopted, 1);
    assert_eq!(tracker.get(old).unwrap().primary(), Some(x));
    assert_eq!(tracker.get(x).unwrap().total_amount(), 10);
    assert_eq!(world.location(old).unwrap(), Vec3::zero());
}

#[test]
fn test_totals_match_members_after_pass() {
    let (mut tracker, world, settings) = setup();
    let origin = Vec3::zero();
    for i in 0..12u32 {
        let at = origin.offset(f64::from(i % 4) * 1.5, 0.0, f64::from(i / 4) * 1.5);
        drop_item(&mut tracker, &world, &settings, stone(i + 1), at, 0);
    }
    // Amounts change behind the tracker's back
    for id in tracker.ids().into_iter().step_by(3) {
        world.set_item_amount(id, 7).unwrap();
    }

    run_pass(&mut tracker, &world, &settings, 1_000);

    tracker.check_invariants().unwrap();
    for primary in tracker.primaries() {
        let members: u64 = primary
            .associates()
            .map(|id| u64::from(world.item_payload(id).unwrap().unwrap().amount))
            .sum();
        let own = u64::from(world.item_payload(primary.entity_id()).unwrap().unwrap().amount);
        assert_eq!(primary.total_amount(), own + members);
    }
    assert_eq!(world.visible_labels().len(), tracker.primaries().count());
}

#[test]
fn test_far_and_incompatible_items_stay_apart() {
    let (mut tracker, world, settings) = setup();
    let stone_id = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let far = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::new(30.0, 0.0, 0.0), 0);
    let dirt = drop_item(
        &mut tracker,
        &world,
        &settings,
        ItemPayload::new("minecraft:dirt", 1, 64),
        Vec3::new(1.0, 0.0, 0.0),
        0,
    );
    let named = drop_item(
        &mut tracker,
        &world,
        &settings,
        stone(1).with_name_tag("Lucky Rock"),
        Vec3::new(0.0, 0.0, 1.0),
        0,
    );

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.merged, 0);
    for id in [stone_id, far, dirt, named] {
        assert!(tracker.get(id).unwrap().is_primary());
    }
    assert!(world.name_tag(named).unwrap().contains("1x Lucky Rock"));
}

#[test]
fn test_expiry_cascades_to_associates() {
    let (mut tracker, world, settings) = setup();
    let created = 10_000;
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), created);
    let y = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::new(0.2, 0.0, 0.0), created);
    let z = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::new(0.0, 0.0, 0.2), created);
    assert_eq!(tracker.get(x).unwrap().associate_count(), 2);

    let report = run_pass(&mut tracker, &world, &settings, created + TIMEOUT - 1);
    assert_eq!(report.expired_groups, 0);
    assert_eq!(world.entity_count(), 3);

    let report = run_pass(&mut tracker, &world, &settings, created + TIMEOUT);

    assert_eq!(report.expired_groups, 1);
    assert_eq!(report.expired_objects, 3);
    assert!(tracker.is_empty());
    for id in [x, y, z] {
        assert!(!world.is_valid(id));
    }

    // Late removal notifications find nothing to repair
    for id in [x, y, z] {
        assert_eq!(
            handle_removal(&mut tracker, &world, &settings, &removed(id), created + TIMEOUT),
            Promotion::NotTracked
        );
    }
}

#[test]
fn test_vanished_lonely_primary_is_deleted() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(3), Vec3::zero(), 0);
    world.remove(x).unwrap();

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.stale_dropped, 1);
    assert!(tracker.is_empty());
}

#[test]
fn test_vanished_primary_promotes_with_own_expiry() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let y = drop_item(
        &mut tracker,
        &world,
        &settings,
        stone(2).with_name_tag("Rocky"),
        Vec3::new(0.2, 0.0, 0.0),
        5_000,
    );
    let z = drop_item(&mut tracker, &world, &settings, stone(4), Vec3::new(0.0, 0.0, 0.2), 5_000);
    assert!(tracker.get(y).unwrap().is_primary(), "named item does not stack with plain stone");
    assert_eq!(tracker.get(z).unwrap().primary(), Some(x));

    let w = drop_item(&mut tracker, &world, &settings, stone(3), Vec3::new(0.2, 0.0, 0.2), 5_000);
    world.remove(x).unwrap();

    let report = run_pass(&mut tracker, &world, &settings, 6_000);

    assert_eq!(report.promoted, 1);
    let (heir, rider) = if z < w { (z, w) } else { (w, z) };
    let promoted = tracker.get(heir).unwrap();
    assert!(promoted.is_primary());
    assert_eq!(promoted.expires_at_ms(), 5_000 + TIMEOUT);
    assert_eq!(tracker.get(rider).unwrap().primary(), Some(heir));
    assert!(!world.has_tag(heir, &settings.combined_tag).unwrap());
    tracker.check_invariants().unwrap();
}

#[test]
fn test_removal_handler_promotes_and_labels() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(2), Vec3::new(0.2, 0.0, 0.0), 2_000);
    world.remove(x).unwrap();

    let outcome = handle_removal(&mut tracker, &world, &settings, &removed(x), 3_000);

    assert_eq!(outcome, Promotion::Promoted { new_primary: y, associates: 0 });
    assert_eq!(world.name_tag(y).unwrap(), "2x Stone — expires in 299s");
    assert_eq!(
        handle_removal(&mut tracker, &world, &settings, &removed(x), 3_000),
        Promotion::NotTracked
    );
}

#[test]
fn test_associate_lost_mid_flight_is_dropped() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(5), Vec3::new(0.2, 0.0, 0.0), 0);
    world.remove(y).unwrap();

    run_pass(&mut tracker, &world, &settings, 1_000);

    assert!(!tracker.contains(y));
    assert_eq!(tracker.get(x).unwrap().total_amount(), 1);
    assert!(world.name_tag(x).unwrap().starts_with("1x Stone"));
    tracker.check_invariants().unwrap();
}

#[test]
fn test_missing_payload_is_retried() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let pending = world.spawn_item_without_payload(Vec3::new(0.2, 0.0, 0.0));
    let event = EntitySpawnedEvent {
        entity_id: pending,
        type_id: ITEM_TYPE.to_string(),
        location: Vec3::new(0.2, 0.0, 0.0),
        timestamp: 0,
    };
    assert_eq!(
        handle_spawn(&mut tracker, &world, &settings, &event, 0),
        crate::handlers::SpawnOutcome::AwaitingPayload
    );

    let report = run_pass(&mut tracker, &world, &settings, 1_000);
    assert_eq!(report.awaiting_payload, 1);
    assert!(!tracker.contains(pending));

    world.set_item_payload(pending, stone(9)).unwrap();
    run_pass(&mut tracker, &world, &settings, 2_000);

    assert_eq!(tracker.get(pending).unwrap().primary(), Some(x));
    assert_eq!(tracker.get(x).unwrap().total_amount(), 10);
}

#[test]
fn test_overflow_keeps_single_proxy() {
    let (mut tracker, world, mut settings) = setup();
    settings.max_stack_amount = Some(4);
    let x = drop_item(&mut tracker, &world, &settings, stone(3), Vec3::zero(), 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(3), Vec3::new(0.2, 0.0, 0.0), 0);

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.overflowing, 1);
    assert_eq!(world.count_of_type(ITEM_TYPE), 2);
    assert!(world.name_tag(x).unwrap().starts_with("6x Stone"));
    assert_eq!(world.name_tag(y).unwrap(), "");
}

#[test]
fn test_orphan_is_healed_into_primary() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(2), Vec3::new(0.2, 0.0, 0.0), 0);
    // Bypass promotion to leave y dangling
    tracker.remove(x);

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.healed, 1);
    assert!(matches!(tracker.get(y).unwrap().role(), GroupRole::Primary { .. }));
    assert!(!world.has_tag(y, &settings.combined_tag).unwrap());
    tracker.check_invariants().unwrap();
}

#[test]
fn test_disabled_or_cancelled_pass_does_nothing() {
    let (mut tracker, world, mut settings) = setup();
    drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    world.spawn_item(stone(1), Vec3::new(1.0, 0.0, 0.0));

    let cancel = AtomicBool::new(true);
    let report = Reconciler::new(&mut tracker, &world, &settings, 1_000)
        .with_cancel(&cancel)
        .run();
    assert!(report.interrupted);
    assert_eq!(report.merged, 0);

    settings.enabled = false;
    let report = run_pass(&mut tracker, &world, &settings, 1_000);
    assert!(report.interrupted);
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_expired_neighbor_absorbed_then_expired_in_same_pass() {
    // The fresh group must come first in pass order so it absorbs the stale
    // one before the stale one's own turn.
    let (mut tracker, world, settings, fresh, stale) = loop {
        let (mut tracker, world, settings) = setup();
        let stale = drop_item(&mut tracker, &world, &settings, stone(2), Vec3::zero(), 0);
        let fresh = drop_item(
            &mut tracker,
            &world,
            &settings,
            stone(5),
            Vec3::new(50.0, 0.0, 0.0),
            TIMEOUT / 2,
        );
        if fresh < stale {
            break (tracker, world, settings, fresh, stale);
        }
    };
    world.teleport(stale, Vec3::new(50.5, 0.0, 0.0)).unwrap();

    let report = run_pass(&mut tracker, &world, &settings, TIMEOUT);

    assert_eq!(report.merged, 1);
    assert_eq!(report.expired_objects, 1);
    assert!(!world.is_valid(stale));
    assert!(!tracker.contains(stale));
    let group = tracker.get(fresh).unwrap();
    assert!(group.is_primary());
    assert_eq!(group.total_amount(), 5);
    assert_eq!(group.associate_count(), 0);
    assert!(world.name_tag(fresh).unwrap().starts_with("5x Stone"));
    tracker.check_invariants().unwrap();
}

#[test]
fn test_leftover_marker_does_not_block_merging() {
    let (mut tracker, world, settings) = setup();
    let x = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::zero(), 0);
    let y = drop_item(&mut tracker, &world, &settings, stone(2), Vec3::new(0.2, 0.0, 0.0), 0);
    assert!(world.has_tag(y, &settings.combined_tag).unwrap());

    // A restarted stacker knows nothing about the earlier group
    let mut tracker = GroupTracker::new(settings.expire_timeout_ms);
    world.teleport(y, Vec3::new(0.5, 0.0, 0.0)).unwrap();
    let event = EntitySpawnedEvent {
        entity_id: x,
        type_id: ITEM_TYPE.to_string(),
        location: Vec3::zero(),
        timestamp: 0,
    };
    handle_spawn(&mut tracker, &world, &settings, &event, 0);

    let report = run_pass(&mut tracker, &world, &settings, 1_000);

    assert_eq!(report.markers_released, 1);
    assert_eq!(report.adopted, 1);
    assert_eq!(report.merged, 1);
    assert_eq!(tracker.get(y).unwrap().primary(), Some(x));
    assert!(world.name_tag(x).unwrap().starts_with("3x Stone"));
    tracker.check_invariants().unwrap();
}

#[test]
fn test_spawned_object_sheds_leftover_marker() {
    let (mut tracker, world, settings) = setup();
    let id = world.spawn_item(stone(4), Vec3::zero());
    world.add_tag(id, &settings.combined_tag).unwrap();
    let event = EntitySpawnedEvent {
        entity_id: id,
        type_id: ITEM_TYPE.to_string(),
        location: Vec3::zero(),
        timestamp: 0,
    };

    assert_eq!(handle_spawn(&mut tracker, &world, &settings, &event, 0), crate::handlers::SpawnOutcome::Tracked);

    assert!(!world.has_tag(id, &settings.combined_tag).unwrap());
    let later = drop_item(&mut tracker, &world, &settings, stone(1), Vec3::new(0.3, 0.0, 0.0), 10);
    assert_eq!(tracker.get(later).unwrap().primary(), Some(id));
}
