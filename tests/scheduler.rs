mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tile_registry::{CloneError, DeferRequest, TileGuid};

use common::*;

#[test]
fn callbacks_run_in_fifo_order_on_the_next_tick() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..5 {
        let order = order.clone();
        registry.defer(format!("push {i}"), move || order.borrow_mut().push(i));
    }
    assert!(order.borrow().is_empty());

    let report = registry.tick(&mut world);
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    assert_eq!(report.callbacks.ran, 5);
    assert_eq!(report.pending_callbacks, 0);
}

#[test]
fn callback_cap_applies_only_while_running() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    registry.set_max_callbacks_per_tick(3);
    let hits = Rc::new(Cell::new(0));

    let enqueue = |registry: &mut tile_registry::TileRegistry, n: usize| {
        for _ in 0..n {
            let hits = hits.clone();
            registry.defer("hit", move || hits.set(hits.get() + 1));
        }
    };

    enqueue(&mut registry, 10);
    let idle = registry.tick(&mut world);
    assert_eq!(idle.callbacks.ran, 10);

    registry.set_running(true);
    enqueue(&mut registry, 10);
    let capped = registry.tick(&mut world);
    assert_eq!(capped.callbacks.ran, 3);
    assert_eq!(capped.pending_callbacks, 7);
    assert_eq!(hits.get(), 13);

    registry.set_max_callbacks_per_tick(0);
    let unbounded = registry.tick(&mut world);
    assert_eq!(unbounded.callbacks.ran, 7);
}

#[test]
fn dangling_target_is_dropped_without_running() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    let ran = Rc::new(Cell::new(false));

    let target = Rc::new(());
    let flag = ran.clone();
    registry.defer_checked(Rc::downgrade(&target), "never", move || flag.set(true));
    drop(target);

    let report = registry.tick(&mut world);
    assert!(!ran.get());
    assert_eq!(report.callbacks.dropped, 1);
    assert_eq!(report.callbacks.ran, 0);
    assert_eq!(report.pending_callbacks, 0);
}

#[test]
fn panicking_callback_does_not_stop_the_drain() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    let after = Rc::new(Cell::new(false));

    registry.defer("explodes", || panic!("boom"));
    registry.defer_with(DeferRequest::new("quiet", || panic!("hush")).silent());
    let flag = after.clone();
    registry.defer("after", move || flag.set(true));

    let report = registry.tick(&mut world);
    assert_eq!(report.callbacks.failed, 2);
    assert_eq!(report.callbacks.ran, 1);
    assert!(after.get());
}

#[test]
fn short_delays_skip_the_timer() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    let ran = Rc::new(Cell::new(0));

    let quick = ran.clone();
    registry.defer_after(Duration::from_millis(1), DeferRequest::new("quick", move || quick.set(quick.get() + 1)));
    let slow = ran.clone();
    registry.defer_after(Duration::from_secs(3600), DeferRequest::new("slow", move || slow.set(slow.get() + 10)));

    assert_eq!(registry.stats().pending_callbacks, 1);
    assert_eq!(registry.stats().pending_timers, 1);

    let report = registry.tick(&mut world);
    assert_eq!(ran.get(), 1);
    assert_eq!(report.promoted, 0);
    assert_eq!(registry.stats().pending_timers, 1);
}

#[test]
fn due_timers_are_promoted() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    registry.set_immediate_delay(Duration::ZERO);
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    registry.defer_after(Duration::from_millis(1), DeferRequest::new("due", move || flag.set(true)));
    assert_eq!(registry.stats().pending_timers, 1);

    std::thread::sleep(Duration::from_millis(5));
    let report = registry.tick(&mut world);
    assert_eq!(report.promoted, 1);
    assert!(ran.get());
}

#[test]
fn clone_scenario_fresh_guid_at_target_cell() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    registry.set_running(true);
    registry.set_max_clones_per_tick(1);

    let g1 = TileGuid::from_u128(0x61);
    let t1 = place(&mut registry, &mut world, MAIN, pos(0, 0), share(CrateTile::tagged(&["enemy"]).with_guid(g1)).1);

    registry.request_clone(&t1, pos(1, 1), MAIN).unwrap();
    let report = registry.tick(&mut world);

    assert_eq!(report.clones.materialized, 1);
    let clone = registry.get_tile(MAIN, pos(1, 1)).expect("clone registered");
    let clone_guid = guid_of(&clone);
    assert_ne!(clone_guid, g1);
    assert!(!clone_guid.is_nil());
    assert!(!Rc::ptr_eq(&clone, &t1));

    assert_eq!(guid_of(&t1), g1);
    assert!(Rc::ptr_eq(&registry.get_by_guid(g1).unwrap(), &t1));
    assert!(Rc::ptr_eq(world.get(MAIN, pos(1, 1)).unwrap(), &clone));
    assert_eq!(registry.tile_count(), 2);
    registry.check_invariants().unwrap();
}

#[test]
fn clone_cap_leaves_the_rest_queued() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    registry.set_running(true);
    registry.set_max_clones_per_tick(2);

    let source = place(&mut registry, &mut world, MAIN, pos(0, 0), share(CrateTile::tagged(&["seed"])).1);
    for x in 1..=5 {
        registry.request_clone(&source, pos(x, 0), MAIN).unwrap();
    }

    let first = registry.tick(&mut world);
    assert_eq!(first.clones.materialized, 2);
    assert_eq!(first.pending_clones, 3);
    assert_eq!(registry.tile_count(), 3);

    registry.set_running(false);
    let rest = registry.tick(&mut world);
    assert_eq!(rest.clones.materialized, 3);
    assert_eq!(registry.get_all_with_tag(Some(MAIN), "seed", None).len(), 6);
    registry.check_invariants().unwrap();
}

#[test]
fn locked_tiles_refuse_clone_requests() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    let tile = place(&mut registry, &mut world, MAIN, pos(0, 0), share(CrateTile::default().locked()).1);

    let err = registry.request_clone(&tile, pos(1, 0), MAIN).unwrap_err();
    assert_eq!(err, CloneError::Locked { guid: guid_of(&tile) });
    assert_eq!(registry.stats().pending_clones, 0);
}

#[test]
fn stale_clone_requests_are_dropped() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);

    let (_, gone) = share(CrateTile::default());
    place(&mut registry, &mut world, MAIN, pos(0, 0), gone.clone());
    registry.request_clone(&gone, pos(1, 0), MAIN).unwrap();
    registry.unregister(MAIN, pos(0, 0), false).unwrap();
    world.take(MAIN, pos(0, 0));
    drop(gone);

    let kept = place(&mut registry, &mut world, SIDE, pos(0, 0), share(CrateTile::default()).1);
    registry.request_clone(&kept, pos(1, 0), SIDE).unwrap();
    registry.unregister_surface(SIDE);
    world.unload_surface(SIDE);

    let report = registry.tick(&mut world);
    assert_eq!(report.clones.dropped, 2);
    assert_eq!(report.clones.materialized, 0);
    assert_eq!(registry.tile_count(), 0);
}

#[test]
fn failed_clone_never_registers() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);

    let brittle = place(&mut registry, &mut world, MAIN, pos(0, 0), share(BrittleTile::default()).1);
    let unsupported = place(&mut registry, &mut world, MAIN, pos(1, 0), share(EnemyTile::new(1)).1);
    registry.request_clone(&brittle, pos(5, 5), MAIN).unwrap();
    registry.request_clone(&unsupported, pos(6, 6), MAIN).unwrap();

    let report = registry.tick(&mut world);
    assert_eq!(report.clones.failed, 2);
    assert_eq!(registry.tile_count(), 2);
    assert!(world.get(MAIN, pos(5, 5)).is_none());
    registry.check_invariants().unwrap();
}

#[test]
fn asset_tiles_are_never_cloned_into_the_world() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);

    let (_, asset) = share(CrateTile { asset: true, ..CrateTile::default() });
    assert!(matches!(
        registry.request_clone(&asset, pos(3, 3), MAIN),
        Err(CloneError::AssetSource { .. })
    ));

    let (concrete, source) = share(CrateTile::default());
    place(&mut registry, &mut world, MAIN, pos(0, 0), source.clone());
    registry.request_clone(&source, pos(3, 3), MAIN).unwrap();
    concrete.borrow_mut().asset = true;

    let report = registry.tick(&mut world);
    assert_eq!(report.clones.failed, 1);
    assert!(world.get(MAIN, pos(3, 3)).is_none());
    assert!(!registry.has_tile(MAIN, pos(3, 3)));
    registry.check_invariants().unwrap();
}

#[test]
fn pools_are_reused_across_ticks() {
    let mut world = empty_world();
    let mut registry = registry_for(&world);

    for _ in 0..3 {
        registry.defer("noop", || {});
        registry.tick(&mut world);
    }
    let stats = registry.stats().callback_pool;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}
