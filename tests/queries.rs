mod common;

use std::rc::Rc;

use pretty_assertions::assert_eq;
use tile_registry::{CapabilityKey, GuidRemap, SurfaceId, Tile, TileGuid, TypeKey};

use common::*;

/// MAIN: two crates and one enemy. SIDE: one enemy.
fn populated() -> (tile_registry::GridWorld, tile_registry::TileRegistry) {
    let mut world = empty_world();
    let mut registry = registry_for(&world);
    place(&mut registry, &mut world, MAIN, pos(0, 0), share(CrateTile::tagged(&["loot", "wood"])).1);
    place(&mut registry, &mut world, MAIN, pos(1, 0), share(CrateTile::tagged(&["wood"])).1);
    place(&mut registry, &mut world, MAIN, pos(2, 0), share(EnemyTile::new(4)).1);
    place(&mut registry, &mut world, SIDE, pos(0, 0), share(EnemyTile::new(12)).1);
    (world, registry)
}

#[test]
fn position_lookups() {
    let (_world, registry) = populated();

    assert!(registry.has_tile(MAIN, pos(1, 0)));
    assert!(!registry.has_tile(MAIN, pos(1, 1)));
    assert!(registry.get_tile(SIDE, pos(0, 0)).is_some());
    assert!(registry.get_tile(SIDE, pos(3, 3)).is_none());

    let row = registry.get_all_for_surface(MAIN);
    assert_eq!(row.len(), 3);
    for (x, tile) in (0..).zip(&row) {
        let at = registry.get_tile(MAIN, pos(x, 0)).unwrap();
        assert!(Rc::ptr_eq(tile, &at), "tile {x} out of position order");
    }
    assert!(registry.get_all_for_surface(SurfaceId(99)).is_empty());
}

#[test]
fn exact_type_lookup_with_surface_and_predicate() {
    let (_world, registry) = populated();

    assert_eq!(registry.get_all_of::<EnemyTile>(None, None).len(), 2);
    assert_eq!(registry.get_all_of::<EnemyTile>(Some(SIDE), None).len(), 1);
    assert_eq!(
        registry
            .get_all_of_exact_type(None, TypeKey::of::<CrateTile>(), Some(&|t: &dyn Tile| t.tags().len() == 2))
            .len(),
        1
    );
    assert!(registry.get_all_of::<BrittleTile>(None, None).is_empty());
}

#[test]
fn capability_lookup_spans_types() {
    let (_world, registry) = populated();

    assert_eq!(registry.get_all_with_capability::<dyn Pushable>(None, None).len(), 4);
    assert_eq!(registry.get_all_with_capability::<dyn Damageable>(None, None).len(), 2);
    assert_eq!(registry.get_all_with_capability::<dyn Damageable>(Some(MAIN), None).len(), 1);

    let tough = |t: &dyn Tile| {
        t.as_any().downcast_ref::<EnemyTile>().is_some_and(|e| e.hp > 10)
    };
    let found = registry.get_all_with_capability::<dyn Damageable>(None, Some(&tough));
    assert_eq!(found.len(), 1);
    assert_eq!(
        registry.capability_keys().len(),
        2,
        "{:?}",
        registry.capability_keys().iter().map(CapabilityKey::name).collect::<Vec<_>>()
    );
}

#[test]
fn tag_lookup_trims_and_ignores_blank_tags() {
    let (_world, registry) = populated();

    assert_eq!(registry.get_all_with_tag(None, "  wood\t", None).len(), 2);
    assert_eq!(registry.get_all_with_tag(Some(SIDE), "enemy", None).len(), 1);
    assert!(registry.get_all_with_tag(None, "   ", None).is_empty());
    assert!(registry.get_all_with_tag(None, "missing", None).is_empty());
    assert_eq!(registry.tag_keys(), vec!["enemy".to_owned(), "loot".to_owned(), "wood".to_owned()]);
}

#[test]
fn guid_lookup_falls_back_to_remap_chain() {
    let (mut world, mut registry) = populated();
    let target = place(&mut registry, &mut world, SIDE, pos(4, 4), share(CrateTile::tagged(&["remapped"])).1);
    let live = guid_of(&target);

    let stale = TileGuid::from_u128(0xaaaa);
    let middle = TileGuid::from_u128(0xbbbb);
    assert!(registry.get_by_guid(stale).is_none());

    registry.set_guid_remap([(stale, middle), (middle, live)].into_iter().collect());
    let matched = registry.find_by_guid(stale).unwrap();
    assert!(matched.remapped);
    assert_eq!(matched.guid, live);
    assert!(Rc::ptr_eq(&matched.tile, &target));
    assert!(Rc::ptr_eq(&registry.get_by_guid(stale).unwrap(), &target));

    assert!(registry.take_guid_remap().is_some());
    assert!(registry.get_by_guid(stale).is_none());
}

#[test]
fn remap_cycles_end_the_search() {
    let (_world, mut registry) = populated();
    let a = TileGuid::from_u128(1);
    let b = TileGuid::from_u128(2);

    let mut remap = GuidRemap::new();
    remap.insert(a, b);
    remap.insert(b, a);
    assert_eq!(remap.chain(a).collect::<Vec<_>>(), vec![b]);

    registry.set_guid_remap(remap);
    assert!(registry.find_by_guid(a).is_none());
}

#[test]
fn combined_query_intersects_criteria() {
    let (_world, registry) = populated();

    assert_eq!(registry.query().with_tag("wood").collect().len(), 2);
    assert_eq!(registry.query().with_tag("wood").with_tag("loot").collect().len(), 1);
    assert_eq!(
        registry.query().on_surface(MAIN).with_capability::<dyn Pushable>().collect().len(),
        3
    );
    assert_eq!(
        registry
            .query()
            .of_type::<EnemyTile>()
            .filter(|t| t.as_any().downcast_ref::<EnemyTile>().is_some_and(|e| e.hp < 10))
            .collect()
            .len(),
        1
    );
    assert!(registry.query().of_type::<EnemyTile>().of_type::<CrateTile>().collect().is_empty());
    assert!(registry.query().with_tag(" ").collect().is_empty());
    assert!(registry.query().with_tag("nope").on_surface(MAIN).collect().is_empty());
    assert_eq!(registry.query().collect().len(), 4);
    assert_eq!(registry.query().on_surface(SIDE).collect().len(), 1);
}

#[test]
fn lists_are_owned_copies() {
    let (_world, mut registry) = populated();

    let before = registry.get_all_with_tag(None, "wood", None);
    registry.unregister(MAIN, pos(0, 0), false).unwrap();

    assert_eq!(before.len(), 2);
    assert_eq!(registry.get_all_with_tag(None, "wood", None).len(), 1);
}
