//! Property test: the index invariants hold after every operation of an
//! arbitrary register/unregister/retag sequence.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use tile_registry::{DuplicateIntent, SurfaceId};

use common::*;

const TAGS: [&str; 4] = ["red", " blue", "green ", ""];

#[derive(Clone, Debug)]
enum Op {
    Place { surface: u32, x: i32, y: i32, crate_tile: bool, tags: Vec<usize>, locked: bool },
    Copy { from: usize, surface: u32, x: i32, y: i32, intent: bool },
    Remove { surface: u32, x: i32, y: i32 },
    Retag { surface: u32, x: i32, y: i32, tags: Vec<usize> },
    Rescan,
}

fn op() -> impl Strategy<Value = Op> {
    let tags = prop::collection::vec(0..TAGS.len(), 0..3);
    prop_oneof![
        4 => (1..3u32, 0..4i32, 0..4i32, any::<bool>(), tags.clone(), prop::bool::weighted(0.2))
            .prop_map(|(surface, x, y, crate_tile, tags, locked)| Op::Place { surface, x, y, crate_tile, tags, locked }),
        2 => (0..16usize, 1..3u32, 0..4i32, 0..4i32, any::<bool>())
            .prop_map(|(from, surface, x, y, intent)| Op::Copy { from, surface, x, y, intent }),
        3 => (1..3u32, 0..4i32, 0..4i32).prop_map(|(surface, x, y)| Op::Remove { surface, x, y }),
        1 => (1..3u32, 0..4i32, 0..4i32, tags).prop_map(|(surface, x, y, tags)| Op::Retag { surface, x, y, tags }),
        1 => Just(Op::Rescan),
    ]
}

fn tag_list(indices: &[usize]) -> Vec<String> {
    indices.iter().map(|i| TAGS[*i].to_owned()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_every_operation(ops in prop::collection::vec(op(), 1..60)) {
        let mut world = empty_world();
        let mut registry = registry_for(&world);
        let mut crates: Vec<Rc<RefCell<CrateTile>>> = Vec::new();

        for op in ops {
            match op {
                Op::Place { surface, x, y, crate_tile, tags, locked } => {
                    let surface = SurfaceId(surface);
                    let position = pos(x, y);
                    let tile = if crate_tile {
                        let tile = CrateTile { tags: tag_list(&tags), locked, ..CrateTile::default() };
                        let (concrete, handle) = share(tile);
                        crates.push(concrete);
                        handle
                    } else {
                        share(EnemyTile::new(1)).1
                    };
                    world.set(surface, position, tile.clone());
                    prop_assert!(registry.register(&tile, position, surface).is_ok());
                }
                Op::Copy { from, surface, x, y, intent } => {
                    let Some(source) = crates.get(from % crates.len().max(1)) else { continue };
                    let copy: CrateTile = source.borrow().clone();
                    let (concrete, handle) = share(copy);
                    crates.push(concrete);
                    let surface = SurfaceId(surface);
                    let position = pos(x, y);
                    world.set(surface, position, handle.clone());
                    let intent = if intent { DuplicateIntent::Move } else { DuplicateIntent::CopyPaste };
                    prop_assert!(registry.register_with(&handle, position, surface, intent).is_ok());
                }
                Op::Remove { surface, x, y } => {
                    let surface = SurfaceId(surface);
                    let position = pos(x, y);
                    world.take(surface, position);
                    let _ = registry.unregister(surface, position, false);
                }
                Op::Retag { surface, x, y, tags } => {
                    let surface = SurfaceId(surface);
                    let position = pos(x, y);
                    if let Some(tile) = registry.get_tile(surface, position) {
                        let guid = guid_of(&tile);
                        if let Some(concrete) = crates.iter().find(|c| c.borrow().guid == guid) {
                            concrete.borrow_mut().tags = tag_list(&tags);
                        }
                    }
                    registry.refresh_tags(surface, position);
                }
                Op::Rescan => {
                    registry.rescan(&world);
                }
            }
            if let Err(violation) = registry.check_invariants() {
                return Err(TestCaseError::fail(format!("{violation}")));
            }
        }
    }
}
