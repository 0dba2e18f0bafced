#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tile_registry::{
    CapabilityKey, CloneError, GridPosition, GridWorld, SurfaceId, Tile, TileGuid, TileRef, TypeKey,
};

pub const SIDE_SMALL: i32 = 32;
pub const SIDE_MED: i32 = 128;
pub const SURFACES: u32 = 4;

pub trait Solid {}

#[derive(Clone, Default)]
pub struct Block {
    pub guid: TileGuid,
    pub tags: Vec<String>,
}

impl Tile for Block {
    fn guid(&self) -> TileGuid { self.guid }
    fn set_guid(&mut self, guid: TileGuid) { self.guid = guid; }
    fn tags(&self) -> Vec<String> { self.tags.clone() }
    fn type_key(&self) -> TypeKey { TypeKey::of::<Block>() }
    fn capabilities(&self) -> Vec<CapabilityKey> { vec![CapabilityKey::of::<dyn Solid>()] }

    fn clone_tile(&self) -> Result<TileRef, CloneError> {
        let copy: TileRef = Rc::new(RefCell::new(self.clone()));
        Ok(copy)
    }

    fn as_any(&self) -> &dyn Any { self }
}

/// A block tagged by its row parity and column band.
pub fn block(x: i32, y: i32) -> TileRef {
    let tags = vec![
        if y % 2 == 0 { "even" } else { "odd" }.to_owned(),
        format!("band-{}", x / 16),
    ];
    Rc::new(RefCell::new(Block { guid: TileGuid::NIL, tags }))
}

/// `SURFACES` loaded surfaces, each a filled `side` x `side` square.
pub fn filled_world(side: i32) -> GridWorld {
    let mut world = GridWorld::new();
    for s in 0..SURFACES {
        let surface = SurfaceId(s);
        world.load_surface(surface);
        for y in 0..side {
            for x in 0..side {
                world.set(surface, GridPosition::new(x, y), block(x, y));
            }
        }
    }
    world
}
