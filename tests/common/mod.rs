#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tile_registry::{
    CapabilityKey, CloneError, GridPosition, GridWorld, RegistryConfig, SurfaceId, Tile, TileGuid,
    TileRef, TileRegistry, TypeKey,
};

pub trait Pushable {
    fn push_cost(&self) -> u32;
}

pub trait Damageable {
    fn hp(&self) -> i32;
}

/// Plain movable tile. Clonable, optionally locked or in asset state.
#[derive(Clone, Debug, Default)]
pub struct CrateTile {
    pub guid: TileGuid,
    pub tags: Vec<String>,
    pub locked: bool,
    pub asset: bool,
    pub transient: u32,
}

impl CrateTile {
    pub fn tagged(tags: &[&str]) -> Self {
        Self { tags: tags.iter().map(|t| t.to_string()).collect(), ..Self::default() }
    }

    pub fn with_guid(mut self, guid: TileGuid) -> Self {
        self.guid = guid;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

impl Pushable for CrateTile {
    fn push_cost(&self) -> u32 {
        1
    }
}

impl Tile for CrateTile {
    fn guid(&self) -> TileGuid { self.guid }
    fn set_guid(&mut self, guid: TileGuid) { self.guid = guid; }
    fn tags(&self) -> Vec<String> { self.tags.clone() }
    fn type_key(&self) -> TypeKey { TypeKey::of::<CrateTile>() }
    fn capabilities(&self) -> Vec<CapabilityKey> { vec![CapabilityKey::of::<dyn Pushable>()] }
    fn is_locked(&self) -> bool { self.locked }
    fn is_asset(&self) -> bool { self.asset }
    fn reset_transient_state(&mut self) { self.transient = 0; }

    fn clone_tile(&self) -> Result<TileRef, CloneError> {
        let copy: TileRef = Rc::new(RefCell::new(self.clone()));
        Ok(copy)
    }

    fn as_any(&self) -> &dyn Any { self }
}

/// Hostile tile with two capabilities. Cloning is unsupported.
#[derive(Clone, Debug, Default)]
pub struct EnemyTile {
    pub guid: TileGuid,
    pub tags: Vec<String>,
    pub hp: i32,
}

impl EnemyTile {
    pub fn new(hp: i32) -> Self {
        Self { guid: TileGuid::NIL, tags: vec!["enemy".to_owned()], hp }
    }
}

impl Damageable for EnemyTile {
    fn hp(&self) -> i32 { self.hp }
}

impl Pushable for EnemyTile {
    fn push_cost(&self) -> u32 { 5 }
}

impl Tile for EnemyTile {
    fn guid(&self) -> TileGuid { self.guid }
    fn set_guid(&mut self, guid: TileGuid) { self.guid = guid; }
    fn tags(&self) -> Vec<String> { self.tags.clone() }
    fn type_key(&self) -> TypeKey { TypeKey::of::<EnemyTile>() }

    fn capabilities(&self) -> Vec<CapabilityKey> {
        vec![CapabilityKey::of::<dyn Damageable>(), CapabilityKey::of::<dyn Pushable>()]
    }

    fn as_any(&self) -> &dyn Any { self }
}

/// Tile whose clone operation always fails.
#[derive(Debug, Default)]
pub struct BrittleTile {
    pub guid: TileGuid,
}

impl Tile for BrittleTile {
    fn guid(&self) -> TileGuid { self.guid }
    fn set_guid(&mut self, guid: TileGuid) { self.guid = guid; }
    fn type_key(&self) -> TypeKey { TypeKey::of::<BrittleTile>() }

    fn clone_tile(&self) -> Result<TileRef, CloneError> {
        Err(CloneError::Failed { guid: self.guid, reason: "shattered".to_owned() })
    }

    fn as_any(&self) -> &dyn Any { self }
}

pub const MAIN: SurfaceId = SurfaceId(1);
pub const SIDE: SurfaceId = SurfaceId(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn pos(x: i32, y: i32) -> GridPosition {
    GridPosition::new(x, y)
}

/// World with `MAIN` and `SIDE` loaded and nothing placed.
pub fn empty_world() -> GridWorld {
    let mut world = GridWorld::new();
    world.load_surface(MAIN);
    world.load_surface(SIDE);
    world
}

/// Registry initialized against `world`.
pub fn registry_for(world: &GridWorld) -> TileRegistry {
    init_tracing();
    TileRegistry::with_world(RegistryConfig::default(), world)
}

/// Wraps `tile`, returning both the concrete and the dyn handle.
pub fn share<T: Tile>(tile: T) -> (Rc<RefCell<T>>, TileRef) {
    let concrete = Rc::new(RefCell::new(tile));
    let handle: TileRef = concrete.clone();
    (concrete, handle)
}

/// Places `tile` in the world and registers it, like a live placement hook.
pub fn place(
    registry: &mut TileRegistry,
    world: &mut GridWorld,
    surface: SurfaceId,
    position: GridPosition,
    tile: TileRef,
) -> TileRef {
    world.set(surface, position, tile.clone());
    registry
        .register(&tile, position, surface)
        .expect("placement registers");
    tile
}

pub fn guid_of(tile: &TileRef) -> TileGuid {
    tile.borrow().guid()
}
