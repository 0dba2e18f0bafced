//! # Tiles
//!
//! A tile is a live domain object placed on a surface cell. Tiles are owned by
//! the external world; the registry holds shared handles to them and indexes
//! them by position, tag, exact type, capability and GUID.
//!
//! ## Handles
//! - [`TileRef`] is the shared strong handle (`Rc<RefCell<dyn Tile>>`). The
//!   registry is single-threaded and cooperatively scheduled, so no `Send`
//!   bound is required.
//! - [`WeakTileRef`] is held by deferred work. A tile whose last strong handle
//!   is dropped reads as "null" and its pending work is discarded.
//!
//! ## Contract
//! - [`Tile::guid`] is stable while the tile is registered.
//! - [`Tile::tags`] may change at any time; the registry only observes the
//!   change when [`refresh_tags`](crate::TileRegistry::refresh_tags) is called.
//! - [`Tile::type_key`] and [`Tile::capabilities`] must not change while the
//!   tile is registered.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::engine::error::CloneError;
use crate::engine::types::{CapabilityKey, TileGuid, TypeKey};


/// Shared handle to a live tile.
pub type TileRef = Rc<RefCell<dyn Tile>>;

/// Non-owning handle to a tile, used for null-checks in deferred work.
pub type WeakTileRef = Weak<RefCell<dyn Tile>>;

/// A live object placed on a grid surface.
///
/// Implementors provide identity, classification and the cloning capability.
/// Most methods have defaults suited to plain unlocked, non-asset tiles.

pub trait Tile: 'static {
    /// Globally unique identifier.
    fn guid(&self) -> TileGuid;

    /// Assigns a new identifier. Called by the registry for fresh tiles,
    /// copy/paste duplicates and clones.
    fn set_guid(&mut self, guid: TileGuid);

    /// Raw tags. The registry trims them and ignores empty ones.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Exact concrete type key.
    fn type_key(&self) -> TypeKey;

    /// Capabilities this tile implements.
    fn capabilities(&self) -> Vec<CapabilityKey> {
        Vec::new()
    }

    /// Locked tiles cannot be cloned and mark their surface as locked.
    fn is_locked(&self) -> bool {
        false
    }

    /// Design-time asset instances are never registered.
    fn is_asset(&self) -> bool {
        false
    }

    /// Clears per-instance transient state before the tile is re-registered
    /// as an independent duplicate.
    fn reset_transient_state(&mut self) {}

    /// Produces an independent live copy of this tile.
    ///
    /// The copy may carry this tile's GUID; the registry assigns the copy a
    /// fresh GUID before placing it.
    fn clone_tile(&self) -> Result<TileRef, CloneError> {
        Err(CloneError::Unsupported { type_name: self.type_key().name() })
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Wraps a concrete tile into a shared handle.
pub fn tile_ref<T: Tile>(tile: T) -> TileRef {
    Rc::new(RefCell::new(tile))
}

/// Returns `true` if both handles refer to the same tile object.
#[inline]
pub fn same_tile(a: &TileRef, b: &TileRef) -> bool {
    // Address only; vtable pointers of the same type may differ across codegen units.
    std::ptr::eq(Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>())
}

/// Null-check target for deferred callbacks.
///
/// A deferred entry whose target reports `false` is dropped without being run.

pub trait Liveness {
    /// Returns `true` while the target still exists.
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}
