//! # World Collaborator
//!
//! The registry does not own the world's storage. It consumes a [`World`]
//! implementation for two things only:
//!
//! - **Scanning** during a full rescan: which surfaces are loaded and which
//!   tiles occupy which cells.
//! - **Placement** during the clone drain: putting a freshly cloned tile into
//!   a cell before it is registered.
//!
//! [`GridWorld`] is a simple in-memory implementation suitable for tools,
//! benchmarks and tests.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::engine::error::PlacementError;
use crate::engine::tile::TileRef;
use crate::engine::types::{GridPosition, SurfaceId};


/// External world state consulted by rescans and the clone drain.
pub trait World {
    /// All loaded surfaces.
    fn surfaces(&self) -> Vec<SurfaceId>;

    /// Returns `true` while `surface` is loaded.
    fn contains_surface(&self, surface: SurfaceId) -> bool;

    /// Occupied cells of `surface` and the tiles placed there.
    fn occupied(&self, surface: SurfaceId) -> Vec<(GridPosition, TileRef)>;

    /// Places `tile` at `position` on `surface`, replacing any occupant.
    fn place_tile(
        &mut self,
        surface: SurfaceId,
        position: GridPosition,
        tile: TileRef,
    ) -> Result<(), PlacementError>;
}

/// In-memory world made of sparse surfaces.
///
/// Cells are kept in a `BTreeMap` so scans enumerate them in a stable order.

#[derive(Default)]
pub struct GridWorld {
    surfaces: FxHashMap<SurfaceId, BTreeMap<GridPosition, TileRef>>,
}

impl GridWorld {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an empty surface. Loading an already loaded surface is a no-op.
    pub fn load_surface(&mut self, surface: SurfaceId) {
        self.surfaces.entry(surface).or_default();
    }

    /// Unloads a surface and returns the tiles it held.
    pub fn unload_surface(&mut self, surface: SurfaceId) -> Vec<(GridPosition, TileRef)> {
        self.surfaces
            .remove(&surface)
            .map(|cells| cells.into_iter().collect())
            .unwrap_or_default()
    }

    /// Puts a tile into a cell, loading the surface if needed.
    /// Returns the previous occupant.
    pub fn set(&mut self, surface: SurfaceId, position: GridPosition, tile: TileRef) -> Option<TileRef> {
        self.surfaces.entry(surface).or_default().insert(position, tile)
    }

    /// Clears a cell and returns its occupant.
    pub fn take(&mut self, surface: SurfaceId, position: GridPosition) -> Option<TileRef> {
        self.surfaces.get_mut(&surface)?.remove(&position)
    }

    /// Occupant of a cell.
    pub fn get(&self, surface: SurfaceId, position: GridPosition) -> Option<&TileRef> {
        self.surfaces.get(&surface)?.get(&position)
    }

    /// Total number of occupied cells across all surfaces.
    pub fn tile_count(&self) -> usize {
        self.surfaces.values().map(BTreeMap::len).sum()
    }
}

impl World for GridWorld {
    fn surfaces(&self) -> Vec<SurfaceId> {
        let mut out: Vec<SurfaceId> = self.surfaces.keys().copied().collect();
        out.sort_unstable();
        out
    }

    fn contains_surface(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    fn occupied(&self, surface: SurfaceId) -> Vec<(GridPosition, TileRef)> {
        self.surfaces
            .get(&surface)
            .map(|cells| cells.iter().map(|(p, t)| (*p, t.clone())).collect())
            .unwrap_or_default()
    }

    fn place_tile(
        &mut self,
        surface: SurfaceId,
        position: GridPosition,
        tile: TileRef,
    ) -> Result<(), PlacementError> {
        let Some(cells) = self.surfaces.get_mut(&surface) else {
            return Err(PlacementError::SurfaceNotLoaded { surface });
        };
        if position.is_impossible() {
            return Err(PlacementError::Refused {
                surface,
                position,
                reason: "impossible position".to_owned(),
            });
        }
        cells.insert(position, tile);
        Ok(())
    }
}
