//! Read-only lookups over the registry indices.
//!
//! Every lookup is O(1) or O(bucket size). Lists are owned copies: the
//! caller may mutate the registry while holding one.
//!
//! ## Surface filtering
//! Bucket lookups accept an optional surface. Membership is checked against
//! the registration record, so a tile is reported on the surface it is
//! *registered* on.
//!
//! ## Predicates
//! Predicates receive a shared borrow of the tile. A tile that is mutably
//! borrowed at query time cannot be inspected and is skipped.
//!
//! ## Builder
//! [`TileQuery`] combines the bucket lookups:
//!
//! ```ignore
//! let enemies = registry
//!     .query()
//!     .on_surface(level)
//!     .with_tag("enemy")
//!     .with_capability::<dyn Damageable>()
//!     .filter(|t| !t.is_locked())
//!     .collect();
//! ```
//!
//! The smallest named bucket drives the iteration; the remaining criteria are
//! checked per candidate.

use std::collections::hash_map::Entry;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::index::Registration;
use crate::engine::manager::TileRegistry;
use crate::engine::tile::{Tile, TileRef};
use crate::engine::types::{normalize_tag, CapabilityKey, GridPosition, SurfaceId, TileGuid, TypeKey};


/// Optional predicate applied by the bucket lookups.
pub type TilePredicate<'a> = Option<&'a dyn Fn(&dyn Tile) -> bool>;

/// Table of GUID remappings consulted when a direct GUID lookup misses.
///
/// Duplicated source assets can leave references to GUIDs that were
/// reassigned. Remaps may chain (`a -> b -> c`); cycles are tolerated and
/// end the search.
#[derive(Clone, Debug, Default)]
pub struct GuidRemap {
    map: FxHashMap<TileGuid, TileGuid>,
}

impl GuidRemap {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `from` now lives under `to`.
    ///
    /// ## Returns
    /// The previous target of `from`, if any.
    pub fn insert(&mut self, from: TileGuid, to: TileGuid) -> Option<TileGuid> {
        match self.map.entry(from) {
            Entry::Occupied(mut e) => Some(e.insert(to)),
            Entry::Vacant(e) => {
                e.insert(to);
                None
            }
        }
    }

    /// Forgets a remapping.
    pub fn remove(&mut self, from: &TileGuid) -> Option<TileGuid> {
        self.map.remove(from)
    }

    /// Direct target of `from`.
    pub fn get(&self, from: &TileGuid) -> Option<TileGuid> {
        self.map.get(from).copied()
    }

    /// Number of remappings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Follows the chain starting at `from`, yielding each successive target.
    /// Stops at the end of the chain or when a GUID repeats.
    pub fn chain(&self, from: TileGuid) -> impl Iterator<Item = TileGuid> + '_ {
        let mut seen = FxHashSet::default();
        seen.insert(from);
        let mut current = from;
        std::iter::from_fn(move || {
            let next = self.get(&current)?;
            if !seen.insert(next) {
                return None;
            }
            current = next;
            Some(next)
        })
    }
}

impl FromIterator<(TileGuid, TileGuid)> for GuidRemap {
    fn from_iter<I: IntoIterator<Item = (TileGuid, TileGuid)>>(iter: I) -> Self {
        Self { map: iter.into_iter().collect() }
    }
}

/// A GUID lookup result.
#[derive(Clone)]
pub struct GuidMatch {
    /// The GUID the tile is registered under.
    pub guid: TileGuid,
    /// The tile.
    pub tile: TileRef,
    /// `true` if the match was found through the remap table.
    pub remapped: bool,
}

impl TileRegistry {
    /// Tile registered at `position` on `surface`.
    pub fn get_tile(&self, surface: SurfaceId, position: GridPosition) -> Option<TileRef> {
        self.index.occupant(surface, position).map(|o| o.tile.clone())
    }

    /// Returns `true` if a tile is registered at `position` on `surface`.
    pub fn has_tile(&self, surface: SurfaceId, position: GridPosition) -> bool {
        self.index.occupant(surface, position).is_some()
    }

    /// Every tile registered on `surface`, ordered by position.
    pub fn get_all_for_surface(&self, surface: SurfaceId) -> Vec<TileRef> {
        let Some(cells) = self.index.surface(surface) else { return Vec::new(); };
        let mut entries: Vec<(&GridPosition, &TileRef)> = cells.iter().map(|(p, o)| (p, &o.tile)).collect();
        entries.sort_unstable_by_key(|(p, _)| **p);
        entries.into_iter().map(|(_, t)| t.clone()).collect()
    }

    /// Tiles whose exact type is `key`, optionally restricted to `surface` and
    /// filtered by `predicate`.
    pub fn get_all_of_exact_type(
        &self,
        surface: Option<SurfaceId>,
        key: TypeKey,
        predicate: TilePredicate<'_>,
    ) -> Vec<TileRef> {
        let Some(bucket) = self.index.type_bucket(&key) else { return Vec::new(); };
        self.filter_bucket(bucket, surface, predicate)
    }

    /// Typed form of [`get_all_of_exact_type`](Self::get_all_of_exact_type).
    pub fn get_all_of<T: Tile>(&self, surface: Option<SurfaceId>, predicate: TilePredicate<'_>) -> Vec<TileRef> {
        self.get_all_of_exact_type(surface, TypeKey::of::<T>(), predicate)
    }

    /// Tiles declaring capability `C`.
    pub fn get_all_with_capability<C: ?Sized + 'static>(
        &self,
        surface: Option<SurfaceId>,
        predicate: TilePredicate<'_>,
    ) -> Vec<TileRef> {
        self.get_all_with_capability_key(surface, CapabilityKey::of::<C>(), predicate)
    }

    /// Tiles declaring the capability `key`.
    pub fn get_all_with_capability_key(
        &self,
        surface: Option<SurfaceId>,
        key: CapabilityKey,
        predicate: TilePredicate<'_>,
    ) -> Vec<TileRef> {
        let Some(bucket) = self.index.capability_bucket(&key) else { return Vec::new(); };
        self.filter_bucket(bucket, surface, predicate)
    }

    /// Tiles carrying `tag`. The tag is trimmed before lookup; a blank tag
    /// matches nothing.
    pub fn get_all_with_tag(
        &self,
        surface: Option<SurfaceId>,
        tag: &str,
        predicate: TilePredicate<'_>,
    ) -> Vec<TileRef> {
        let Some(tag) = normalize_tag(tag) else { return Vec::new(); };
        let Some(bucket) = self.index.tag_bucket(tag) else { return Vec::new(); };
        self.filter_bucket(bucket, surface, predicate)
    }

    /// Tile registered under `guid`, falling back to the remap table.
    pub fn get_by_guid(&self, guid: TileGuid) -> Option<TileRef> {
        self.find_by_guid(guid).map(|m| m.tile)
    }

    /// Like [`get_by_guid`](Self::get_by_guid) but reports which GUID matched.
    ///
    /// ## Search order
    /// 1. Direct guid index lookup.
    /// 2. Each GUID in the remap chain of `guid`, in order.
    pub fn find_by_guid(&self, guid: TileGuid) -> Option<GuidMatch> {
        if let Some(registration) = self.index.registration(&guid) {
            return Some(GuidMatch { guid, tile: registration.tile.clone(), remapped: false });
        }

        let remap = self.guid_remap.as_ref()?;
        let found = remap.chain(guid).find_map(|candidate| {
            self.index
                .registration(&candidate)
                .map(|r| GuidMatch { guid: candidate, tile: r.tile.clone(), remapped: true })
        });
        if found.is_none() {
            tracing::debug!(%guid, "guid not found after extended search");
        }
        found
    }

    /// Installs the table consulted by [`find_by_guid`](Self::find_by_guid).
    pub fn set_guid_remap(&mut self, remap: GuidRemap) {
        self.guid_remap = Some(remap);
    }

    /// Removes and returns the remap table.
    pub fn take_guid_remap(&mut self) -> Option<GuidRemap> {
        self.guid_remap.take()
    }

    /// Returns `true` if `surface` owns a locked tile.
    pub fn is_surface_locked(&self, surface: SurfaceId) -> bool {
        self.index.is_locked(surface)
    }

    /// Surfaces owning at least one tile, sorted.
    pub fn get_all_surfaces(&self) -> Vec<SurfaceId> {
        let mut surfaces: Vec<SurfaceId> = self.index.surfaces().collect();
        surfaces.sort_unstable();
        surfaces
    }

    /// Locked surfaces, sorted.
    pub fn locked_surfaces(&self) -> Vec<SurfaceId> {
        let mut surfaces: Vec<SurfaceId> = self.index.locked_surfaces().collect();
        surfaces.sort_unstable();
        surfaces
    }

    /// Starts a combined query.
    pub fn query(&self) -> TileQuery<'_> {
        TileQuery::new(self)
    }

    fn filter_bucket(
        &self,
        bucket: &[TileRef],
        surface: Option<SurfaceId>,
        predicate: TilePredicate<'_>,
    ) -> Vec<TileRef> {
        if surface.is_none() && predicate.is_none() {
            return bucket.to_vec();
        }
        bucket
            .iter()
            .filter(|tile| {
                let Ok(borrowed) = tile.try_borrow() else { return false; };
                if let Some(surface) = surface {
                    if self.registration_of(&*borrowed).map(|r| r.surface) != Some(surface) {
                        return false;
                    }
                }
                predicate.map_or(true, |p| p(&*borrowed))
            })
            .cloned()
            .collect()
    }

    fn registration_of(&self, tile: &dyn Tile) -> Option<&Registration> {
        self.index.registration(&tile.guid())
    }
}

/// Builder combining surface, tag, type, capability and predicate criteria.
///
/// Created by [`TileRegistry::query`]; consumed by [`collect`](Self::collect).
pub struct TileQuery<'r> {
    registry: &'r TileRegistry,
    surface: Option<SurfaceId>,
    tags: Vec<String>,
    type_key: Option<TypeKey>,
    capabilities: Vec<CapabilityKey>,
    filters: Vec<Box<dyn Fn(&dyn Tile) -> bool + 'r>>,
    unsatisfiable: bool,
}

impl<'r> TileQuery<'r> {
    fn new(registry: &'r TileRegistry) -> Self {
        Self {
            registry,
            surface: None,
            tags: Vec::new(),
            type_key: None,
            capabilities: Vec::new(),
            filters: Vec::new(),
            unsatisfiable: false,
        }
    }

    /// Restricts results to tiles registered on `surface`.
    pub fn on_surface(mut self, surface: SurfaceId) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Requires `tag` (trimmed). A blank tag makes the query match nothing.
    pub fn with_tag(mut self, tag: &str) -> Self {
        match normalize_tag(tag) {
            Some(tag) => self.tags.push(tag.to_owned()),
            None => self.unsatisfiable = true,
        }
        self
    }

    /// Requires exact type `T`.
    pub fn of_type<T: Tile>(self) -> Self {
        self.of_type_key(TypeKey::of::<T>())
    }

    /// Requires exact type `key`.
    pub fn of_type_key(mut self, key: TypeKey) -> Self {
        if self.type_key.is_some_and(|k| k != key) {
            self.unsatisfiable = true;
        }
        self.type_key = Some(key);
        self
    }

    /// Requires capability `C`.
    pub fn with_capability<C: ?Sized + 'static>(mut self) -> Self {
        self.capabilities.push(CapabilityKey::of::<C>());
        self
    }

    /// Adds a predicate.
    pub fn filter(mut self, predicate: impl Fn(&dyn Tile) -> bool + 'r) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Runs the query.
    pub fn collect(self) -> Vec<TileRef> {
        if self.unsatisfiable {
            return Vec::new();
        }
        let index = &self.registry.index;

        let mut sources: Vec<Option<&Vec<TileRef>>> = Vec::new();
        sources.extend(self.tags.iter().map(|t| index.tag_bucket(t)));
        sources.extend(self.type_key.iter().map(|k| index.type_bucket(k)));
        sources.extend(self.capabilities.iter().map(|c| index.capability_bucket(c)));

        if sources.iter().any(Option::is_none) {
            return Vec::new();
        }
        let driver = sources.into_iter().flatten().min_by_key(|b| b.len());

        let candidates: Vec<TileRef> = match (driver, self.surface) {
            (Some(bucket), _) => bucket.clone(),
            (None, Some(surface)) => self.registry.get_all_for_surface(surface),
            (None, None) => {
                let mut all: Vec<&Registration> = index.registrations().map(|(_, r)| r).collect();
                all.sort_unstable_by_key(|r| (r.surface, r.position));
                all.into_iter().map(|r| r.tile.clone()).collect()
            }
        };

        candidates
            .into_iter()
            .filter(|tile| self.accepts(tile))
            .collect()
    }

    fn accepts(&self, tile: &TileRef) -> bool {
        let Ok(borrowed) = tile.try_borrow() else { return false; };
        let Some(registration) = self.registry.registration_of(&*borrowed) else { return false; };

        if self.surface.is_some_and(|s| s != registration.surface) {
            return false;
        }
        if self.type_key.is_some_and(|k| k != registration.type_key) {
            return false;
        }
        if !self.tags.iter().all(|t| registration.tags.contains(t)) {
            return false;
        }
        if !self.capabilities.iter().all(|c| registration.capabilities.contains(c)) {
            return false;
        }
        self.filters.iter().all(|f| f(&*borrowed))
    }
}
