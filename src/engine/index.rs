//! # Index Store
//!
//! Five synchronized views over the registered tile population plus the
//! locked-surface set:
//!
//! | Index | Key | Value |
//! |-------|-----|-------|
//! | positions | surface → cell | occupant (guid + tile) |
//! | tags | trimmed tag | bucket of tiles |
//! | types | exact [`TypeKey`] | bucket of tiles |
//! | capabilities | [`CapabilityKey`] | bucket of tiles |
//! | guids | [`TileGuid`] | registration record |
//!
//! ## Invariants
//! After every public mutation completes:
//! 1. A tile is in the position index iff it is in the guid index.
//! 2. A tile is in a tag bucket iff that tag is one of its indexed tags.
//! 3. A tile is in a type bucket iff the key is its exact type; empty buckets
//!    are removed (tag and capability buckets likewise).
//! 4. A surface key exists iff the surface owns at least one tile.
//! 5. A surface is locked iff it owns at least one locked tile.
//! 6. No GUID maps to more than one tile.
//!
//! [`IndexStore::check_invariants`] verifies all six.
//!
//! ## Records
//! The guid index stores a [`Registration`] snapshot of the tags, type and
//! capabilities the tile was indexed under. Removal works from the snapshot,
//! so a tile whose tags changed since registration is still removed from the
//! right buckets.
//!
//! ## Pooling
//! Per-surface position maps and buckets come from the store's pools and are
//! released back when they empty or when the store is cleared.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::engine::config::CapacityConfig;
use crate::engine::error::InvariantViolation;
use crate::engine::notify::{VocabularyChange, VocabularyEvent, VocabularyKind};
use crate::engine::pool::{Pool, PoolStats};
use crate::engine::tile::{same_tile, TileRef};
use crate::engine::types::{CapabilityKey, GridPosition, SurfaceId, TileGuid, TypeKey};


/// Cell occupant stored in a surface's position map.
#[derive(Clone)]
pub struct Occupant {
    /// GUID the tile is registered under.
    pub guid: TileGuid,
    /// The tile.
    pub tile: TileRef,
}

/// Per-surface map from cell to occupant.
pub type PositionMap = FxHashMap<GridPosition, Occupant>;

/// Bucket of tiles sharing a tag, type or capability.
pub type TileBucket = Vec<TileRef>;

/// Capability list of a single registration.
pub type CapabilityList = SmallVec<[CapabilityKey; 4]>;

/// What the guid index knows about a registered tile.
#[derive(Clone)]
pub struct Registration {
    /// The tile.
    pub tile: TileRef,
    /// Owning surface.
    pub surface: SurfaceId,
    /// Occupied cell.
    pub position: GridPosition,
    /// Tags the tile is indexed under (trimmed, unique).
    pub tags: Vec<String>,
    /// Exact type bucket.
    pub type_key: TypeKey,
    /// Capability buckets.
    pub capabilities: CapabilityList,
    /// Locked flag at registration time.
    pub locked: bool,
}

/// Result of moving a registration to another cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// The destination surface had no tiles before the move.
    pub entered_empty_surface: bool,
    /// The source surface has no tiles after the move.
    pub vacated_surface: bool,
}

/// The synchronized indices.
pub struct IndexStore {
    positions: FxHashMap<SurfaceId, PositionMap>,
    tags: FxHashMap<String, TileBucket>,
    types: FxHashMap<TypeKey, TileBucket>,
    capabilities: FxHashMap<CapabilityKey, TileBucket>,
    guids: FxHashMap<TileGuid, Registration>,
    locked: FxHashSet<SurfaceId>,
    map_pool: Pool<PositionMap>,
    bucket_pool: Pool<TileBucket>,
}

impl IndexStore {
    /// Creates empty indices sized by `capacity`.
    pub fn new(capacity: &CapacityConfig) -> Self {
        Self {
            positions: FxHashMap::with_capacity_and_hasher(capacity.surfaces, Default::default()),
            tags: FxHashMap::default(),
            types: FxHashMap::default(),
            capabilities: FxHashMap::default(),
            guids: FxHashMap::with_capacity_and_hasher(
                capacity.surfaces.saturating_mul(capacity.tiles_per_surface),
                Default::default(),
            ),
            locked: FxHashSet::default(),
            map_pool: Pool::new(capacity.tiles_per_surface, capacity.pool_retain),
            bucket_pool: Pool::new(capacity.bucket, capacity.pool_retain),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Indexes a new registration.
    ///
    /// ## Preconditions
    /// - `registration`'s GUID is not indexed.
    /// - The target cell is free.
    ///
    /// ## Returns
    /// `true` if the surface had no tiles before this insertion.

    pub fn insert(
        &mut self,
        guid: TileGuid,
        registration: Registration,
        vocabulary: &mut Vec<VocabularyEvent>,
    ) -> bool {
        debug_assert!(!self.guids.contains_key(&guid), "guid {guid} indexed twice");

        let surface = registration.surface;
        let first_on_surface = !self.positions.contains_key(&surface);
        let map_pool = &mut self.map_pool;
        let cells = self.positions.entry(surface).or_insert_with(|| map_pool.get());
        cells.insert(registration.position, Occupant { guid, tile: registration.tile.clone() });

        if registration.locked {
            self.locked.insert(surface);
        }

        for tag in &registration.tags {
            if push_to_bucket(&mut self.tags, &mut self.bucket_pool, tag.clone(), &registration.tile) {
                vocabulary.push(VocabularyEvent {
                    kind: VocabularyKind::Tag,
                    key: tag.clone(),
                    change: VocabularyChange::Created,
                });
            }
        }

        if push_to_bucket(&mut self.types, &mut self.bucket_pool, registration.type_key, &registration.tile) {
            vocabulary.push(VocabularyEvent {
                kind: VocabularyKind::Type,
                key: registration.type_key.name().to_owned(),
                change: VocabularyChange::Created,
            });
        }

        for capability in &registration.capabilities {
            push_to_bucket(&mut self.capabilities, &mut self.bucket_pool, *capability, &registration.tile);
        }

        self.guids.insert(guid, registration);
        first_on_surface
    }

    /// Removes a registration from every index.
    ///
    /// Buckets and surface maps that become empty are released to the pools.
    /// The locked set is updated for the owning surface.

    pub fn remove(&mut self, guid: TileGuid, vocabulary: &mut Vec<VocabularyEvent>) -> Option<Registration> {
        let registration = self.guids.remove(&guid)?;

        for tag in &registration.tags {
            if pull_from_bucket(&mut self.tags, &mut self.bucket_pool, tag, &registration.tile) {
                vocabulary.push(VocabularyEvent {
                    kind: VocabularyKind::Tag,
                    key: tag.clone(),
                    change: VocabularyChange::Removed,
                });
            }
        }

        if pull_from_bucket(&mut self.types, &mut self.bucket_pool, &registration.type_key, &registration.tile) {
            vocabulary.push(VocabularyEvent {
                kind: VocabularyKind::Type,
                key: registration.type_key.name().to_owned(),
                change: VocabularyChange::Removed,
            });
        }

        for capability in &registration.capabilities {
            pull_from_bucket(&mut self.capabilities, &mut self.bucket_pool, capability, &registration.tile);
        }

        self.vacate_cell(registration.surface, registration.position, guid);
        Some(registration)
    }

    /// Moves a registration to another cell, possibly on another surface.
    /// A move within one surface never drops the surface key.
    ///
    /// ## Preconditions
    /// The destination cell is free.

    pub fn relocate(
        &mut self,
        guid: TileGuid,
        surface: SurfaceId,
        position: GridPosition,
    ) -> Option<Relocation> {
        let (old_surface, old_position, tile, locked) = {
            let registration = self.guids.get(&guid)?;
            (registration.surface, registration.position, registration.tile.clone(), registration.locked)
        };

        if old_surface == surface {
            if let Some(cells) = self.positions.get_mut(&surface) {
                if cells.get(&old_position).is_some_and(|o| o.guid == guid) {
                    cells.remove(&old_position);
                }
                cells.insert(position, Occupant { guid, tile });
                if let Some(registration) = self.guids.get_mut(&guid) {
                    registration.position = position;
                }
                return Some(Relocation { entered_empty_surface: false, vacated_surface: false });
            }
        }

        let vacated_surface = self.vacate_cell(old_surface, old_position, guid);

        let entered_empty_surface = !self.positions.contains_key(&surface);
        let map_pool = &mut self.map_pool;
        let cells = self.positions.entry(surface).or_insert_with(|| map_pool.get());
        cells.insert(position, Occupant { guid, tile });
        if locked {
            self.locked.insert(surface);
        }

        if let Some(registration) = self.guids.get_mut(&guid) {
            registration.surface = surface;
            registration.position = position;
        }

        Some(Relocation { entered_empty_surface, vacated_surface })
    }

    /// Replaces the indexed tags of a registration.
    ///
    /// ## Returns
    /// `true` if the indexed tag set changed.

    pub fn retag(
        &mut self,
        guid: TileGuid,
        tags: Vec<String>,
        vocabulary: &mut Vec<VocabularyEvent>,
    ) -> bool {
        let Some(registration) = self.guids.get_mut(&guid) else { return false; };
        if registration.tags == tags {
            return false;
        }

        let old_tags = std::mem::replace(&mut registration.tags, tags);
        let tile = registration.tile.clone();
        let new_tags = registration.tags.clone();

        for tag in old_tags.iter().filter(|t| !new_tags.contains(t)) {
            if pull_from_bucket(&mut self.tags, &mut self.bucket_pool, tag, &tile) {
                vocabulary.push(VocabularyEvent {
                    kind: VocabularyKind::Tag,
                    key: tag.clone(),
                    change: VocabularyChange::Removed,
                });
            }
        }

        for tag in new_tags.iter().filter(|t| !old_tags.contains(t)) {
            if push_to_bucket(&mut self.tags, &mut self.bucket_pool, tag.clone(), &tile) {
                vocabulary.push(VocabularyEvent {
                    kind: VocabularyKind::Tag,
                    key: tag.clone(),
                    change: VocabularyChange::Created,
                });
            }
        }
        true
    }

    /// Empties every index and releases pooled containers.
    pub fn clear(&mut self) {
        self.map_pool.release_all(self.positions.drain().map(|(_, cells)| cells));
        self.bucket_pool.release_all(self.tags.drain().map(|(_, bucket)| bucket));
        self.bucket_pool.release_all(self.types.drain().map(|(_, bucket)| bucket));
        self.bucket_pool.release_all(self.capabilities.drain().map(|(_, bucket)| bucket));
        self.guids.clear();
        self.locked.clear();
    }

    /// Empties every index and re-sizes the pools and top-level maps.
    pub fn rebuild(&mut self, capacity: &CapacityConfig) {
        *self = Self::new(capacity);
    }

    /// Removes the cell entry; drops the surface key when it empties,
    /// otherwise recomputes the surface's locked state.
    ///
    /// ## Returns
    /// `true` if the surface no longer owns any tile.

    fn vacate_cell(&mut self, surface: SurfaceId, position: GridPosition, guid: TileGuid) -> bool {
        let Some(cells) = self.positions.get_mut(&surface) else {
            self.locked.remove(&surface);
            return true;
        };

        if cells.get(&position).is_some_and(|o| o.guid == guid) {
            cells.remove(&position);
        }

        if cells.is_empty() {
            if let Some(cells) = self.positions.remove(&surface) {
                self.map_pool.release(cells);
            }
            self.locked.remove(&surface);
            return true;
        }

        self.recompute_locked(surface);
        false
    }

    fn recompute_locked(&mut self, surface: SurfaceId) {
        let any_locked = self.positions.get(&surface).is_some_and(|cells| {
            cells
                .values()
                .any(|o| self.guids.get(&o.guid).is_some_and(|r| r.locked))
        });
        if any_locked {
            self.locked.insert(surface);
        } else {
            self.locked.remove(&surface);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────

    /// Occupant of a cell.
    #[inline]
    pub fn occupant(&self, surface: SurfaceId, position: GridPosition) -> Option<&Occupant> {
        self.positions.get(&surface)?.get(&position)
    }

    /// Cells of a surface.
    #[inline]
    pub fn surface(&self, surface: SurfaceId) -> Option<&PositionMap> {
        self.positions.get(&surface)
    }

    /// Registration record for a GUID.
    #[inline]
    pub fn registration(&self, guid: &TileGuid) -> Option<&Registration> {
        self.guids.get(guid)
    }

    /// All registration records.
    pub fn registrations(&self) -> impl Iterator<Item = (&TileGuid, &Registration)> {
        self.guids.iter()
    }

    /// Tag bucket.
    #[inline]
    pub fn tag_bucket(&self, tag: &str) -> Option<&TileBucket> {
        self.tags.get(tag)
    }

    /// Exact-type bucket.
    #[inline]
    pub fn type_bucket(&self, key: &TypeKey) -> Option<&TileBucket> {
        self.types.get(key)
    }

    /// Capability bucket.
    #[inline]
    pub fn capability_bucket(&self, key: &CapabilityKey) -> Option<&TileBucket> {
        self.capabilities.get(key)
    }

    /// Surfaces that own at least one tile.
    pub fn surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.positions.keys().copied()
    }

    /// Locked surfaces.
    pub fn locked_surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.locked.iter().copied()
    }

    /// Returns `true` if `surface` is in the locked set.
    #[inline]
    pub fn is_locked(&self, surface: SurfaceId) -> bool {
        self.locked.contains(&surface)
    }

    /// Tag keys currently in existence.
    pub fn tag_keys(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Type keys currently in existence.
    pub fn type_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.types.keys().copied()
    }

    /// Capability keys currently in existence.
    pub fn capability_keys(&self) -> impl Iterator<Item = CapabilityKey> + '_ {
        self.capabilities.keys().copied()
    }

    /// Number of registered tiles.
    #[inline]
    pub fn len(&self) -> usize {
        self.guids.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// Number of surfaces owning at least one tile.
    #[inline]
    pub fn surface_count(&self) -> usize {
        self.positions.len()
    }

    /// Pool counters: (position maps, buckets).
    pub fn pool_stats(&self) -> (PoolStats, PoolStats) {
        (self.map_pool.stats(), self.bucket_pool.stats())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────

    /// Verifies invariants 1–6; returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut positioned = 0usize;
        for (surface, cells) in &self.positions {
            if cells.is_empty() {
                return Err(InvariantViolation::SurfaceKey { surface: *surface });
            }
            let mut any_locked = false;
            for (position, occupant) in cells {
                let Some(registration) = self.guids.get(&occupant.guid) else {
                    return Err(InvariantViolation::PositionGuidMismatch { guid: occupant.guid });
                };
                if registration.surface != *surface
                    || registration.position != *position
                    || !same_tile(&registration.tile, &occupant.tile)
                {
                    return Err(InvariantViolation::PositionGuidMismatch { guid: occupant.guid });
                }
                any_locked |= registration.locked;
                positioned += 1;
            }
            if any_locked != self.locked.contains(surface) {
                return Err(InvariantViolation::LockedSet { surface: *surface });
            }
        }
        if let Some(surface) = self.locked.iter().find(|s| !self.positions.contains_key(s)) {
            return Err(InvariantViolation::LockedSet { surface: *surface });
        }

        for (guid, registration) in &self.guids {
            let positioned_here = self
                .occupant(registration.surface, registration.position)
                .is_some_and(|o| o.guid == *guid);
            if !positioned_here {
                return Err(InvariantViolation::PositionGuidMismatch { guid: *guid });
            }
            if let Ok(tile) = registration.tile.try_borrow() {
                let actual = tile.guid();
                if actual != *guid {
                    return Err(InvariantViolation::GuidDisagrees { key: *guid, actual });
                }
            }
        }
        if positioned != self.guids.len() {
            let guid = self.guids.keys().next().copied().unwrap_or(TileGuid::NIL);
            return Err(InvariantViolation::PositionGuidMismatch { guid });
        }

        self.check_tag_buckets()?;
        self.check_type_buckets()?;
        self.check_capability_buckets()
    }

    fn check_tag_buckets(&self) -> Result<(), InvariantViolation> {
        for (tag, bucket) in &self.tags {
            if bucket.is_empty() {
                return Err(InvariantViolation::EmptyBucket { index: "tag", key: tag.clone() });
            }
        }
        for (guid, registration) in &self.guids {
            for tag in &registration.tags {
                let count = self.tags.get(tag).map_or(0, |b| count_in(b, &registration.tile));
                if count != 1 {
                    return Err(InvariantViolation::TagBucket { tag: tag.clone(), guid: *guid });
                }
            }
        }
        let memberships: usize = self.tags.values().map(Vec::len).sum();
        let expected: usize = self.guids.values().map(|r| r.tags.len()).sum();
        if memberships != expected {
            let (tag, guid) = self
                .tags
                .iter()
                .flat_map(|(tag, bucket)| bucket.iter().map(move |t| (tag, t)))
                .find_map(|(tag, tile)| {
                    let owner = self.guid_of(tile)?;
                    let indexed = self.guids.get(&owner)?.tags.contains(tag);
                    (!indexed).then(|| (tag.clone(), owner))
                })
                .unwrap_or_default();
            return Err(InvariantViolation::TagBucket { tag, guid });
        }
        Ok(())
    }

    fn check_type_buckets(&self) -> Result<(), InvariantViolation> {
        for (key, bucket) in &self.types {
            if bucket.is_empty() {
                return Err(InvariantViolation::EmptyBucket { index: "type", key: key.name().to_owned() });
            }
        }
        for (guid, registration) in &self.guids {
            let count = self
                .types
                .get(&registration.type_key)
                .map_or(0, |b| count_in(b, &registration.tile));
            if count != 1 {
                return Err(InvariantViolation::TypeBucket {
                    type_name: registration.type_key.name(),
                    guid: *guid,
                });
            }
        }
        let memberships: usize = self.types.values().map(Vec::len).sum();
        if memberships != self.guids.len() {
            let (type_name, guid) = self
                .types
                .iter()
                .flat_map(|(key, bucket)| bucket.iter().map(move |t| (key, t)))
                .find_map(|(key, tile)| {
                    let owner = self.guid_of(tile)?;
                    (self.guids.get(&owner)?.type_key != *key).then(|| (key.name(), owner))
                })
                .unwrap_or(("<unknown>", TileGuid::NIL));
            return Err(InvariantViolation::TypeBucket { type_name, guid });
        }
        Ok(())
    }

    fn check_capability_buckets(&self) -> Result<(), InvariantViolation> {
        for (key, bucket) in &self.capabilities {
            if bucket.is_empty() {
                return Err(InvariantViolation::EmptyBucket { index: "capability", key: key.name().to_owned() });
            }
        }
        for (guid, registration) in &self.guids {
            for capability in &registration.capabilities {
                let count = self
                    .capabilities
                    .get(capability)
                    .map_or(0, |b| count_in(b, &registration.tile));
                if count != 1 {
                    return Err(InvariantViolation::CapabilityBucket {
                        capability: capability.name(),
                        guid: *guid,
                    });
                }
            }
        }
        let memberships: usize = self.capabilities.values().map(Vec::len).sum();
        let expected: usize = self.guids.values().map(|r| r.capabilities.len()).sum();
        if memberships != expected {
            return Err(InvariantViolation::CapabilityBucket { capability: "<unknown>", guid: TileGuid::NIL });
        }
        Ok(())
    }

    fn guid_of(&self, tile: &TileRef) -> Option<TileGuid> {
        self.guids
            .iter()
            .find(|(_, r)| same_tile(&r.tile, tile))
            .map(|(guid, _)| *guid)
    }
}

/// Adds `tile` to the bucket at `key`, creating the bucket from the pool.
/// Returns `true` if the bucket was created.
fn push_to_bucket<K: Eq + Hash>(
    buckets: &mut FxHashMap<K, TileBucket>,
    pool: &mut Pool<TileBucket>,
    key: K,
    tile: &TileRef,
) -> bool {
    match buckets.get_mut(&key) {
        Some(bucket) => {
            if !bucket.iter().any(|t| same_tile(t, tile)) {
                bucket.push(tile.clone());
            }
            false
        }
        None => {
            let mut bucket = pool.get();
            bucket.push(tile.clone());
            buckets.insert(key, bucket);
            true
        }
    }
}

/// Removes `tile` from the bucket at `key`, deleting the bucket when it
/// empties. Returns `true` if the bucket was deleted.
fn pull_from_bucket<K, Q>(
    buckets: &mut FxHashMap<K, TileBucket>,
    pool: &mut Pool<TileBucket>,
    key: &Q,
    tile: &TileRef,
) -> bool
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    let Some(bucket) = buckets.get_mut(key) else { return false; };
    if let Some(index) = bucket.iter().position(|t| same_tile(t, tile)) {
        bucket.remove(index);
    }
    if bucket.is_empty() {
        if let Some(bucket) = buckets.remove(key) {
            pool.release(bucket);
        }
        return true;
    }
    false
}

fn count_in(bucket: &TileBucket, tile: &TileRef) -> usize {
    bucket.iter().filter(|t| same_tile(t, tile)).count()
}
