//! Registry ownership and the registration protocol.
//!
//! This module defines [`TileRegistry`], the single owner of:
//!
//! * the synchronized indices ([`IndexStore`]),
//! * the deferred callback and clone queues ([`Scheduler`]),
//! * the subscriber lists ([`Notifier`]),
//! * configuration and lifecycle flags.
//!
//! There is no global state: an application constructs one registry and hands
//! `&mut` access to the tile lifecycle hooks and the tick driver. Tests build
//! as many independent registries as they like.
//!
//! ## Registration protocol
//!
//! [`TileRegistry::register_with`] is the only path that indexes a tile. Live
//! placement, rescans and the clone drain all go through it, so they cannot
//! diverge. Duplicate GUIDs are resolved as follows:
//!
//! | Existing registration | Incoming object | Outcome |
//! |-----------------------|-----------------|---------|
//! | same cell | same object | `Unchanged` |
//! | same cell | other object | `Replaced` |
//! | other cell | same object | `Moved` |
//! | other cell | other locked object | `Duplicated` with a fresh GUID, state kept |
//! | other cell | other object, [`DuplicateIntent::Move`] | `Moved` (the old object is dropped from the indices) |
//! | other cell | other object, [`DuplicateIntent::CopyPaste`] | `Duplicated` with a fresh GUID |
//!
//! `Replaced` and a `Moved` takeover raise a single `Modified` event, like a
//! plain move.
//!
//! A new GUID registered on an occupied cell replaces the occupant, which is
//! unregistered first as part of a group.
//!
//! ## Notification discipline
//!
//! Change and vocabulary events are suppressed while a rescan runs; a single
//! rescan summary is delivered when it completes.

use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::engine::commands::DeferRequest;
use crate::engine::config::{CapacityConfig, RegistryConfig};
use crate::engine::error::{CloneError, InvariantViolation, RegisterError, RegistryResult, UnregisterError};
use crate::engine::index::{CapabilityList, IndexStore, Registration};
use crate::engine::notify::{
    ChangeEvent, ChangeKind, Notifier, RescanSummary, SubscriptionId, VocabularyChange, VocabularyEvent,
};
use crate::engine::pool::PoolStats;
use crate::engine::query::GuidRemap;
use crate::engine::scheduler::{CloneReport, Scheduler, TickReport};
use crate::engine::tile::{same_tile, Liveness, TileRef, WeakTileRef};
use crate::engine::types::{normalize_tags, CapabilityKey, GridPosition, SurfaceId, TileGuid, TypeKey};
use crate::engine::world::World;


/// How a registration that collides with a live GUID at another cell is
/// interpreted when the incoming object is not the registered one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DuplicateIntent {
    /// The incoming object takes over the GUID at the new cell.
    #[default]
    Move,
    /// The incoming object is a copy; it is reset and given a fresh GUID.
    CopyPaste,
}

/// Result of a successful [`TileRegistry::register_with`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Indexed on a surface that already had tiles.
    Added,
    /// Indexed as the first tile of its surface.
    AddedToEmptySurface,
    /// An existing registration moved to the requested cell.
    Moved,
    /// Another object registered under the same GUID at the same cell; the
    /// index now refers to the incoming object.
    Replaced,
    /// Registered as a copy under a freshly assigned GUID.
    Duplicated {
        /// The copy's new GUID.
        guid: TileGuid,
    },
    /// Already registered at that cell; nothing changed.
    Unchanged,
    /// The registry is not initialized yet; a rescan was scheduled.
    Deferred,
}

/// Point-in-time counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered tiles.
    pub tiles: usize,
    /// Surfaces owning at least one tile.
    pub surfaces: usize,
    /// Locked surfaces.
    pub locked_surfaces: usize,
    /// Callbacks in the FIFO queue.
    pub pending_callbacks: usize,
    /// Callbacks waiting on a delay.
    pub pending_timers: usize,
    /// Clone requests in the FIFO queue.
    pub pending_clones: usize,
    /// Position-map pool counters.
    pub position_map_pool: PoolStats,
    /// Bucket pool counters.
    pub bucket_pool: PoolStats,
    /// Callback-entry pool counters.
    pub callback_pool: PoolStats,
    /// Clone-request pool counters.
    pub clone_pool: PoolStats,
    /// Live subscriptions across the three channels.
    pub subscribers: usize,
}

/// Snapshot of the tile attributes the registry indexes.
struct TileSnapshot {
    guid: TileGuid,
    tags: Vec<String>,
    type_key: TypeKey,
    capabilities: CapabilityList,
    locked: bool,
    asset: bool,
}

impl TileSnapshot {
    fn read(tile: &TileRef) -> Option<Self> {
        let tile = tile.try_borrow().ok()?;
        let raw_tags = tile.tags();
        let mut capabilities = CapabilityList::new();
        for capability in tile.capabilities() {
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }
        Some(Self {
            guid: tile.guid(),
            tags: normalize_tags(raw_tags.iter().map(String::as_str)),
            type_key: tile.type_key(),
            capabilities,
            locked: tile.is_locked(),
            asset: tile.is_asset(),
        })
    }

    fn into_registration(self, tile: &TileRef, surface: SurfaceId, position: GridPosition) -> Registration {
        Registration {
            tile: tile.clone(),
            surface,
            position,
            tags: self.tags,
            type_key: self.type_key,
            capabilities: self.capabilities,
            locked: self.locked,
        }
    }
}

/// Internal result of materializing one clone request.
enum CloneStep {
    Materialized,
    Dropped,
    Failed,
}

/// The live-object registry.
///
/// ## Lifecycle
/// 1. [`TileRegistry::new`] builds an *uninitialized* registry.
/// 2. The first [`rescan`](Self::rescan) (directly or via a pending rescan at
///    the start of [`tick`](Self::tick)) initializes it.
/// 3. Tile lifecycle hooks call [`register`](Self::register) and
///    [`unregister`](Self::unregister); the tick driver calls
///    [`tick`](Self::tick) once per frame or idle step.

pub struct TileRegistry {
    config: RegistryConfig,
    pub(crate) index: IndexStore,
    scheduler: Scheduler,
    notifier: Notifier,
    pub(crate) guid_remap: Option<GuidRemap>,
    initialized: bool,
    rescan_pending: bool,
    rescanning: bool,
    capacity_dirty: bool,
    running: bool,
}

impl Default for TileRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl TileRegistry {
    /// Creates an uninitialized registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            index: IndexStore::new(&config.capacity),
            scheduler: Scheduler::new(&config.capacity),
            notifier: Notifier::new(),
            guid_remap: None,
            initialized: false,
            rescan_pending: false,
            rescanning: false,
            capacity_dirty: false,
            running: false,
            config,
        }
    }

    /// Creates a registry and initializes it from `world`.
    pub fn with_world(config: RegistryConfig, world: &dyn World) -> Self {
        let mut registry = Self::new(config);
        registry.rescan(world);
        registry
    }

    /// Loads configuration from a TOML file and initializes a registry from
    /// `world`.
    pub fn from_config_file(path: impl AsRef<Path>, world: &dyn World) -> RegistryResult<Self> {
        let config = RegistryConfig::from_file(path)?;
        Ok(Self::with_world(config, world))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration protocol
    // ─────────────────────────────────────────────────────────────────────

    /// Registers `tile` at `position` on `surface`, treating a GUID collision
    /// with another object as a move.
    pub fn register(
        &mut self,
        tile: &TileRef,
        position: GridPosition,
        surface: SurfaceId,
    ) -> Result<RegisterOutcome, RegisterError> {
        self.register_with(tile, position, surface, DuplicateIntent::Move)
    }

    /// Registers `tile` at `position` on `surface`.
    ///
    /// ## Behavior
    /// - Asset-state tiles and the impossible position are rejected (logged,
    ///   no mutation).
    /// - Before initialization the call schedules a rescan and returns
    ///   [`RegisterOutcome::Deferred`]; the rescan picks the tile up from the
    ///   world.
    /// - A nil GUID is replaced by a fresh one.
    /// - GUID collisions are resolved per the module-level table, using
    ///   `intent` when the colliding object is a different one.
    ///
    /// ## Notifications
    /// `Added`/`AddedToEmptySurface` for new entries, `Modified` for moves and
    /// replacements. Vocabulary events accompany bucket creation.

    pub fn register_with(
        &mut self,
        tile: &TileRef,
        position: GridPosition,
        surface: SurfaceId,
        intent: DuplicateIntent,
    ) -> Result<RegisterOutcome, RegisterError> {
        let Some(snapshot) = TileSnapshot::read(tile) else {
            tracing::error!(%surface, %position, "cannot register a tile that is mutably borrowed");
            return Err(RegisterError::TileBusy { surface, position });
        };

        if snapshot.asset {
            tracing::error!(guid = %snapshot.guid, %surface, %position, "asset-state tile passed to register");
            return Err(RegisterError::AssetTile { guid: snapshot.guid });
        }

        if position.is_impossible() {
            tracing::error!(guid = %snapshot.guid, %surface, "register called with the impossible position");
            return Err(RegisterError::ImpossiblePosition { guid: snapshot.guid });
        }

        if !self.initialized {
            if !self.rescan_pending {
                tracing::debug!(guid = %snapshot.guid, %surface, "registry not initialized; scheduling rescan");
            }
            self.rescan_pending = true;
            return Ok(RegisterOutcome::Deferred);
        }

        let mut snapshot = snapshot;
        if snapshot.guid.is_nil() {
            snapshot.guid = reassign_guid(tile, false)
                .ok_or(RegisterError::TileBusy { surface, position })?;
        }

        let existing = self
            .index
            .registration(&snapshot.guid)
            .map(|r| (r.surface, r.position, same_tile(&r.tile, tile)));

        let Some((old_surface, old_position, same_object)) = existing else {
            let outcome = self.insert_new(tile, snapshot, position, surface, false);
            return Ok(outcome);
        };

        let same_cell = old_surface == surface && old_position == position;
        match (same_cell, same_object, intent) {
            (true, true, _) => Ok(RegisterOutcome::Unchanged),

            (true, false, _) => {
                tracing::debug!(guid = %snapshot.guid, %surface, %position, "replacing registered object under the same guid");
                self.swap_registration(tile, snapshot, position, surface);
                Ok(RegisterOutcome::Replaced)
            }

            (false, true, _) => {
                self.move_registration(snapshot.guid, position, surface);
                Ok(RegisterOutcome::Moved)
            }

            // Locked instances are shared verbatim; each keeps its own entry.
            (false, false, _) if snapshot.locked => {
                let original = snapshot.guid;
                let guid = reassign_guid(tile, false)
                    .ok_or(RegisterError::TileBusy { surface, position })?;
                tracing::debug!(%original, instance = %guid, %surface, %position, "locked instance indexed under its own guid");
                snapshot.guid = guid;
                self.insert_new(tile, snapshot, position, surface, false);
                Ok(RegisterOutcome::Duplicated { guid })
            }

            (false, false, DuplicateIntent::Move) => {
                tracing::debug!(guid = %snapshot.guid, from = %old_position, to = %position, "guid taken over by moved object");
                self.swap_registration(tile, snapshot, position, surface);
                Ok(RegisterOutcome::Moved)
            }

            (false, false, DuplicateIntent::CopyPaste) => {
                let original = snapshot.guid;
                let guid = reassign_guid(tile, true)
                    .ok_or(RegisterError::TileBusy { surface, position })?;
                tracing::debug!(%original, copy = %guid, %surface, %position, "registered copy under a fresh guid");
                snapshot.guid = guid;
                self.insert_new(tile, snapshot, position, surface, false);
                Ok(RegisterOutcome::Duplicated { guid })
            }
        }
    }

    /// Unregisters the tile at `position` on `surface`.
    ///
    /// ## Behavior
    /// Purges the tile's pending deferred callbacks, removes it from every
    /// index, drops empty buckets and the surface key when it empties, and
    /// raises a `Deleted` event tagged with `grouped`.
    ///
    /// ## Returns
    /// The unregistered tile.

    pub fn unregister(
        &mut self,
        surface: SurfaceId,
        position: GridPosition,
        grouped: bool,
    ) -> Result<TileRef, UnregisterError> {
        if position.is_impossible() {
            tracing::error!(%surface, "unregister called with the impossible position");
            return Err(UnregisterError::ImpossiblePosition { surface });
        }

        let Some(cells) = self.index.surface(surface) else {
            tracing::warn!(%surface, %position, "unregister: surface not tracked");
            return Err(UnregisterError::UnknownSurface { surface });
        };

        let Some(occupant) = cells.get(&position) else {
            tracing::warn!(%surface, %position, "unregister: nothing registered at position");
            return Err(UnregisterError::EmptyPosition { surface, position });
        };

        let guid = occupant.guid;
        match self.remove_registration(guid, grouped) {
            Some(registration) => Ok(registration.tile),
            None => Err(UnregisterError::EmptyPosition { surface, position }),
        }
    }

    /// Unregisters every tile on `surface`, as a grouped deletion. Used when a
    /// surface is unloaded.
    ///
    /// ## Returns
    /// Number of tiles unregistered.

    pub fn unregister_surface(&mut self, surface: SurfaceId) -> usize {
        let guids: Vec<TileGuid> = match self.index.surface(surface) {
            Some(cells) => cells.values().map(|o| o.guid).collect(),
            None => return 0,
        };
        let mut removed = 0;
        for guid in guids {
            if self.remove_registration(guid, true).is_some() {
                removed += 1;
            }
        }
        tracing::debug!(%surface, removed, "surface unregistered");
        removed
    }

    /// Re-reads the tags of the tile at `position` on `surface` and updates
    /// the tag buckets.
    ///
    /// ## Returns
    /// `true` if the indexed tag set changed (a `TagsModified` event was
    /// raised).

    pub fn refresh_tags(&mut self, surface: SurfaceId, position: GridPosition) -> bool {
        let Some(occupant) = self.index.occupant(surface, position) else {
            tracing::warn!(%surface, %position, "refresh_tags: nothing registered at position");
            return false;
        };
        let guid = occupant.guid;
        let Ok(tile) = occupant.tile.try_borrow() else {
            tracing::warn!(%guid, "refresh_tags: tile is mutably borrowed");
            return false;
        };
        let raw = tile.tags();
        drop(tile);
        let tags = normalize_tags(raw.iter().map(String::as_str));

        let mut vocabulary = Vec::new();
        let changed = self.index.retag(guid, tags, &mut vocabulary);
        self.emit_vocabulary(vocabulary);
        if changed {
            self.emit_change(ChangeKind::TagsModified, false, position, Some(surface));
        }
        changed
    }

    /// Raises a `Modified` event for the tile at `position` on `surface`.
    ///
    /// ## Returns
    /// `false` if nothing is registered there.

    pub fn mark_modified(&mut self, surface: SurfaceId, position: GridPosition) -> bool {
        if self.index.occupant(surface, position).is_none() {
            tracing::warn!(%surface, %position, "mark_modified: nothing registered at position");
            return false;
        }
        self.emit_change(ChangeKind::Modified, false, position, Some(surface));
        true
    }

    fn insert_new(
        &mut self,
        tile: &TileRef,
        snapshot: TileSnapshot,
        position: GridPosition,
        surface: SurfaceId,
        grouped: bool,
    ) -> RegisterOutcome {
        self.displace_occupant(surface, position, snapshot.guid);

        let guid = snapshot.guid;
        let registration = snapshot.into_registration(tile, surface, position);
        let mut vocabulary = Vec::new();
        let first_on_surface = self.index.insert(guid, registration, &mut vocabulary);
        self.emit_vocabulary(vocabulary);

        tracing::trace!(%guid, %surface, %position, "tile registered");
        if first_on_surface {
            self.emit_change(ChangeKind::AddedToEmptySurface, grouped, position, Some(surface));
            RegisterOutcome::AddedToEmptySurface
        } else {
            self.emit_change(ChangeKind::Added, grouped, position, Some(surface));
            RegisterOutcome::Added
        }
    }

    /// Points an existing GUID at another object, possibly in another cell.
    /// Consumers see one in-place change; the GUID's deferred work is kept.
    fn swap_registration(
        &mut self,
        tile: &TileRef,
        snapshot: TileSnapshot,
        position: GridPosition,
        surface: SurfaceId,
    ) {
        let guid = snapshot.guid;
        self.displace_occupant(surface, position, guid);
        let entered_empty_surface = self
            .index
            .registration(&guid)
            .is_some_and(|r| r.surface != surface)
            && self.index.surface(surface).is_none();

        let mut vocabulary = Vec::new();
        self.index.remove(guid, &mut vocabulary);
        let registration = snapshot.into_registration(tile, surface, position);
        self.index.insert(guid, registration, &mut vocabulary);
        self.emit_vocabulary(net_vocabulary(vocabulary));

        tracing::trace!(%guid, %surface, %position, "registration swapped to another object");
        let kind = if entered_empty_surface {
            ChangeKind::AddedToEmptySurface
        } else {
            ChangeKind::Modified
        };
        self.emit_change(kind, false, position, Some(surface));
    }

    fn move_registration(&mut self, guid: TileGuid, position: GridPosition, surface: SurfaceId) {
        self.displace_occupant(surface, position, guid);

        let Some(relocation) = self.index.relocate(guid, surface, position) else { return; };
        tracing::trace!(%guid, %surface, %position, vacated = relocation.vacated_surface, "tile moved");
        let kind = if relocation.entered_empty_surface {
            ChangeKind::AddedToEmptySurface
        } else {
            ChangeKind::Modified
        };
        self.emit_change(kind, false, position, Some(surface));
    }

    /// Unregisters whatever other tile occupies the cell, as a grouped delete.
    fn displace_occupant(&mut self, surface: SurfaceId, position: GridPosition, incoming: TileGuid) {
        let Some(occupant) = self.index.occupant(surface, position) else { return; };
        if occupant.guid == incoming {
            return;
        }
        let displaced = occupant.guid;
        tracing::debug!(%displaced, %incoming, %surface, %position, "replacing cell occupant");
        self.remove_registration(displaced, true);
    }

    fn remove_registration(&mut self, guid: TileGuid, grouped: bool) -> Option<Registration> {
        self.scheduler.purge_owner(guid);

        let mut vocabulary = Vec::new();
        let registration = self.index.remove(guid, &mut vocabulary)?;
        self.emit_vocabulary(vocabulary);

        tracing::trace!(%guid, surface = %registration.surface, position = %registration.position, "tile unregistered");
        self.emit_change(ChangeKind::Deleted, grouped, registration.position, Some(registration.surface));
        Some(registration)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rescan
    // ─────────────────────────────────────────────────────────────────────

    /// Rebuilds every index from `world`.
    ///
    /// ## Semantics
    /// * All indices are cleared and pooled containers released (or rebuilt
    ///   when capacities changed).
    /// * Every occupied cell reported by the world is registered through the
    ///   same path live placement uses. Duplicate GUIDs among different
    ///   objects are resolved as copies.
    /// * Change and vocabulary events are suppressed for the duration; one
    ///   rescan summary is delivered afterwards.

    pub fn rescan(&mut self, world: &dyn World) -> RescanSummary {
        let span = tracing::info_span!("rescan");
        let _guard = span.enter();

        self.rescanning = true;
        if self.capacity_dirty {
            self.index.rebuild(&self.config.capacity);
            self.scheduler.resize(&self.config.capacity);
            self.capacity_dirty = false;
        } else {
            self.index.clear();
        }
        self.initialized = true;
        self.rescan_pending = false;

        let mut rejected = 0usize;
        for surface in world.surfaces() {
            for (position, tile) in world.occupied(surface) {
                if self.register_with(&tile, position, surface, DuplicateIntent::CopyPaste).is_err() {
                    rejected += 1;
                }
            }
        }
        self.rescanning = false;

        let summary = RescanSummary {
            surfaces: self.index.surface_count(),
            tiles: self.index.len(),
            locked_surfaces: self.index.locked_surfaces().count(),
        };
        tracing::info!(
            surfaces = summary.surfaces,
            tiles = summary.tiles,
            locked = summary.locked_surfaces,
            rejected,
            "rescan complete"
        );
        self.notifier.emit_rescan(summary);
        summary
    }

    /// Schedules a rescan for the start of the next tick.
    pub fn request_rescan(&mut self) {
        self.rescan_pending = true;
    }

    /// `true` once the first rescan has completed.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `true` while a rescan is waiting for the next tick.
    #[inline]
    pub fn is_rescan_pending(&self) -> bool {
        self.rescan_pending
    }

    // ─────────────────────────────────────────────────────────────────────
    // Deferred work
    // ─────────────────────────────────────────────────────────────────────

    /// Runs `action` on the next tick.
    pub fn defer(&mut self, label: impl Into<String>, action: impl FnOnce() + 'static) {
        self.scheduler.enqueue(DeferRequest::new(label, action));
    }

    /// Runs `action` on the next tick unless `target` is gone by then.
    pub fn defer_checked(
        &mut self,
        target: impl Liveness + 'static,
        label: impl Into<String>,
        action: impl FnOnce() + 'static,
    ) {
        self.scheduler.enqueue(DeferRequest::new(label, action).checked(target));
    }

    /// Queues a fully described deferred callback.
    pub fn defer_with(&mut self, request: DeferRequest) {
        self.scheduler.enqueue(request);
    }

    /// Queues a callback to run after `delay`. Delays below the configured
    /// immediate threshold run on the next tick.
    pub fn defer_after(&mut self, delay: Duration, request: DeferRequest) {
        let threshold = self.config.immediate_delay();
        self.scheduler.enqueue_after(delay, threshold, request);
    }

    /// Queues a request to clone `tile` into `position` on `surface`.
    ///
    /// ## Errors
    /// [`CloneError::Locked`] if the tile is locked, [`CloneError::AssetSource`]
    /// if it is in asset state, [`CloneError::Failed`] if it is mutably
    /// borrowed and cannot be inspected.

    pub fn request_clone(
        &mut self,
        tile: &TileRef,
        position: GridPosition,
        surface: SurfaceId,
    ) -> Result<(), CloneError> {
        let (guid, locked, asset) = match tile.try_borrow() {
            Ok(t) => (t.guid(), t.is_locked(), t.is_asset()),
            Err(_) => {
                return Err(CloneError::Failed {
                    guid: TileGuid::NIL,
                    reason: "tile is mutably borrowed".to_owned(),
                })
            }
        };
        if locked {
            tracing::warn!(%guid, "clone requested for a locked tile");
            return Err(CloneError::Locked { guid });
        }
        if asset {
            tracing::error!(%guid, "clone requested for an asset-state tile");
            return Err(CloneError::AssetSource { guid });
        }
        self.scheduler.enqueue_clone(Rc::downgrade(tile), guid, position, surface);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    /// Runs one scheduling tick.
    ///
    /// ## Order
    /// 1. A pending rescan runs first.
    /// 2. Delayed callbacks that are due join the callback queue.
    /// 3. The callback queue drains (capped while running).
    /// 4. The clone queue drains (capped while running).

    pub fn tick(&mut self, world: &mut dyn World) -> TickReport {
        let tick = self.scheduler.advance();
        let span = tracing::debug_span!("tick", tick);
        let _guard = span.enter();

        let mut report = TickReport { tick, ..TickReport::default() };

        if self.rescan_pending {
            self.rescan(&*world);
            report.rescanned = true;
        }

        report.promoted = self.scheduler.promote_due(Instant::now());

        let (callback_limit, clone_limit) = self.effective_limits();
        report.callbacks = self.scheduler.drain_callbacks(callback_limit);
        report.clones = self.drain_clones(world, clone_limit);

        report.pending_callbacks = self.scheduler.pending_callbacks();
        report.pending_clones = self.scheduler.pending_clones();

        if report.callbacks.failed > 0 || report.clones.failed > 0 {
            tracing::debug!(?report, "tick finished with failures");
        }
        report
    }

    fn effective_limits(&self) -> (Option<usize>, Option<usize>) {
        if self.running {
            (self.config.callback_limit(), self.config.clone_limit())
        } else {
            (None, None)
        }
    }

    fn drain_clones(&mut self, world: &mut dyn World, limit: Option<usize>) -> CloneReport {
        let mut report = CloneReport::default();
        let mut taken = 0usize;

        while limit.map_or(true, |l| taken < l) {
            let Some(request) = self.scheduler.pop_clone() else { break; };
            taken += 1;

            match self.materialize_clone(world, request.tile.as_ref(), request.surface, request.position, request.source_guid) {
                CloneStep::Materialized => report.materialized += 1,
                CloneStep::Dropped => report.dropped += 1,
                CloneStep::Failed => report.failed += 1,
            }
            self.scheduler.release_clone(request);
        }
        report
    }

    fn materialize_clone(
        &mut self,
        world: &mut dyn World,
        tile: Option<&WeakTileRef>,
        surface: Option<SurfaceId>,
        position: GridPosition,
        source_guid: TileGuid,
    ) -> CloneStep {
        let Some(source) = tile.and_then(|weak| weak.upgrade()) else {
            tracing::warn!(%source_guid, "clone source no longer exists; request dropped");
            return CloneStep::Dropped;
        };
        let Some(surface) = surface.filter(|s| world.contains_surface(*s)) else {
            tracing::warn!(%source_guid, "clone target surface no longer exists; request dropped");
            return CloneStep::Dropped;
        };

        let cloned = match source.try_borrow() {
            Ok(source) if source.is_locked() => {
                tracing::warn!(%source_guid, "clone source became locked; request dropped");
                return CloneStep::Dropped;
            }
            Ok(source) => source.clone_tile(),
            Err(_) => Err(CloneError::Failed {
                guid: source_guid,
                reason: "source tile is mutably borrowed".to_owned(),
            }),
        };

        let clone = match cloned {
            Ok(clone) if same_tile(&clone, &source) => {
                tracing::error!(%source_guid, "clone_tile returned the source object");
                return CloneStep::Failed;
            }
            Ok(clone) => clone,
            Err(error) => {
                tracing::error!(%source_guid, %error, "clone failed");
                return CloneStep::Failed;
            }
        };

        if let Err(reason) = registrable(&clone, position) {
            tracing::error!(%source_guid, %surface, %position, reason, "clone cannot be registered; not placed");
            return CloneStep::Failed;
        }

        let Some(guid) = reassign_guid(&clone, true) else {
            tracing::error!(%source_guid, "clone is borrowed; cannot assign a guid");
            return CloneStep::Failed;
        };

        if let Err(error) = world.place_tile(surface, position, clone.clone()) {
            tracing::error!(%source_guid, %error, "placing clone failed");
            return CloneStep::Failed;
        }

        match self.register_with(&clone, position, surface, DuplicateIntent::CopyPaste) {
            Ok(_) => {
                tracing::trace!(%source_guid, clone = %guid, %surface, %position, "clone materialized");
                CloneStep::Materialized
            }
            Err(error) => {
                tracing::error!(%source_guid, %error, "registering clone failed");
                CloneStep::Failed
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Notification
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribes to per-mutation change events.
    pub fn subscribe_changes(&mut self, handler: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        self.notifier.subscribe_changes(handler)
    }

    /// Subscribes to tag/type vocabulary changes.
    pub fn subscribe_vocabulary(
        &mut self,
        handler: impl FnMut(&VocabularyEvent) + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe_vocabulary(handler)
    }

    /// Subscribes to rescan completion.
    pub fn subscribe_rescan(&mut self, handler: impl FnMut(&RescanSummary) + 'static) -> SubscriptionId {
        self.notifier.subscribe_rescan(handler)
    }

    /// Removes a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn emit_change(&mut self, kind: ChangeKind, grouped: bool, position: GridPosition, surface: Option<SurfaceId>) {
        if self.rescanning {
            return;
        }
        self.notifier.emit_change(ChangeEvent { kind, grouped, position, surface });
    }

    fn emit_vocabulary(&mut self, events: Vec<VocabularyEvent>) {
        if self.rescanning {
            return;
        }
        for event in events {
            self.notifier.emit_vocabulary(event);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────

    /// Current configuration.
    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Sets the per-tick clone limit; `0` is unbounded.
    pub fn set_max_clones_per_tick(&mut self, limit: usize) {
        self.config.max_clones_per_tick = limit;
    }

    /// Sets the per-tick callback limit; `0` is unbounded.
    pub fn set_max_callbacks_per_tick(&mut self, limit: usize) {
        self.config.max_callbacks_per_tick = limit;
    }

    /// Sets the threshold below which delayed callbacks skip the timer.
    pub fn set_immediate_delay(&mut self, threshold: Duration) {
        self.config.immediate_delay_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX);
    }

    /// Changes initial container capacities. Takes effect through a rescan,
    /// which is scheduled for the next tick.
    pub fn set_capacity(&mut self, capacity: CapacityConfig) {
        if capacity == self.config.capacity {
            return;
        }
        self.config.capacity = capacity;
        self.capacity_dirty = true;
        self.rescan_pending = true;
    }

    /// Marks the process as actively running (capped drains) or idle
    /// (unbounded drains).
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// `true` while drains are capped.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────────────

    /// Verifies the index invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.index.check_invariants()
    }

    /// Registered tiles.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.index.len()
    }

    /// Surfaces owning at least one tile.
    #[inline]
    pub fn surface_count(&self) -> usize {
        self.index.surface_count()
    }

    /// Tags currently in use, sorted.
    pub fn tag_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.tag_keys().map(str::to_owned).collect();
        keys.sort_unstable();
        keys
    }

    /// Exact types currently registered.
    pub fn type_keys(&self) -> Vec<TypeKey> {
        self.index.type_keys().collect()
    }

    /// Capabilities currently registered.
    pub fn capability_keys(&self) -> Vec<CapabilityKey> {
        self.index.capability_keys().collect()
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> RegistryStats {
        let (position_map_pool, bucket_pool) = self.index.pool_stats();
        let (callback_pool, clone_pool) = self.scheduler.pool_stats();
        RegistryStats {
            tiles: self.index.len(),
            surfaces: self.index.surface_count(),
            locked_surfaces: self.index.locked_surfaces().count(),
            pending_callbacks: self.scheduler.pending_callbacks(),
            pending_timers: self.scheduler.pending_timers(),
            pending_clones: self.scheduler.pending_clones(),
            position_map_pool,
            bucket_pool,
            callback_pool,
            clone_pool,
            subscribers: self.notifier.subscriber_count(),
        }
    }
}

/// Checks what [`TileRegistry::register_with`] would reject, without touching
/// the registry.
fn registrable(tile: &TileRef, position: GridPosition) -> Result<(), &'static str> {
    if position.is_impossible() {
        return Err("impossible position");
    }
    match tile.try_borrow() {
        Ok(t) if t.is_asset() => Err("clone is in asset state"),
        Ok(_) => Ok(()),
        Err(_) => Err("clone is mutably borrowed"),
    }
}

/// Drops `Removed` events cancelled by a later `Created` of the same key.
fn net_vocabulary(events: Vec<VocabularyEvent>) -> Vec<VocabularyEvent> {
    let mut netted: Vec<VocabularyEvent> = Vec::with_capacity(events.len());
    for event in events {
        let cancels = netted.iter().position(|e| {
            e.kind == event.kind
                && e.key == event.key
                && e.change == VocabularyChange::Removed
                && event.change == VocabularyChange::Created
        });
        match cancels {
            Some(index) => {
                netted.remove(index);
            }
            None => netted.push(event),
        }
    }
    netted
}

/// Gives `tile` a fresh GUID, optionally resetting its transient state first.
/// `None` if the tile is borrowed elsewhere.
fn reassign_guid(tile: &TileRef, reset: bool) -> Option<TileGuid> {
    let mut tile = tile.try_borrow_mut().ok()?;
    if reset {
        tile.reset_transient_state();
    }
    let guid = TileGuid::new_v4();
    tile.set_guid(guid);
    Some(guid)
}
