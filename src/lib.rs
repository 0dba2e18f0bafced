//! # Tile Registry
//!
//! Live-object registry for tiles placed on 2D grid surfaces.
//!
//! The registry keeps five synchronized indices over every live tile
//! (position, tag, exact type, capability and GUID) plus the set of surfaces
//! that hold a locked tile, and runs two bounded per-tick drains: deferred
//! callbacks and clone requests.
//!
//! ## Design Goals
//! - O(1) lookups by position and GUID, O(bucket) lookups by tag, type and capability
//! - One registration path shared by live placement, rescans and clones
//! - Cooperative, single-threaded scheduling with per-tick caps
//! - Separate signals for per-tile changes and vocabulary changes
//!
//! ## Quick start
//! ```
//! use std::any::Any;
//! use tile_registry::prelude::*;
//!
//! struct Crate { guid: TileGuid }
//!
//! impl Tile for Crate {
//!     fn guid(&self) -> TileGuid { self.guid }
//!     fn set_guid(&mut self, guid: TileGuid) { self.guid = guid; }
//!     fn tags(&self) -> Vec<String> { vec!["loot".into()] }
//!     fn type_key(&self) -> TypeKey { TypeKey::of::<Crate>() }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! let surface = SurfaceId(1);
//! let mut world = GridWorld::new();
//! world.load_surface(surface);
//! world.set(surface, GridPosition::new(2, 3), tile_ref(Crate { guid: TileGuid::NIL }));
//!
//! let mut registry = TileRegistry::with_world(RegistryConfig::default(), &world);
//! assert_eq!(registry.get_all_with_tag(None, " loot ", None).len(), 1);
//! registry.tick(&mut world);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Registry

pub use engine::manager::{
    TileRegistry,
    DuplicateIntent,
    RegisterOutcome,
    RegistryStats,
};

pub use engine::query::{
    TileQuery,
    TilePredicate,
    GuidRemap,
    GuidMatch,
};

// Collaborators

pub use engine::tile::{
    Tile,
    TileRef,
    WeakTileRef,
    Liveness,
    tile_ref,
    same_tile,
};

pub use engine::world::{
    World,
    GridWorld,
};

// Deferred work

pub use engine::commands::DeferRequest;
pub use engine::scheduler::{
    TickReport,
    CallbackReport,
    CloneReport,
};

// Notification

pub use engine::notify::{
    ChangeEvent,
    ChangeKind,
    VocabularyEvent,
    VocabularyKind,
    VocabularyChange,
    RescanSummary,
    SubscriptionId,
};

// Configuration

pub use engine::config::{
    RegistryConfig,
    CapacityConfig,
};

pub use engine::pool::{
    Pool,
    Poolable,
    PoolStats,
};

pub use engine::error::{
    RegistryResult,
    RegistryError,
    RegisterError,
    UnregisterError,
    CloneError,
    PlacementError,
    ConfigError,
    InvariantViolation,
};

pub use engine::types::{
    SurfaceId,
    GridPosition,
    TileGuid,
    TypeKey,
    CapabilityKey,
    Tick,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used registry types.
///
/// Import with:
/// ```rust
/// use tile_registry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        TileRegistry,
        DuplicateIntent,
        RegisterOutcome,
        RegistryConfig,
        Tile,
        TileRef,
        tile_ref,
        World,
        GridWorld,
        DeferRequest,
        ChangeEvent,
        ChangeKind,
        SurfaceId,
        GridPosition,
        TileGuid,
        TypeKey,
        CapabilityKey,
    };
}
