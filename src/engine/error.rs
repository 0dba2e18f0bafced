//! Error types for registration, deferred work and configuration.
//!
//! This module declares focused, composable error types used across the
//! registration protocol, the scheduler drains and configuration loading. Each
//! error carries enough context to make a log line actionable while remaining
//! cheap to pass around or convert into the aggregate [`RegistryError`].
//!
//! ## Taxonomy
//! * **Caller-contract violations** ([`RegisterError::AssetTile`],
//!   [`UnregisterError::ImpossiblePosition`], ...) are logged as errors and the
//!   operation is a no-op.
//! * **Not-found conditions** ([`UnregisterError::UnknownSurface`],
//!   [`UnregisterError::EmptyPosition`]) are logged as warnings.
//! * **Deferred-work failures** ([`CloneError`], [`PlacementError`]) are caught
//!   per item inside the drain loops; the drain continues.
//! * **Initialization ordering** is not an error: registration before the
//!   first rescan returns [`RegisterOutcome::Deferred`](crate::RegisterOutcome).
//!
//! Nothing in this crate is fatal to the process.
//!
//! ## Display vs. Debug
//! * `Display` is short and imperative, suited to operator logs.
//! * `Debug` (derived) retains full structure for diagnostics.

use std::path::PathBuf;

use crate::engine::types::{GridPosition, SurfaceId, TileGuid};


/// Result alias used by registry entry points.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Returned when a tile cannot be registered.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// Design-time asset instances are never registered.
    #[error("tile {guid} is in asset state and cannot be registered")]
    AssetTile {
        /// GUID of the rejected tile.
        guid: TileGuid,
    },

    /// The sentinel position cannot hold a tile.
    #[error("cannot register tile {guid} at the impossible position")]
    ImpossiblePosition {
        /// GUID of the rejected tile.
        guid: TileGuid,
    },

    /// The tile is already borrowed mutably elsewhere and cannot be inspected.
    #[error("tile at {position} on {surface} is busy (already mutably borrowed)")]
    TileBusy {
        /// Surface the tile was being registered on.
        surface: SurfaceId,
        /// Target position.
        position: GridPosition,
    },
}

/// Returned when a tile cannot be unregistered.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnregisterError {
    /// The sentinel position was passed.
    #[error("cannot unregister the impossible position on {surface}")]
    ImpossiblePosition {
        /// Surface named by the caller.
        surface: SurfaceId,
    },

    /// The surface owns no registered tile.
    #[error("{surface} is not tracked by the registry")]
    UnknownSurface {
        /// Surface named by the caller.
        surface: SurfaceId,
    },

    /// The surface is tracked but nothing is registered at the position.
    #[error("no tile registered at {position} on {surface}")]
    EmptyPosition {
        /// Surface named by the caller.
        surface: SurfaceId,
        /// Position named by the caller.
        position: GridPosition,
    },
}

/// Failure of a tile's own cloning operation, or a refused clone request.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloneError {
    /// Locked tiles forbid cloning.
    #[error("tile {guid} is locked and cannot be cloned")]
    Locked {
        /// GUID of the locked tile.
        guid: TileGuid,
    },

    /// Asset-state tiles are never cloned into the world.
    #[error("tile {guid} is in asset state and cannot be cloned")]
    AssetSource {
        /// GUID of the asset tile.
        guid: TileGuid,
    },

    /// The tile's clone implementation reported a failure.
    #[error("cloning tile {guid} failed: {reason}")]
    Failed {
        /// GUID of the source tile.
        guid: TileGuid,
        /// Implementation-provided reason.
        reason: String,
    },

    /// The tile type does not support cloning at all.
    #[error("tile type {type_name} does not support cloning")]
    Unsupported {
        /// Concrete type name of the tile.
        type_name: &'static str,
    },
}

/// Failure of the world collaborator to place a tile.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// The target surface is not loaded.
    #[error("{surface} is not loaded")]
    SurfaceNotLoaded {
        /// Target surface.
        surface: SurfaceId,
    },

    /// The world refused the placement.
    #[error("placement at {position} on {surface} refused: {reason}")]
    Refused {
        /// Target surface.
        surface: SurfaceId,
        /// Target position.
        position: GridPosition,
        /// World-provided reason.
        reason: String,
    },
}

/// Errors raised while loading a [`RegistryConfig`](crate::RegistryConfig).

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for this schema.
    #[error("invalid registry config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A broken index invariant, reported by
/// [`TileRegistry::check_invariants`](crate::TileRegistry::check_invariants).
///
/// ## Notes
/// These represent internal inconsistencies, not recoverable caller errors.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A tile is in the position index but not the GUID index, or vice versa.
    #[error("tile {guid} present in one of the position/guid indices only")]
    PositionGuidMismatch {
        /// Offending GUID.
        guid: TileGuid,
    },

    /// A GUID index entry disagrees with the tile's own GUID.
    #[error("guid index key {key} maps to a tile reporting {actual}")]
    GuidDisagrees {
        /// Key in the GUID index.
        key: TileGuid,
        /// GUID reported by the tile.
        actual: TileGuid,
    },

    /// Tag bucket membership disagrees with the tile's indexed tags.
    #[error("tag bucket {tag:?} membership of tile {guid} is inconsistent")]
    TagBucket {
        /// Tag key.
        tag: String,
        /// Offending GUID.
        guid: TileGuid,
    },

    /// Type bucket membership disagrees with the tile's exact type.
    #[error("type bucket {type_name} membership of tile {guid} is inconsistent")]
    TypeBucket {
        /// Bucket type name.
        type_name: &'static str,
        /// Offending GUID.
        guid: TileGuid,
    },

    /// Capability bucket membership disagrees with the tile's declared capabilities.
    #[error("capability bucket {capability} membership of tile {guid} is inconsistent")]
    CapabilityBucket {
        /// Capability name.
        capability: &'static str,
        /// Offending GUID.
        guid: TileGuid,
    },

    /// A bucket with zero members was left behind.
    #[error("empty {index} bucket {key:?} persisted")]
    EmptyBucket {
        /// Which index holds the bucket.
        index: &'static str,
        /// Bucket key, formatted.
        key: String,
    },

    /// A surface key without registered tiles, or a surface with tiles but no key.
    #[error("{surface} key does not match its tile ownership")]
    SurfaceKey {
        /// Offending surface.
        surface: SurfaceId,
    },

    /// Locked-set membership does not match the surface's locked tiles.
    #[error("{surface} locked-set membership is inconsistent")]
    LockedSet {
        /// Offending surface.
        surface: SurfaceId,
    },
}

/// Aggregate error for registry operations.
///
/// `From<T>` conversions exist for each family so callers can use `?` and
/// still return a single expressive type.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Registration failed.
    #[error(transparent)]
    Register(#[from] RegisterError),

    /// Unregistration failed.
    #[error(transparent)]
    Unregister(#[from] UnregisterError),

    /// A clone request was refused or failed.
    #[error(transparent)]
    Clone(#[from] CloneError),

    /// The world refused to place a tile.
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An index invariant is broken.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}
