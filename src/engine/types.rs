//! Core Registry Types and Identifiers
//!
//! This module defines the **fundamental identifiers and keys** shared by every
//! part of the registry: surfaces, grid positions, tile GUIDs, exact-type keys,
//! capability keys and tag normalisation.
//!
//! ## Design Philosophy
//!
//! The registry is organised around:
//!
//! - **Small copyable identifiers** (`SurfaceId`, `GridPosition`, `TileGuid`)
//! - **Explicit keys** instead of runtime introspection (`TypeKey`,
//!   `CapabilityKey`)
//! - **Opaque tags**: the registry only trims and compares them
//!
//! ## Capabilities
//!
//! A capability is any trait a tile implements that consumers want to look up
//! by. Tiles *declare* the capabilities they implement by returning
//! [`CapabilityKey::of::<dyn Trait>()`](CapabilityKey::of) values; the registry
//! never inspects a tile's vtable.
//!
//! ## Sentinels
//!
//! [`GridPosition::IMPOSSIBLE`] is the sentinel "no position" value. Passing it
//! to unregistration is a caller-contract violation.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;


/// Scheduling tick counter.
pub type Tick = u64;

/// Stable integer handle identifying a grid surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Integer cell coordinate on a surface.
///
/// ## Notes
/// `z` is carried because layered grids address cells in three dimensions;
/// flat grids leave it at zero.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Layer.
    pub z: i32,
}

impl GridPosition {
    /// Sentinel value that never names a real cell.
    pub const IMPOSSIBLE: GridPosition = GridPosition { x: i32::MIN, y: i32::MIN, z: i32::MIN };

    /// Position on layer zero.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    /// Position on an explicit layer.
    #[inline]
    pub const fn with_layer(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns `true` for the sentinel value.
    #[inline]
    pub fn is_impossible(&self) -> bool {
        *self == Self::IMPOSSIBLE
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_impossible() {
            f.write_str("(impossible)")
        } else {
            write!(f, "({}, {}, {})", self.x, self.y, self.z)
        }
    }
}

impl From<(i32, i32)> for GridPosition {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Globally unique 128-bit tile identifier.
///
/// ## Invariants
/// - The nil GUID means "not yet assigned"; the registry assigns a fresh one
///   before indexing such a tile.
/// - A registered tile's GUID never changes while it is registered.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TileGuid(pub Uuid);

impl TileGuid {
    /// Unassigned GUID.
    pub const NIL: TileGuid = TileGuid(Uuid::nil());

    /// Generates a fresh random GUID.
    #[inline]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `true` if no GUID has been assigned.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Builds a GUID from its raw 128-bit value.
    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for TileGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Key of an exact concrete tile type.
///
/// Equality and hashing use the [`TypeId`] only; the name is kept for logs and
/// filter UIs.

#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for concrete type `T`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: type_name::<T>() }
    }

    /// Underlying type identifier.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Key of a capability (an implemented trait) used as a secondary index.
///
/// ## Usage
/// ```
/// use tile_registry::CapabilityKey;
///
/// trait Damageable {}
///
/// let key = CapabilityKey::of::<dyn Damageable>();
/// assert_eq!(key, CapabilityKey::of::<dyn Damageable>());
/// ```

#[derive(Clone, Copy, Debug)]
pub struct CapabilityKey {
    id: TypeId,
    name: &'static str,
}

impl CapabilityKey {
    /// Key for capability `C`, typically a `dyn Trait`.
    #[inline]
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self { id: TypeId::of::<C>(), name: type_name::<C>() }
    }

    /// Underlying type identifier.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified capability name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapabilityKey {}

impl Hash for CapabilityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(short_type_name(self.name.trim_start_matches("dyn ")))
    }
}

fn short_type_name(name: &'static str) -> &'static str {
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(i) => &name[i + 2..],
        None => name,
    }
}

/// Trims a tag; returns `None` for tags that are empty after trimming.
#[inline]
pub fn normalize_tag(tag: &str) -> Option<&str> {
    let trimmed = tag.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Normalises a tile's raw tag list: trimmed, non-empty, first occurrence wins.
pub fn normalize_tags<'a, I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if let Some(tag) = normalize_tag(tag) {
            if !out.iter().any(|t| t == tag) {
                out.push(tag.to_owned());
            }
        }
    }
    out
}
