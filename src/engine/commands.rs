//! # Deferred Work Records
//!
//! This module defines the records the scheduler queues between ticks:
//! deferred callback entries and clone requests.
//!
//! ## Purpose
//! Callers that must not act synchronously (a tile asking for a copy of itself
//! during its own startup, a UI action that must run after the current
//! mutation settles) enqueue a record and return immediately. The scheduler
//! drains the records on a later tick, in FIFO order and under a per-tick cap.
//!
//! ## Design
//! - Records are plain data describing *what* should happen, not *how*.
//! - Both record types are pooled: the queue takes them from the registry's
//!   pools and gives them back after execution, reset to empty.
//! - Targets are held weakly. A record whose target has been dropped is
//!   discarded by the drain instead of being executed.
//!
//! ## Invariants
//! - Records are executed in the order they were enqueued.
//! - A record is never executed twice; the drain takes the action out.

use std::fmt;

use crate::engine::pool::Poolable;
use crate::engine::tile::{Liveness, WeakTileRef};
use crate::engine::types::{GridPosition, SurfaceId, TileGuid};


/// Zero-argument action run by the deferred callback drain.
pub type DeferredAction = Box<dyn FnOnce()>;

/// Describes a callback to run on a later tick.
///
/// ## Example
/// ```
/// use std::rc::Rc;
/// use std::cell::Cell;
/// use tile_registry::DeferRequest;
///
/// let hits = Rc::new(Cell::new(0));
/// let counter = hits.clone();
/// let request = DeferRequest::new("bump", move || counter.set(counter.get() + 1))
///     .checked(Rc::downgrade(&hits))
///     .silent();
/// # drop(request);
/// ```

pub struct DeferRequest {
    pub(crate) target: Option<Box<dyn Liveness>>,
    pub(crate) owner: Option<TileGuid>,
    pub(crate) label: String,
    pub(crate) silent: bool,
    pub(crate) action: DeferredAction,
}

impl DeferRequest {
    /// Creates a request with a diagnostic label.
    pub fn new(label: impl Into<String>, action: impl FnOnce() + 'static) -> Self {
        Self {
            target: None,
            owner: None,
            label: label.into(),
            silent: false,
            action: Box::new(action),
        }
    }

    /// Drops the request without running it if `target` is gone by the time
    /// the drain reaches it.
    pub fn checked(mut self, target: impl Liveness + 'static) -> Self {
        self.target = Some(Box::new(target));
        self
    }

    /// Ties the request to a tile; unregistering the tile discards it.
    pub fn owned_by(mut self, guid: TileGuid) -> Self {
        self.owner = Some(guid);
        self
    }

    /// Suppresses failure logging for this request.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for DeferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferRequest")
            .field("label", &self.label)
            .field("owner", &self.owner)
            .field("checked", &self.target.is_some())
            .field("silent", &self.silent)
            .finish()
    }
}

/// A queued deferred callback.
///
/// ## Fields
/// * `target`: null-check target; consulted only when `check_target` is set.
/// * `owner`: tile whose unregistration purges this entry.
/// * `label`: diagnostic label used in failure logs.
/// * `silent`: suppresses failure logging.

#[derive(Default)]
pub struct DeferredEntry {
    pub(crate) target: Option<Box<dyn Liveness>>,
    pub(crate) action: Option<DeferredAction>,
    pub(crate) label: String,
    pub(crate) check_target: bool,
    pub(crate) silent: bool,
    pub(crate) owner: Option<TileGuid>,
}

impl DeferredEntry {
    /// Moves a request's contents into this (reset) entry.
    pub(crate) fn fill(&mut self, request: DeferRequest) {
        self.check_target = request.target.is_some();
        self.target = request.target;
        self.owner = request.owner;
        self.label.push_str(&request.label);
        self.silent = request.silent;
        self.action = Some(request.action);
    }

    /// `false` if the null-check target has been dropped.
    pub(crate) fn target_alive(&self) -> bool {
        if !self.check_target {
            return true;
        }
        self.target.as_ref().is_some_and(|t| t.is_alive())
    }
}

impl Poolable for DeferredEntry {
    fn with_capacity(_capacity: usize) -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.target = None;
        self.action = None;
        self.label.clear();
        self.check_target = false;
        self.silent = false;
        self.owner = None;
    }
}

/// A queued request to clone a tile into a cell.
///
/// ## Invariants
/// - A request whose tile or surface is gone at drain time is dropped.
/// - A failed clone never leaves a partial registration behind.

#[derive(Default)]
pub struct CloneRequest {
    pub(crate) tile: Option<WeakTileRef>,
    pub(crate) source_guid: TileGuid,
    pub(crate) position: GridPosition,
    pub(crate) surface: Option<SurfaceId>,
}

impl Poolable for CloneRequest {
    fn with_capacity(_capacity: usize) -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.tile = None;
        self.source_guid = TileGuid::NIL;
        self.position = GridPosition::default();
        self.surface = None;
    }
}
