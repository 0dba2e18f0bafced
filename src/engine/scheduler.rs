//! Deferred work queues and their per-tick drains.
//!
//! This module is responsible for:
//! * holding deferred callbacks in a FIFO queue,
//! * holding delayed callbacks in a timer heap until they are due,
//! * holding clone requests in a FIFO queue,
//! * draining the callback queue under a per-tick cap.
//!
//! The clone drain needs the registry and the world, so it is driven by
//! [`TileRegistry::tick`](crate::TileRegistry::tick); this module only hands
//! out requests in order.
//!
//! ## Scheduling model
//!
//! Work is *deferred*, not concurrent. Enqueueing returns immediately; the
//! work runs on a later tick, strictly in enqueue order relative to other work
//! of the same kind. There is no cancellation primitive other than the
//! null-check: a callback whose target is gone is dropped, as is a clone
//! request whose tile or surface is gone.
//!
//! ## Failure isolation
//!
//! Each callback runs under `catch_unwind`. A panicking callback is logged with
//! its label (unless silenced) and the drain moves on to the next entry.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::engine::commands::{CloneRequest, DeferRequest, DeferredEntry};
use crate::engine::config::CapacityConfig;
use crate::engine::pool::{Pool, PoolStats};
use crate::engine::tile::WeakTileRef;
use crate::engine::types::{GridPosition, SurfaceId, Tick, TileGuid};


/// Outcome counters of one callback drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallbackReport {
    /// Callbacks invoked successfully.
    pub ran: usize,
    /// Entries dropped because their null-check target was gone.
    pub dropped: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

/// Outcome counters of one clone drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloneReport {
    /// Clones placed and registered.
    pub materialized: usize,
    /// Requests dropped because their tile or surface was gone, or the tile
    /// became locked.
    pub dropped: usize,
    /// Requests whose clone, placement or registration failed.
    pub failed: usize,
}

/// Summary of one scheduling tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick counter after this tick.
    pub tick: Tick,
    /// A pending rescan ran at the start of the tick.
    pub rescanned: bool,
    /// Delayed callbacks that became due and entered the queue.
    pub promoted: usize,
    /// Callback drain counters.
    pub callbacks: CallbackReport,
    /// Clone drain counters.
    pub clones: CloneReport,
    /// Callbacks still queued after the tick.
    pub pending_callbacks: usize,
    /// Clone requests still queued after the tick.
    pub pending_clones: usize,
}

/// A delayed entry waiting in the timer heap.
struct TimedEntry {
    due: Instant,
    seq: u64,
    entry: DeferredEntry,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queues of deferred callbacks and clone requests.
pub struct Scheduler {
    callbacks: VecDeque<DeferredEntry>,
    timers: BinaryHeap<TimedEntry>,
    clones: VecDeque<CloneRequest>,
    entry_pool: Pool<DeferredEntry>,
    clone_pool: Pool<CloneRequest>,
    next_seq: u64,
    tick: Tick,
}

impl Scheduler {
    /// Creates empty queues.
    pub fn new(capacity: &CapacityConfig) -> Self {
        Self {
            callbacks: VecDeque::with_capacity(capacity.bucket),
            timers: BinaryHeap::new(),
            clones: VecDeque::with_capacity(capacity.bucket),
            entry_pool: Pool::new(0, capacity.pool_retain),
            clone_pool: Pool::new(0, capacity.pool_retain),
            next_seq: 0,
            tick: 0,
        }
    }

    /// Applies new pool sizing. Retained entries are dropped; queued work is
    /// untouched.
    pub fn resize(&mut self, capacity: &CapacityConfig) {
        self.entry_pool.resize(0, capacity.pool_retain);
        self.clone_pool.resize(0, capacity.pool_retain);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Enqueue
    // ─────────────────────────────────────────────────────────────────────

    /// Appends a callback to the FIFO queue.
    pub fn enqueue(&mut self, request: DeferRequest) {
        let mut entry = self.entry_pool.get();
        entry.fill(request);
        self.callbacks.push_back(entry);
    }

    /// Queues a callback to run once `delay` has elapsed.
    ///
    /// Delays shorter than `threshold` skip the timer and go straight to the
    /// FIFO queue; a timer for such an interval is worse than the next tick.
    ///
    /// ## Returns
    /// `true` if the callback went straight to the FIFO queue.

    pub fn enqueue_after(&mut self, delay: Duration, threshold: Duration, request: DeferRequest) -> bool {
        if delay < threshold {
            self.enqueue(request);
            return true;
        }
        let mut entry = self.entry_pool.get();
        entry.fill(request);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.timers.push(TimedEntry { due: Instant::now() + delay, seq, entry });
        false
    }

    /// Appends a clone request to the FIFO queue.
    pub fn enqueue_clone(
        &mut self,
        tile: WeakTileRef,
        source_guid: TileGuid,
        position: GridPosition,
        surface: SurfaceId,
    ) {
        let mut request = self.clone_pool.get();
        request.tile = Some(tile);
        request.source_guid = source_guid;
        request.position = position;
        request.surface = Some(surface);
        self.clones.push_back(request);
    }

    /// Discards queued and delayed callbacks owned by `guid`.
    ///
    /// ## Returns
    /// Number of entries discarded.

    pub fn purge_owner(&mut self, guid: TileGuid) -> usize {
        let mut purged = 0;

        let before = self.callbacks.len();
        let mut kept = VecDeque::with_capacity(before);
        for entry in self.callbacks.drain(..) {
            if entry.owner == Some(guid) {
                self.entry_pool.release(entry);
            } else {
                kept.push_back(entry);
            }
        }
        purged += before - kept.len();
        self.callbacks = kept;

        if self.timers.iter().any(|t| t.entry.owner == Some(guid)) {
            let timers = std::mem::take(&mut self.timers).into_vec();
            for timed in timers {
                if timed.entry.owner == Some(guid) {
                    purged += 1;
                    self.entry_pool.release(timed.entry);
                } else {
                    self.timers.push(timed);
                }
            }
        }

        if purged > 0 {
            tracing::trace!(%guid, purged, "purged deferred work of unregistered tile");
        }
        purged
    }

    // ─────────────────────────────────────────────────────────────────────
    // Drain
    // ─────────────────────────────────────────────────────────────────────

    /// Advances the tick counter.
    pub(crate) fn advance(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    /// Moves every timer due at or before `now` into the FIFO queue, in
    /// deadline order.
    pub fn promote_due(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while self.timers.peek().is_some_and(|t| t.due <= now) {
            if let Some(timed) = self.timers.pop() {
                self.callbacks.push_back(timed.entry);
                promoted += 1;
            }
        }
        promoted
    }

    /// Runs queued callbacks in FIFO order.
    ///
    /// At most `limit` entries are taken off the queue (`None` is unbounded);
    /// dropped entries count toward the limit.

    pub fn drain_callbacks(&mut self, limit: Option<usize>) -> CallbackReport {
        let mut report = CallbackReport::default();
        let mut taken = 0usize;

        while limit.map_or(true, |l| taken < l) {
            let Some(mut entry) = self.callbacks.pop_front() else { break; };
            taken += 1;

            if !entry.target_alive() {
                tracing::trace!(label = %entry.label, "deferred callback target gone; dropped");
                report.dropped += 1;
                self.entry_pool.release(entry);
                continue;
            }

            let Some(action) = entry.action.take() else {
                self.entry_pool.release(entry);
                continue;
            };

            match catch_unwind(AssertUnwindSafe(action)) {
                Ok(()) => report.ran += 1,
                Err(payload) => {
                    report.failed += 1;
                    if !entry.silent {
                        tracing::error!(
                            label = %entry.label,
                            reason = panic_message(payload.as_ref()),
                            "deferred callback failed"
                        );
                    }
                }
            }
            self.entry_pool.release(entry);
        }
        report
    }

    /// Takes the oldest clone request.
    pub fn pop_clone(&mut self) -> Option<CloneRequest> {
        self.clones.pop_front()
    }

    /// Returns a processed clone request to the pool.
    pub fn release_clone(&mut self, request: CloneRequest) {
        self.clone_pool.release(request);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────

    /// Callbacks waiting in the FIFO queue.
    #[inline]
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Callbacks waiting for their delay to elapse.
    #[inline]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Clone requests waiting in the FIFO queue.
    #[inline]
    pub fn pending_clones(&self) -> usize {
        self.clones.len()
    }

    /// Pool counters: (callback entries, clone requests).
    pub fn pool_stats(&self) -> (PoolStats, PoolStats) {
        (self.entry_pool.stats(), self.clone_pool.stats())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
