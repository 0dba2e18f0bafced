//! # Pools
//!
//! Free-list pools for the containers and records the registry churns on every
//! registration, removal and drain: per-surface position maps, tile buckets,
//! clone requests and deferred callback entries.
//!
//! ## Design
//! - A [`Pool`] is owned by the registry instance; there is no shared pool.
//! - [`Pool::get`] transfers ownership of a reset value to the caller, and
//!   [`Pool::release`] takes ownership back. A released value cannot be used
//!   afterwards because it has been moved.
//! - When the free list is empty `get` allocates a fresh value. Pooling is a
//!   performance device only; behaviour is identical with an empty pool.
//! - The free list is bounded by a retain limit so a burst does not pin memory
//!   forever.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};


/// Values that can be recycled by a [`Pool`].
pub trait Poolable {
    /// Creates an empty value with room for `capacity` elements.
    fn with_capacity(capacity: usize) -> Self;

    /// Returns the value to its empty state.
    fn reset(&mut self);
}

impl<K: Eq + Hash, V, S: BuildHasher + Default> Poolable for HashMap<K, V, S> {
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, S::default())
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<K: Eq + Hash, S: BuildHasher + Default> Poolable for HashSet<K, S> {
    fn with_capacity(capacity: usize) -> Self {
        HashSet::with_capacity_and_hasher(capacity, S::default())
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Poolable for Vec<T> {
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Poolable for VecDeque<T> {
    fn with_capacity(capacity: usize) -> Self {
        VecDeque::with_capacity(capacity)
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Counters describing how a pool has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// `get` calls served from the free list.
    pub hits: u64,
    /// `get` calls that allocated.
    pub misses: u64,
    /// Values currently held on the free list.
    pub free: usize,
}

/// A bounded free list of reusable values.
pub struct Pool<T: Poolable> {
    free: Vec<T>,
    initial_capacity: usize,
    retain_limit: usize,
    hits: u64,
    misses: u64,
}

impl<T: Poolable> Pool<T> {
    /// Creates a pool whose fresh values reserve `initial_capacity` elements
    /// and which keeps at most `retain_limit` released values.
    pub fn new(initial_capacity: usize, retain_limit: usize) -> Self {
        Self {
            free: Vec::new(),
            initial_capacity,
            retain_limit,
            hits: 0,
            misses: 0,
        }
    }

    /// Takes an empty value, reusing a released one when available.
    pub fn get(&mut self) -> T {
        match self.free.pop() {
            Some(value) => {
                self.hits += 1;
                value
            }
            None => {
                self.misses += 1;
                T::with_capacity(self.initial_capacity)
            }
        }
    }

    /// Resets `value` and keeps it for reuse.
    pub fn release(&mut self, mut value: T) {
        value.reset();
        if self.free.len() < self.retain_limit {
            self.free.push(value);
        }
    }

    /// Releases every value yielded by `values`.
    pub fn release_all<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.release(value);
        }
    }

    /// Changes sizing for values allocated from now on. Retained values are
    /// dropped so the new capacity applies uniformly.
    pub fn resize(&mut self, initial_capacity: usize, retain_limit: usize) {
        self.initial_capacity = initial_capacity;
        self.retain_limit = retain_limit;
        self.free.clear();
    }

    /// Number of retained values.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats { hits: self.hits, misses: self.misses, free: self.free.len() }
    }
}
