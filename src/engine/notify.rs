//! # Change Notification
//!
//! Subscribers learn about registry mutations through three separate
//! channels:
//!
//! | Channel | Fires when | Typical consumer |
//! |---------|-----------|------------------|
//! | changes | every add, delete, modify | list views |
//! | vocabulary | a tag or type bucket is created or removed | filter menus |
//! | rescan | a full rescan completes | anything caching registry state |
//!
//! The vocabulary channel is rare and structural; the change channel is
//! frequent. They are kept apart so a list refresh never rebuilds filters and
//! a filter UI never goes stale.
//!
//! ## Suppression
//! While a rescan is running the registry does not emit change or vocabulary
//! events. Exactly one [`RescanSummary`] is delivered when it completes.
//!
//! ## Reentrancy
//! Handlers receive the event by reference and cannot reach the registry
//! through it. A handler that wants to mutate the registry must defer the work.

use slab::Slab;

use crate::engine::types::{GridPosition, SurfaceId};


/// Kind of change carried by a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A tile was registered on a surface that already had tiles.
    Added,
    /// A tile was registered on a surface that had none.
    AddedToEmptySurface,
    /// A tile was unregistered.
    Deleted,
    /// A registered tile changed in place (including moves).
    Modified,
    /// A registered tile's tags were re-indexed.
    TagsModified,
}

/// Payload of the change channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Part of a grouped (bulk) operation; consumers may coalesce refreshes.
    pub grouped: bool,
    /// Affected cell.
    pub position: GridPosition,
    /// Affected surface, absent on some delete paths.
    pub surface: Option<SurfaceId>,
}

/// Which vocabulary changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VocabularyKind {
    /// Tag vocabulary.
    Tag,
    /// Exact-type vocabulary.
    Type,
}

/// Direction of a vocabulary change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VocabularyChange {
    /// A first member created the bucket.
    Created,
    /// The last member left and the bucket was deleted.
    Removed,
}

/// Payload of the vocabulary channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VocabularyEvent {
    /// Tag or type.
    pub kind: VocabularyKind,
    /// Tag text or fully qualified type name.
    pub key: String,
    /// Created or removed.
    pub change: VocabularyChange,
}

/// Payload of the rescan channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RescanSummary {
    /// Surfaces that own at least one registered tile.
    pub surfaces: usize,
    /// Registered tiles.
    pub tiles: usize,
    /// Surfaces in the locked set.
    pub locked_surfaces: usize,
}

/// Handle returned by the `subscribe_*` methods.
///
/// Slab keys are reused after removal; the generation makes a stale handle
/// miss instead of removing a later subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    channel: Channel,
    key: usize,
    generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Channel {
    Changes,
    Vocabulary,
    Rescan,
}

type ChangeHandler = Box<dyn FnMut(&ChangeEvent)>;
type VocabularyHandler = Box<dyn FnMut(&VocabularyEvent)>;
type RescanHandler = Box<dyn FnMut(&RescanSummary)>;

/// A handler stored with the generation it was subscribed under.
struct Subscriber<H> {
    generation: u64,
    handler: H,
}

/// Subscriber lists for the three channels.
#[derive(Default)]
pub struct Notifier {
    changes: Slab<Subscriber<ChangeHandler>>,
    vocabulary: Slab<Subscriber<VocabularyHandler>>,
    rescan: Slab<Subscriber<RescanHandler>>,
    next_generation: u64,
}

impl Notifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the change channel.
    pub fn subscribe_changes(&mut self, handler: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        let generation = self.bump_generation();
        let key = self.changes.insert(Subscriber { generation, handler: Box::new(handler) });
        SubscriptionId { channel: Channel::Changes, key, generation }
    }

    /// Subscribes to the vocabulary channel.
    pub fn subscribe_vocabulary(
        &mut self,
        handler: impl FnMut(&VocabularyEvent) + 'static,
    ) -> SubscriptionId {
        let generation = self.bump_generation();
        let key = self.vocabulary.insert(Subscriber { generation, handler: Box::new(handler) });
        SubscriptionId { channel: Channel::Vocabulary, key, generation }
    }

    /// Subscribes to the rescan channel.
    pub fn subscribe_rescan(&mut self, handler: impl FnMut(&RescanSummary) + 'static) -> SubscriptionId {
        let generation = self.bump_generation();
        let key = self.rescan.insert(Subscriber { generation, handler: Box::new(handler) });
        SubscriptionId { channel: Channel::Rescan, key, generation }
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match id.channel {
            Channel::Changes => remove_current(&mut self.changes, id),
            Channel::Vocabulary => remove_current(&mut self.vocabulary, id),
            Channel::Rescan => remove_current(&mut self.rescan, id),
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Total number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.changes.len() + self.vocabulary.len() + self.rescan.len()
    }

    pub(crate) fn emit_change(&mut self, event: ChangeEvent) {
        tracing::trace!(?event, "registry change");
        for (_, subscriber) in self.changes.iter_mut() {
            (subscriber.handler)(&event);
        }
    }

    pub(crate) fn emit_vocabulary(&mut self, event: VocabularyEvent) {
        tracing::debug!(kind = ?event.kind, key = %event.key, change = ?event.change, "vocabulary changed");
        for (_, subscriber) in self.vocabulary.iter_mut() {
            (subscriber.handler)(&event);
        }
    }

    pub(crate) fn emit_rescan(&mut self, summary: RescanSummary) {
        for (_, subscriber) in self.rescan.iter_mut() {
            (subscriber.handler)(&summary);
        }
    }
}

fn remove_current<H>(subscribers: &mut Slab<Subscriber<H>>, id: SubscriptionId) -> bool {
    if !subscribers.get(id.key).is_some_and(|s| s.generation == id.generation) {
        return false;
    }
    subscribers.remove(id.key);
    true
}
