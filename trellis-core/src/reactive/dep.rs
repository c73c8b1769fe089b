//! Dependencies
//!
//! A [`Dep`] is the notification hub attached to one piece of observable
//! state. Subscribers that read the state while evaluating register as
//! listeners; writing the state calls [`Dep::notify`].
//!
//! # Listener storage
//!
//! Listeners live in an index-stable slot array. Each subscriber remembers
//! the slot it occupies, so unsubscribing is an O(1) tombstone write rather
//! than a search-and-shift. Tombstoned slots are not reused right away: the
//! dependency is put on a thread-local list and [`cleanup_deps`] turns its
//! tombstones into free slots once per scheduler flush. Notify storms that
//! subscribe and unsubscribe the same listeners many times within one flush
//! therefore never compact the array inline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, WeakSubscriber};
use crate::config;

/// Unique, monotonically increasing identifier for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

enum Slot {
    Live(WeakSubscriber),
    /// Unsubscribed since the last compaction.
    Tombstone,
    /// Reclaimed, ready for reuse.
    Free,
}

struct DepInner {
    id: DepId,
    slots: RefCell<Vec<Slot>>,
    free: RefCell<Vec<usize>>,
    /// Already queued for compaction.
    pending: Cell<bool>,
}

/// Notification hub for one observable cell.
///
/// Cloning a `Dep` clones the handle, not the hub.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

thread_local! {
    static PENDING_CLEANUP: RefCell<Vec<Dep>> = const { RefCell::new(Vec::new()) };
}

impl Dep {
    /// Create a new dependency with no listeners.
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            id: DepId::next(),
            slots: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
            pending: Cell::new(false),
        }))
    }

    /// Get the dependency's unique ID.
    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Register the current subscriber, if any, as a listener.
    ///
    /// Deduplication within one evaluation pass is done by the subscriber.
    pub fn depend(&self) {
        if let Some(subscriber) = ReactiveContext::current() {
            subscriber.add_dep(self);
        }
    }

    /// Notify every live listener.
    ///
    /// The listener list is snapshotted first, so listeners that subscribe,
    /// unsubscribe or notify again while we iterate do not disturb this pass.
    pub fn notify(&self) {
        let mut listeners: SmallVec<[Subscriber; 8]> = self
            .0
            .slots
            .borrow()
            .iter()
            .filter_map(|slot| match slot {
                Slot::Live(weak) => weak.upgrade(),
                _ => None,
            })
            .collect();

        // Batched flushes sort the queue; synchronous ones need the order now.
        if !config::current().async_flush {
            listeners.sort_by_key(Subscriber::id);
        }

        tracing::trace!(dep = self.0.id.0, listeners = listeners.len(), "notify");

        for listener in listeners {
            listener.update();
        }
    }

    /// Store a listener and return its slot.
    pub(crate) fn add_listener(&self, listener: WeakSubscriber) -> usize {
        let mut slots = self.0.slots.borrow_mut();
        match self.0.free.borrow_mut().pop() {
            Some(index) => {
                slots[index] = Slot::Live(listener);
                index
            }
            None => {
                slots.push(Slot::Live(listener));
                slots.len() - 1
            }
        }
    }

    /// Tombstone a listener slot and schedule the dependency for compaction.
    pub fn remove_listener(&self, slot: usize) {
        if let Some(entry) = self.0.slots.borrow_mut().get_mut(slot) {
            if matches!(entry, Slot::Live(_)) {
                *entry = Slot::Tombstone;
            }
        }

        if !self.0.pending.replace(true) {
            PENDING_CLEANUP.with(|pending| pending.borrow_mut().push(self.clone()));
        }
    }

    /// Number of listeners that are still alive.
    pub fn listener_count(&self) -> usize {
        self.0
            .slots
            .borrow()
            .iter()
            .filter(|slot| matches!(slot, Slot::Live(weak) if weak.is_alive()))
            .count()
    }

    /// Number of slots, including tombstoned and free ones.
    pub fn slot_count(&self) -> usize {
        self.0.slots.borrow().len()
    }

    fn compact(&self) {
        let mut slots = self.0.slots.borrow_mut();
        let mut free = self.0.free.borrow_mut();

        for (index, slot) in slots.iter_mut().enumerate() {
            let reclaim = match slot {
                Slot::Tombstone => true,
                Slot::Live(weak) => !weak.is_alive(),
                Slot::Free => false,
            };
            if reclaim {
                *slot = Slot::Free;
                free.push(index);
            }
        }

        while matches!(slots.last(), Some(Slot::Free)) {
            slots.pop();
        }

        let len = slots.len();
        free.retain(|&index| index < len);
        // Pop hands out the lowest index first.
        free.sort_unstable_by(|a, b| b.cmp(a));
        free.dedup();

        self.0.pending.set(false);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Compact every dependency that had listeners removed since the last call.
///
/// The scheduler runs this once at the end of each flush.
pub fn cleanup_deps() {
    let pending = PENDING_CLEANUP.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
    if pending.is_empty() {
        return;
    }

    tracing::debug!(deps = pending.len(), "compacting listener slots");
    for dep in pending {
        dep.compact();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, Config};
    use crate::reactive::{SubscriberOptions, context::ReactiveContext};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tracked_by(subscriber: &Subscriber, dep: &Dep) {
        let _ctx = ReactiveContext::enter(Some(subscriber.clone()));
        dep.depend();
    }

    #[test]
    fn depend_outside_a_subscriber_is_a_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.listener_count(), 0);
    }

    #[test]
    fn removal_tombstones_until_cleanup() {
        let dep = Dep::new();
        let a = Subscriber::new(SubscriberOptions::user().sync(true), || Ok(()));
        let b = Subscriber::new(SubscriberOptions::user().sync(true), || Ok(()));

        let slot_a = dep.add_listener(a.downgrade());
        let _slot_b = dep.add_listener(b.downgrade());
        assert_eq!(dep.listener_count(), 2);

        dep.remove_listener(slot_a);
        assert_eq!(dep.listener_count(), 1);
        // Still occupying its slot until compaction.
        assert_eq!(dep.slot_count(), 2);

        cleanup_deps();
        assert_eq!(dep.slot_count(), 2);

        // The reclaimed slot is reused.
        let c = Subscriber::new(SubscriberOptions::user().sync(true), || Ok(()));
        assert_eq!(dep.add_listener(c.downgrade()), slot_a);
        assert_eq!(dep.slot_count(), 2);
    }

    #[test]
    fn trailing_free_slots_are_truncated() {
        let dep = Dep::new();
        let a = Subscriber::new(SubscriberOptions::user(), || Ok(()));
        let slot = dep.add_listener(a.downgrade());

        dep.remove_listener(slot);
        cleanup_deps();

        assert_eq!(dep.slot_count(), 0);
    }

    #[test]
    fn sync_notify_runs_listeners_in_id_order() {
        config::with(
            Config {
                async_flush: false,
                ..config::current()
            },
            || {
                let order = Rc::new(RefCell::new(Vec::new()));
                let dep = Dep::new();

                let make = |name: &'static str| {
                    let order = order.clone();
                    Subscriber::new(SubscriberOptions::user().sync(true), move || {
                        order.borrow_mut().push(name);
                        Ok(())
                    })
                };

                let first = make("first");
                let second = make("second");

                // Register out of creation order.
                tracked_by(&second, &dep);
                tracked_by(&first, &dep);

                dep.notify();
                assert_eq!(*order.borrow(), vec!["first", "second"]);
            },
        );
    }
}
