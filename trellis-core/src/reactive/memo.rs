//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when one of the
//! values it read has changed.
//!
//! # How Memos Work
//!
//! 1. A memo wraps a lazy [`Subscriber`]. Creating it runs nothing.
//!
//! 2. When a dependency changes, the subscriber is only marked dirty. No
//!    work is queued.
//!
//! 3. On the next read, a dirty memo re-runs its computation and caches the
//!    result. Clean memos return the cache.
//!
//! 4. Every read made inside another subscriber also makes that subscriber
//!    depend on everything the memo read, so a change to one of the memo's
//!    inputs re-runs the reader, which then pulls the fresh value.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId, SubscriberOptions};
use crate::error::Result;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,
    /// An input changed since the last computation.
    Dirty,
}

/// A cached derived value.
pub struct Memo<T> {
    subscriber: Subscriber,
    value: Rc<RefCell<Option<T>>>,
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a memo from an infallible computation.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::try_new(move || Ok(compute()))
    }

    /// Create a memo from a fallible computation.
    ///
    /// A failure is reported and the previously cached value is kept.
    pub fn try_new<F>(mut compute: F) -> Self
    where
        F: FnMut() -> Result<T> + 'static,
    {
        let value = Rc::new(RefCell::new(None));
        let slot = value.clone();
        let subscriber = Subscriber::new(SubscriberOptions::computed(), move || {
            let next = compute()?;
            *slot.borrow_mut() = Some(next);
            Ok(())
        });
        Self { subscriber, value }
    }

    /// Get the current value, recomputing if an input changed.
    ///
    /// Returns `None` only when no computation has succeeded yet.
    pub fn get(&self) -> Option<T> {
        if self.subscriber.is_dirty() {
            self.subscriber.evaluate();
        }
        if ReactiveContext::is_active() {
            self.subscriber.depend();
        }
        self.value.borrow().clone()
    }

    /// Get the cached value without recomputing or tracking.
    pub fn peek(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

impl<T> Memo<T> {
    /// Get the ID of the memo's subscriber.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        if self.subscriber.is_dirty() {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    /// Force a recomputation on the next read.
    pub fn mark_dirty(&self) {
        self.subscriber.update();
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Number of values the last computation read.
    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }

    /// Stop tracking inputs. The cached value stays readable.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: Debug> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("subscriber", &self.subscriber.id())
            .field("state", &self.state())
            .field("value", &*self.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reactive::Signal;
    use std::cell::Cell;

    #[test]
    fn memo_computes_on_first_access() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            42
        });

        assert_eq!(runs.get(), 0);
        assert!(!memo.has_value());

        assert_eq!(memo.get(), Some(42));
        assert_eq!(runs.get(), 1);
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            1
        });

        memo.get();
        memo.get();
        memo.get();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn memo_recomputes_after_input_changes() {
        let input = Signal::new(2);
        let reader = input.clone();
        let doubled = Memo::new(move || reader.get() * 2);

        assert_eq!(doubled.get(), Some(4));

        input.set(5);
        assert_eq!(doubled.state(), MemoState::Dirty);
        assert_eq!(doubled.get(), Some(10));
    }

    #[test]
    fn readers_of_a_memo_track_its_inputs() {
        let input = Signal::new(1);
        let reader = input.clone();
        let memo = Memo::new(move || reader.get() + 100);

        let seen = Rc::new(Cell::new(0));
        let (m, out) = (memo.clone(), seen.clone());
        let sub = Subscriber::new(SubscriberOptions::user().sync(true), move || {
            out.set(m.get().unwrap_or_default());
            Ok(())
        });
        sub.evaluate();
        assert_eq!(seen.get(), 101);

        input.set(2);
        assert_eq!(seen.get(), 102);
    }

    #[test]
    fn failed_computation_keeps_previous_value() {
        let input = Signal::new(1);
        let reader = input.clone();
        let memo = Memo::try_new(move || {
            let v = reader.get();
            if v < 0 {
                Err(Error::msg("negative"))
            } else {
                Ok(v)
            }
        });
        assert_eq!(memo.get(), Some(1));

        input.set(-1);
        assert_eq!(memo.get(), Some(1));
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 7);
        let memo2 = memo1.clone();

        memo1.get();
        assert!(memo2.has_value());
        assert_eq!(memo1.subscriber_id(), memo2.subscriber_id());
    }
}
