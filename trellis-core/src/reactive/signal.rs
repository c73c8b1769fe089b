//! Signal Implementation
//!
//! A Signal is the basic observable cell. It holds a value and the [`Dep`]
//! that tracks which computations read it.
//!
//! # How Signals Work
//!
//! 1. Reading a signal while a subscriber is evaluating registers that
//!    subscriber as a listener of the signal's dependency.
//!
//! 2. Writing the signal notifies every listener, which either marks itself
//!    dirty, re-runs inline, or enqueues itself with the scheduler.
//!
//! # Memory Layout
//!
//! Each signal is one `Rc` allocation holding the value behind a `RefCell`
//! and its dependency. Clones share both.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::dep::{Dep, DepId};

struct SignalInner<T> {
    value: RefCell<T>,
    dep: Dep,
}

/// An observable value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T> {
    /// Create a new signal with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                dep: Dep::new(),
            }),
        }
    }

    /// Get the ID of the signal's dependency.
    pub fn id(&self) -> DepId {
        self.inner.dep.id()
    }

    /// The dependency notified on every write.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Borrow the value, registering the read with the current subscriber.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.depend();
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify every listener.
    ///
    /// Listeners are notified even when the value did not change; use
    /// [`set_if_changed`](Self::set_if_changed) to skip equal writes.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.inner.dep.notify();
    }

    /// Update the value in place and notify every listener.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.inner.value.borrow_mut());
        self.inner.dep.notify();
    }

    /// Number of live listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.listener_count()
    }
}

impl<T: Clone> Signal<T> {
    /// Get the current value, registering the read with the current
    /// subscriber.
    pub fn get(&self) -> T {
        self.inner.dep.depend();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq> Signal<T> {
    /// Set a new value, notifying only when it differs from the current one.
    ///
    /// Returns whether listeners were notified.
    pub fn set_if_changed(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.inner.dep.notify();
        true
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
