//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a dependency is read,
//! the current subscriber registers itself as a listener.
//!
//! # Implementation
//!
//! We use a thread-local stack of entries. Evaluating a subscriber pushes
//! it; the returned guard pops it again when dropped, so a computed value
//! read inside a render function, or a panic inside a computation, always
//! restores the outer entry.
//!
//! An entry may also be empty. Entering an empty entry suspends tracking
//! for the duration of the guard (see [`untracked`]).

use std::cell::RefCell;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Subscriber>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context.
    ///
    /// While this context is active, dependencies that are read register
    /// `subscriber` as a listener. `None` disables tracking.
    pub fn enter(subscriber: Option<Subscriber>) -> Self {
        let subscriber_id = subscriber.as_ref().map(Subscriber::id);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(subscriber));
        Self { subscriber_id }
    }

    /// Check if a subscriber is currently tracking reads.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The subscriber currently tracking reads, if any.
    pub fn current() -> Option<Subscriber> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Id of the subscriber currently tracking reads, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.as_ref().map(Subscriber::id))
        })
    }

    /// Number of entries on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Popping the wrong entry means guards were dropped out of order.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Subscriber::id),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` without tracking any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}
