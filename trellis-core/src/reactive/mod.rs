//! Reactive Primitives
//!
//! This module implements the dependency graph: dependencies, subscribers,
//! and the observable values built on them.
//!
//! # Concepts
//!
//! ## Dependencies and Subscribers
//!
//! A [`Dep`] is attached to each piece of observable state. A [`Subscriber`]
//! is a computation. While a subscriber evaluates, every dependency it reads
//! records it as a listener; when the state changes, the dependency notifies
//! its listeners. The relation is many-to-many and rebuilt on every run.
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state that owns one dependency.
//!
//! ## Memos
//!
//! A [`Memo`] is a lazy derived value that caches its result and recomputes
//! on the first read after an input changed.
//!
//! ## Effects and Watchers
//!
//! An [`Effect`] re-runs a side effect when its inputs change. A [`Watch`]
//! re-runs a source expression and calls back with the new and old values.
//!
//! # Implementation Notes
//!
//! The subscriber currently evaluating is found through a thread-local
//! context stack. Nothing in this module is `Send`: the graph is owned by
//! the thread that built it.

mod context;
mod dep;
mod effect;
mod memo;
mod signal;
mod subscriber;
mod watch;

pub use context::{untracked, ReactiveContext};
pub use dep::{cleanup_deps, Dep, DepId};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use signal::Signal;
pub use subscriber::{Subscriber, SubscriberId, SubscriberKind, SubscriberOptions};
pub use watch::{Watch, WatchOptions};
