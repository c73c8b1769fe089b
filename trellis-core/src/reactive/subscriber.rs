//! Subscribers
//!
//! A Subscriber is any computation that depends on reactive values: a lazy
//! computed value, a user watcher or effect, or a view's render function.
//!
//! # How Evaluation Works
//!
//! 1. The subscriber pushes itself on the context stack and stages an empty
//!    dependency set.
//!
//! 2. The computation runs. Every [`Dep`] it reads calls back into
//!    [`Subscriber::add_dep`], which records the dependency in the staged set
//!    (at most once per pass) and registers a listener slot unless the
//!    previous pass already holds one.
//!
//! 3. The context is popped and the staged set is committed. Dependencies of
//!    the previous pass that were not read again are unsubscribed.
//!
//! Subscribers do not own each other and dependencies only hold weak
//! references, so dropping every handle to a subscriber stops it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::{untracked, ReactiveContext};
use super::dep::{Dep, DepId};
use crate::error::{self, Phase, Result};
use crate::scheduler;

/// Unique identifier for a subscriber.
///
/// IDs increase with creation order. The scheduler runs queued subscribers
/// in ascending ID order, which puts parents before the children they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a subscriber is evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// A view's render function.
    Render,
    /// A user watcher or effect.
    User,
    /// A lazy computed value.
    Computed,
}

/// Construction options.
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub kind: SubscriberKind,
    /// Only mark dirty on change; the owner re-evaluates on read.
    pub lazy: bool,
    /// Re-evaluate inline on change instead of queueing.
    pub sync: bool,
    /// Run after every non-post subscriber in a flush.
    pub post: bool,
    /// Ignore enqueues triggered by the subscriber's own evaluation.
    pub no_recurse: bool,
    /// Name used in diagnostics.
    pub label: Option<String>,
}

impl SubscriberOptions {
    fn of(kind: SubscriberKind) -> Self {
        Self {
            kind,
            lazy: false,
            sync: false,
            post: false,
            no_recurse: false,
            label: None,
        }
    }

    /// Options for a user watcher or effect.
    pub fn user() -> Self {
        Self::of(SubscriberKind::User)
    }

    /// Options for a render subscriber.
    pub fn render() -> Self {
        Self::of(SubscriberKind::Render)
    }

    /// Options for a computed value. Computed subscribers are always lazy.
    pub fn computed() -> Self {
        Self {
            lazy: true,
            ..Self::of(SubscriberKind::Computed)
        }
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn post(mut self, post: bool) -> Self {
        self.post = post;
        self
    }

    pub fn no_recurse(mut self, no_recurse: bool) -> Self {
        self.no_recurse = no_recurse;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A registered listener: the dependency and the slot we occupy in it.
struct DepLink {
    dep: Dep,
    slot: usize,
}

type Computation = Box<dyn FnMut() -> Result<()>>;

struct SubscriberCore {
    id: SubscriberId,
    options: SubscriberOptions,
    getter: RefCell<Computation>,
    callback: RefCell<Option<Computation>>,
    before: RefCell<Option<Rc<dyn Fn()>>>,
    after: RefCell<Option<Rc<dyn Fn()>>>,
    deps: RefCell<IndexMap<DepId, DepLink>>,
    new_deps: RefCell<IndexMap<DepId, DepLink>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

/// Handle to a reactive computation.
///
/// Cloning the handle shares the computation.
#[derive(Clone)]
pub struct Subscriber(Rc<SubscriberCore>);

/// Non-owning handle held by dependencies.
#[derive(Clone)]
pub(crate) struct WeakSubscriber(Weak<SubscriberCore>);

impl WeakSubscriber {
    pub(crate) fn upgrade(&self) -> Option<Subscriber> {
        self.0.upgrade().map(Subscriber)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Clears the running flag even if the computation panics.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Subscriber {
    /// Create a subscriber around a computation.
    ///
    /// Nothing runs yet: call [`evaluate`](Self::evaluate) to establish the
    /// first set of dependencies.
    pub fn new<F>(options: SubscriberOptions, getter: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        let dirty = options.lazy;
        Self(Rc::new(SubscriberCore {
            id: SubscriberId::new(),
            options,
            getter: RefCell::new(Box::new(getter)),
            callback: RefCell::new(None),
            before: RefCell::new(None),
            after: RefCell::new(None),
            deps: RefCell::new(IndexMap::new()),
            new_deps: RefCell::new(IndexMap::new()),
            active: Cell::new(true),
            dirty: Cell::new(dirty),
            running: Cell::new(false),
            run_count: Cell::new(0),
        }))
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    pub fn options(&self) -> &SubscriberOptions {
        &self.0.options
    }

    pub fn kind(&self) -> SubscriberKind {
        self.0.options.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.0.options.label.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Whether a lazy subscriber has to re-evaluate before its value is read.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_running(&self) -> bool {
        self.0.running.get()
    }

    /// Number of completed evaluations.
    pub fn run_count(&self) -> usize {
        self.0.run_count.get()
    }

    /// Number of dependencies read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    /// The dependencies read during the last evaluation.
    pub fn dependencies(&self) -> Vec<Dep> {
        self.0
            .deps
            .borrow()
            .values()
            .map(|link| link.dep.clone())
            .collect()
    }

    /// Set the change callback.
    ///
    /// It runs after every successful evaluation with tracking disabled.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        *self.0.callback.borrow_mut() = Some(Box::new(callback));
    }

    /// Set the hook the scheduler calls right before a queued evaluation.
    pub fn set_before(&self, before: impl Fn() + 'static) {
        *self.0.before.borrow_mut() = Some(Rc::new(before));
    }

    /// Set the hook the scheduler calls after the flush that evaluated us.
    pub fn set_after(&self, after: impl Fn() + 'static) {
        *self.0.after.borrow_mut() = Some(Rc::new(after));
    }

    pub(crate) fn run_before(&self) {
        let before = self.0.before.borrow().clone();
        if let Some(before) = before {
            before();
        }
    }

    pub(crate) fn run_after(&self) {
        let after = self.0.after.borrow().clone();
        if let Some(after) = after {
            after();
        }
    }

    pub(crate) fn has_after(&self) -> bool {
        self.0.after.borrow().is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakSubscriber {
        WeakSubscriber(Rc::downgrade(&self.0))
    }

    /// Where a failure of this subscriber's computation is reported.
    fn phase(&self) -> Phase {
        match self.0.options.kind {
            SubscriberKind::Render => Phase::Render,
            SubscriberKind::Computed => Phase::Computed,
            SubscriberKind::User if self.0.callback.borrow().is_some() => Phase::Watcher,
            SubscriberKind::User => Phase::Effect,
        }
    }

    /// Record a dependency read during the current pass.
    pub fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let mut new_deps = self.0.new_deps.borrow_mut();
        if new_deps.contains_key(&id) {
            return;
        }

        let link = match self.0.deps.borrow_mut().swap_remove(&id) {
            Some(link) => link,
            None => DepLink {
                dep: dep.clone(),
                slot: dep.add_listener(self.downgrade()),
            },
        };
        new_deps.insert(id, link);
    }

    /// Swap the staged dependency set in, unsubscribing whatever was not read.
    fn commit_deps(&self) {
        let staged = std::mem::take(&mut *self.0.new_deps.borrow_mut());
        let stale = std::mem::replace(&mut *self.0.deps.borrow_mut(), staged);
        for link in stale.into_values() {
            link.dep.remove_listener(link.slot);
        }
    }

    /// Run the computation inside a tracking context.
    fn get(&self) -> Result<()> {
        let result = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));
            let mut getter = self.0.getter.borrow_mut();
            getter()
        };
        if self.is_active() {
            self.commit_deps();
        } else {
            // Torn down mid-evaluation: drop what was collected.
            for link in std::mem::take(&mut *self.0.new_deps.borrow_mut()).into_values() {
                link.dep.remove_listener(link.slot);
            }
        }
        result
    }

    /// Re-run the computation now.
    ///
    /// Failures are reported, never returned. An inactive subscriber does
    /// nothing. Re-entering a subscriber that is already running is refused.
    pub fn evaluate(&self) {
        if !self.is_active() {
            return;
        }
        if self.0.running.replace(true) {
            tracing::warn!(
                subscriber = self.0.id.0,
                label = self.label(),
                "refusing re-entrant evaluation"
            );
            return;
        }
        let _running = RunningGuard(&self.0.running);

        self.0.dirty.set(false);
        let result = self.get();
        self.0.run_count.set(self.0.run_count.get() + 1);

        if let Err(err) = result {
            error::report(&err, Some(self.id()), self.phase());
            return;
        }

        let mut callback = self.0.callback.borrow_mut();
        if let Some(callback) = callback.as_mut() {
            if let Err(err) = untracked(|| callback()) {
                error::report(&err, Some(self.id()), Phase::WatcherCallback);
            }
        }
    }

    /// A dependency changed.
    pub fn update(&self) {
        if self.0.options.lazy {
            self.0.dirty.set(true);
        } else if self.0.options.sync {
            self.evaluate();
        } else {
            scheduler::enqueue(self.clone());
        }
    }

    /// Make the subscriber that is currently evaluating depend on everything
    /// this one read. Used by computed values.
    pub fn depend(&self) {
        for dep in self.dependencies() {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and stop reacting. Idempotent.
    pub fn teardown(&self) {
        if !self.0.active.replace(false) {
            return;
        }
        let links = std::mem::take(&mut *self.0.deps.borrow_mut());
        for link in links.into_values() {
            link.dep.remove_listener(link.slot);
        }
        tracing::trace!(subscriber = self.0.id.0, "teardown");
    }

    pub fn ptr_eq(&self, other: &Subscriber) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.0.id)
            .field("kind", &self.0.options.kind)
            .field("label", &self.0.options.label)
            .field("active", &self.0.active.get())
            .field("deps", &self.dependency_count())
            .finish()
    }
}
