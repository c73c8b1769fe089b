//! Module Plugins and the Removal Join
//!
//! A [`Module`] interprets part of a node's data (attributes, classes,
//! listeners, refs) and keeps the backend node in sync with it. Every
//! callback has a default, so a module implements only the phases it cares
//! about.
//!
//! Removal is asynchronous from the reconciler's point of view: a module may
//! hold on to a leaving node (an exit transition, say) and release it later.
//! The backend removal waits for every observer through a [`RemovalJoin`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::vnode::VNode;
use crate::error::Result;

/// Lifecycle callbacks of a module plugin.
pub trait Module<N> {
    /// A node was created.
    fn create(&self, _vnode: &VNode<N>) -> Result<()> {
        Ok(())
    }

    /// A kept-alive component was re-inserted.
    fn activate(&self, _vnode: &VNode<N>) -> Result<()> {
        Ok(())
    }

    /// A node was patched in place. Called on every patch; detecting
    /// whether the module's data changed is up to the module.
    fn update(&self, _old: &VNode<N>, _new: &VNode<N>) -> Result<()> {
        Ok(())
    }

    /// A node is leaving. Call `done` once the module lets go of it.
    fn remove(&self, _vnode: &VNode<N>, done: RemovalJoin) {
        done.done();
    }

    /// A node is being torn down.
    fn destroy(&self, _vnode: &VNode<N>) -> Result<()> {
        Ok(())
    }
}

struct JoinInner {
    remaining: Cell<usize>,
    on_zero: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// Counted completion barrier for a node removal.
///
/// Starts at the number of pending observers; each calls [`done`](Self::done)
/// once. The removal runs when the count reaches zero. A component shares
/// the join of its placeholder with its own root, adding that root's
/// observers with [`add`](Self::add).
#[derive(Clone)]
pub struct RemovalJoin(Rc<JoinInner>);

impl RemovalJoin {
    pub fn new(observers: usize, on_zero: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(JoinInner {
            remaining: Cell::new(observers),
            on_zero: RefCell::new(Some(Box::new(on_zero))),
        }))
    }

    /// Register more observers.
    pub fn add(&self, observers: usize) {
        self.0.remaining.set(self.0.remaining.get() + observers);
    }

    /// One observer is finished.
    pub fn done(&self) {
        let remaining = self.0.remaining.get().saturating_sub(1);
        self.0.remaining.set(remaining);
        if remaining == 0 {
            let on_zero = self.0.on_zero.borrow_mut().take();
            if let Some(on_zero) = on_zero {
                on_zero();
            }
        }
    }

    /// Observers still pending.
    pub fn remaining(&self) -> usize {
        self.0.remaining.get()
    }
}

impl fmt::Debug for RemovalJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovalJoin")
            .field("remaining", &self.remaining())
            .finish()
    }
}
