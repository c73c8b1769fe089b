//! Node Hooks and Component Instances
//!
//! Hooks attached to a node's data let the owner of the node take part in
//! reconciliation. Component placeholders use them to create, update and
//! destroy the component instance that realizes them.
//!
//! | hook        | fired                                                     |
//! |-------------|-----------------------------------------------------------|
//! | `init`      | before a placeholder is created (or hydrated)             |
//! | `create`    | after the backend node and its children exist             |
//! | `prepatch`  | first thing in an in-place patch                          |
//! | `update`    | after the module `update` callbacks                       |
//! | `postpatch` | after the children were reconciled                        |
//! | `insert`    | once the whole tree is attached                           |
//! | `remove`    | when the node leaves; must call [`RemovalJoin::done`]     |
//! | `destroy`   | when the node and its subtree are torn down               |

use std::any::Any;
use std::rc::Rc;

use super::module::RemovalJoin;
use super::vnode::VNode;
use crate::error::Result;

/// Realizes a component placeholder.
pub trait ComponentInstance<N> {
    /// The backend node of the instance's root.
    fn element(&self) -> Option<N>;

    /// The instance's current rendered tree.
    fn root(&self) -> Option<VNode<N>>;

    /// Release the instance without going through the placeholder's hooks.
    fn discard(&self) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

pub type InitHook<N> =
    Rc<dyn Fn(&VNode<N>, bool) -> Result<Option<Rc<dyn ComponentInstance<N>>>>>;
pub type NodeHook<N> = Rc<dyn Fn(&VNode<N>) -> Result<()>>;
pub type PatchHook<N> = Rc<dyn Fn(&VNode<N>, &VNode<N>) -> Result<()>>;
pub type RemoveHook<N> = Rc<dyn Fn(&VNode<N>, RemovalJoin)>;

/// Hooks on one node.
pub struct VNodeHooks<N> {
    /// Called with `hydrating`. Returns the instance to attach, or `None` to
    /// keep whatever instance the node already carries.
    pub init: Option<InitHook<N>>,
    pub create: Option<NodeHook<N>>,
    pub prepatch: Option<PatchHook<N>>,
    pub update: Option<PatchHook<N>>,
    pub postpatch: Option<PatchHook<N>>,
    pub insert: Option<NodeHook<N>>,
    pub remove: Option<RemoveHook<N>>,
    pub destroy: Option<NodeHook<N>>,
}

impl<N> VNodeHooks<N> {
    pub fn is_empty(&self) -> bool {
        self.init.is_none()
            && self.create.is_none()
            && self.prepatch.is_none()
            && self.update.is_none()
            && self.postpatch.is_none()
            && self.insert.is_none()
            && self.remove.is_none()
            && self.destroy.is_none()
    }

    pub fn on_init(
        &mut self,
        hook: impl Fn(&VNode<N>, bool) -> Result<Option<Rc<dyn ComponentInstance<N>>>> + 'static,
    ) -> &mut Self {
        self.init = Some(Rc::new(hook));
        self
    }

    pub fn on_create(&mut self, hook: impl Fn(&VNode<N>) -> Result<()> + 'static) -> &mut Self {
        self.create = Some(Rc::new(hook));
        self
    }

    pub fn on_prepatch(
        &mut self,
        hook: impl Fn(&VNode<N>, &VNode<N>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.prepatch = Some(Rc::new(hook));
        self
    }

    pub fn on_update(
        &mut self,
        hook: impl Fn(&VNode<N>, &VNode<N>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.update = Some(Rc::new(hook));
        self
    }

    pub fn on_postpatch(
        &mut self,
        hook: impl Fn(&VNode<N>, &VNode<N>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.postpatch = Some(Rc::new(hook));
        self
    }

    pub fn on_insert(&mut self, hook: impl Fn(&VNode<N>) -> Result<()> + 'static) -> &mut Self {
        self.insert = Some(Rc::new(hook));
        self
    }

    pub fn on_remove(&mut self, hook: impl Fn(&VNode<N>, RemovalJoin) + 'static) -> &mut Self {
        self.remove = Some(Rc::new(hook));
        self
    }

    pub fn on_destroy(&mut self, hook: impl Fn(&VNode<N>) -> Result<()> + 'static) -> &mut Self {
        self.destroy = Some(Rc::new(hook));
        self
    }
}

impl<N> Default for VNodeHooks<N> {
    fn default() -> Self {
        Self {
            init: None,
            create: None,
            prepatch: None,
            update: None,
            postpatch: None,
            insert: None,
            remove: None,
            destroy: None,
        }
    }
}

impl<N> Clone for VNodeHooks<N> {
    fn clone(&self) -> Self {
        Self {
            init: self.init.clone(),
            create: self.create.clone(),
            prepatch: self.prepatch.clone(),
            update: self.update.clone(),
            postpatch: self.postpatch.clone(),
            insert: self.insert.clone(),
            remove: self.remove.clone(),
            destroy: self.destroy.clone(),
        }
    }
}
