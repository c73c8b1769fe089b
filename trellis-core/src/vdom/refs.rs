//! Template Refs
//!
//! A node can bind itself under a name in a [`Refs`] registry, usually the
//! one of the view that rendered it. The registry then holds the node's
//! backend node, or its component instance for placeholders. Bindings made
//! inside lists (`in_for`) collect every target in a list instead.
//!
//! [`RefModule`] keeps registries current: it registers on create,
//! re-registers when a patch changes the binding, and unregisters on destroy.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::hooks::ComponentInstance;
use super::module::Module;
use super::vnode::VNode;
use crate::error::Result;

/// What a ref points at.
pub enum RefTarget<N> {
    Node(N),
    Component(Rc<dyn ComponentInstance<N>>),
}

impl<N: Clone> Clone for RefTarget<N> {
    fn clone(&self) -> Self {
        match self {
            RefTarget::Node(node) => RefTarget::Node(node.clone()),
            RefTarget::Component(instance) => RefTarget::Component(Rc::clone(instance)),
        }
    }
}

impl<N: PartialEq> PartialEq for RefTarget<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RefTarget::Node(a), RefTarget::Node(b)) => a == b,
            (RefTarget::Component(a), RefTarget::Component(b)) => {
                std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for RefTarget<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Node(node) => f.debug_tuple("Node").field(node).finish(),
            RefTarget::Component(_) => f.write_str("Component(..)"),
        }
    }
}

/// A registered ref.
#[derive(Debug, Clone, PartialEq)]
pub enum RefValue<N> {
    Single(RefTarget<N>),
    List(Vec<RefTarget<N>>),
}

/// Named references owned by one view.
pub struct Refs<N>(Rc<RefCell<IndexMap<String, RefValue<N>>>>);

impl<N> Clone for Refs<N> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<N> Default for Refs<N> {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(IndexMap::new())))
    }
}

impl<N: Clone + PartialEq> Refs<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RefValue<N>> {
        self.0.borrow().get(name).cloned()
    }

    /// The backend node bound under `name`, when it is a single node.
    pub fn node(&self, name: &str) -> Option<N> {
        match self.0.borrow().get(name)? {
            RefValue::Single(RefTarget::Node(node)) => Some(node.clone()),
            _ => None,
        }
    }

    /// The component instance bound under `name`, when it is a single one.
    pub fn component(&self, name: &str) -> Option<Rc<dyn ComponentInstance<N>>> {
        match self.0.borrow().get(name)? {
            RefValue::Single(RefTarget::Component(instance)) => Some(Rc::clone(instance)),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Refs<N>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A node's ref binding.
pub struct RefBinding<N> {
    pub name: String,
    /// Collect targets in a list.
    pub in_for: bool,
    pub owner: Refs<N>,
}

impl<N> RefBinding<N> {
    pub fn new(owner: &Refs<N>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_for: false,
            owner: owner.clone(),
        }
    }

    pub fn in_for(owner: &Refs<N>, name: impl Into<String>) -> Self {
        Self {
            in_for: true,
            ..Self::new(owner, name)
        }
    }
}

impl<N> Clone for RefBinding<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            in_for: self.in_for,
            owner: self.owner.clone(),
        }
    }
}

impl<N> PartialEq for RefBinding<N> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.in_for == other.in_for
            && Rc::ptr_eq(&self.owner.0, &other.owner.0)
    }
}

/// Register `vnode` under its binding, or unregister it when `removal`.
pub fn register<N: Clone + PartialEq>(vnode: &VNode<N>, removal: bool) {
    let Some(binding) = vnode.data().and_then(|data| data.ref_binding.as_ref()) else {
        return;
    };
    let target = match vnode.component_instance() {
        Some(instance) => RefTarget::Component(instance),
        None => match vnode.elm() {
            Some(elm) => RefTarget::Node(elm),
            None => return,
        },
    };

    let mut refs = binding.owner.0.borrow_mut();
    let name = binding.name.as_str();

    if binding.in_for {
        if removal {
            if let Some(RefValue::List(list)) = refs.get_mut(name) {
                list.retain(|existing| *existing != target);
            }
        } else if let Some(RefValue::List(list)) = refs.get_mut(name) {
            if !list.contains(&target) {
                list.push(target);
            }
        } else {
            refs.insert(name.to_owned(), RefValue::List(vec![target]));
        }
    } else if removal {
        // Leave it alone if something else took the name since.
        if matches!(refs.get(name), Some(RefValue::Single(existing)) if *existing == target) {
            refs.shift_remove(name);
        }
    } else {
        refs.insert(name.to_owned(), RefValue::Single(target));
    }
}

fn binding_of<N>(vnode: &VNode<N>) -> Option<&RefBinding<N>> {
    vnode.data()?.ref_binding.as_ref()
}

/// Built-in module maintaining ref registries.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefModule;

impl<N: Clone + PartialEq> Module<N> for RefModule {
    fn create(&self, vnode: &VNode<N>) -> Result<()> {
        register(vnode, false);
        Ok(())
    }

    fn update(&self, old: &VNode<N>, new: &VNode<N>) -> Result<()> {
        if binding_of(old) != binding_of(new) {
            register(old, true);
            register(new, false);
        }
        Ok(())
    }

    fn destroy(&self, vnode: &VNode<N>) -> Result<()> {
        register(vnode, true);
        Ok(())
    }
}
