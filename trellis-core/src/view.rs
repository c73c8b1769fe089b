//! Views
//!
//! A [`View`] ties a render function to the reconciler. Its render
//! subscriber re-runs the render function whenever something it read
//! changes and patches the result against the previous tree.
//!
//! Views nest through component placeholders built with
//! [`View::component`]: the placeholder's hooks create the child view,
//! hand it new props on every parent render, and destroy it (or deactivate
//! it, when kept alive) when the placeholder goes away.
//!
//! # Lifecycle
//!
//! ```text
//! mount ──> beforeMount ──> render ──> mounted (root: now, child: on insert)
//! change ─> beforeUpdate ─> render ──> updated
//! destroy ─> beforeDestroy ─> teardown ─> destroyed
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{self, Phase, Result};
use crate::reactive::{untracked, Signal, Subscriber, SubscriberId, SubscriberOptions};
use crate::scheduler::{self, Activate};
use crate::vdom::{Backend, ComponentInstance, Patcher, VNode, VNodeBuilder, WeakVNode};

/// Props passed from a placeholder to its view.
pub type Props = IndexMap<String, String>;

type RenderFn<N> = Box<dyn Fn(&Props) -> Result<VNode<N>>>;
type LifecycleHook = Rc<dyn Fn() -> Result<()>>;

/// Lifecycle notifications of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl Lifecycle {
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::BeforeMount => "beforeMount",
            Lifecycle::Mounted => "mounted",
            Lifecycle::BeforeUpdate => "beforeUpdate",
            Lifecycle::Updated => "updated",
            Lifecycle::Activated => "activated",
            Lifecycle::Deactivated => "deactivated",
            Lifecycle::BeforeDestroy => "beforeDestroy",
            Lifecycle::Destroyed => "destroyed",
        }
    }
}

struct ViewInner<B: Backend> {
    patcher: Rc<Patcher<B>>,
    tag: String,
    render: RenderFn<B::Node>,
    props: Signal<Props>,
    tree: RefCell<Option<VNode<B::Node>>>,
    placeholder: RefCell<Option<WeakVNode<B::Node>>>,
    element: RefCell<Option<B::Node>>,
    mount_target: RefCell<Option<(B::Node, bool)>>,
    subscriber: RefCell<Option<Subscriber>>,
    hooks: RefCell<Vec<(Lifecycle, LifecycleHook)>>,
    mounted: Cell<bool>,
    destroying: Cell<bool>,
    destroyed: Cell<bool>,
    /// `None` until the first activation or deactivation.
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,
}

/// A rendered component instance.
pub struct View<B: Backend>(Rc<ViewInner<B>>);

impl<B: Backend> Clone for View<B> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<B: Backend + 'static> View<B> {
    pub fn new<F>(patcher: Rc<Patcher<B>>, tag: impl Into<String>, render: F) -> Self
    where
        F: Fn(&Props) -> Result<VNode<B::Node>> + 'static,
    {
        Self(Rc::new(ViewInner {
            patcher,
            tag: tag.into(),
            render: Box::new(render),
            props: Signal::new(Props::new()),
            tree: RefCell::new(None),
            placeholder: RefCell::new(None),
            element: RefCell::new(None),
            mount_target: RefCell::new(None),
            subscriber: RefCell::new(None),
            hooks: RefCell::new(Vec::new()),
            mounted: Cell::new(false),
            destroying: Cell::new(false),
            destroyed: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
        }))
    }

    /// Register a lifecycle callback.
    pub fn on(&self, lifecycle: Lifecycle, hook: impl Fn() -> Result<()> + 'static) -> &Self {
        self.0.hooks.borrow_mut().push((lifecycle, Rc::new(hook)));
        self
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn props(&self) -> Props {
        self.0.props.get_untracked()
    }

    /// Replace the props. Re-renders on the next flush when they changed.
    pub fn set_props(&self, props: Props) {
        self.0.props.set_if_changed(props);
    }

    pub fn element(&self) -> Option<B::Node> {
        self.0.element.borrow().clone()
    }

    pub fn tree(&self) -> Option<VNode<B::Node>> {
        self.0.tree.borrow().clone()
    }

    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.0.subscriber.borrow().as_ref().map(Subscriber::id)
    }

    pub fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn is_inactive(&self) -> bool {
        self.0.inactive.get().unwrap_or(false)
    }

    /// Render for the first time.
    ///
    /// With `el`, the output takes the place of that backend node, adopting
    /// it as pre-rendered output when `hydrating`. Without it the output is
    /// created detached and the caller attaches [`element`](Self::element).
    pub fn mount(&self, el: Option<B::Node>, hydrating: bool) -> Option<B::Node> {
        *self.0.mount_target.borrow_mut() = el.map(|el| (el, hydrating));
        self.call_hook(Lifecycle::BeforeMount);

        let render = Rc::downgrade(&self.0);
        let subscriber = Subscriber::new(
            SubscriberOptions::render().label(self.0.tag.clone()),
            move || match render.upgrade() {
                Some(inner) => View(inner).update_component(),
                None => Ok(()),
            },
        );

        let before = Rc::downgrade(&self.0);
        subscriber.set_before(move || {
            if let Some(view) = upgrade(&before) {
                if view.is_mounted() && !view.is_destroyed() {
                    view.call_hook(Lifecycle::BeforeUpdate);
                }
            }
        });
        let after = Rc::downgrade(&self.0);
        subscriber.set_after(move || {
            if let Some(view) = upgrade(&after) {
                if view.is_mounted() && !view.is_destroyed() {
                    view.call_hook(Lifecycle::Updated);
                }
            }
        });

        *self.0.subscriber.borrow_mut() = Some(subscriber.clone());
        subscriber.evaluate();

        // Child views are mounted once their placeholder is inserted.
        if self.placeholder().is_none() && self.0.tree.borrow().is_some() {
            self.0.mounted.set(true);
            self.call_hook(Lifecycle::Mounted);
        }
        self.element()
    }

    /// Schedule a re-render even though nothing it read changed.
    pub fn force_update(&self) {
        if let Some(subscriber) = self.0.subscriber.borrow().clone() {
            subscriber.update();
        }
    }

    /// Tear the view down: stop rendering and run destroy hooks over the
    /// current tree. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroying.replace(true) {
            return;
        }
        self.call_hook(Lifecycle::BeforeDestroy);
        if let Some(subscriber) = self.0.subscriber.borrow().clone() {
            subscriber.teardown();
        }
        self.0.destroyed.set(true);
        let tree = self.0.tree.borrow().clone();
        if let Some(tree) = tree {
            self.0.patcher.destroy(&tree);
        }
        self.call_hook(Lifecycle::Destroyed);
        tracing::trace!(view = %self.0.tag, "destroyed");
    }

    /// The render subscriber's computation.
    fn update_component(&self) -> Result<()> {
        let props = self.0.props.get();
        let tree = (self.0.render)(&props)?;
        tree.set_parent(self.placeholder().as_ref());

        // Hooks see the new tree while it is patched. A failed patch puts
        // the last realized tree back so the next render diffs against it.
        let previous = self.0.tree.replace(Some(tree.clone()));
        let patched = match &previous {
            Some(previous) => self.0.patcher.patch(Some(previous), &tree),
            None => {
                let target = self.0.mount_target.borrow_mut().take();
                let result = match &target {
                    Some((el, hydrating)) => self.0.patcher.mount_on(el, &tree, *hydrating),
                    None => self.0.patcher.patch(None, &tree),
                };
                if result.is_err() {
                    *self.0.mount_target.borrow_mut() = target;
                }
                result
            }
        };
        match patched {
            Ok(element) => {
                *self.0.element.borrow_mut() = element;
                Ok(())
            }
            Err(err) => {
                self.0.tree.replace(previous);
                Err(err)
            }
        }
    }

    fn placeholder(&self) -> Option<VNode<B::Node>> {
        self.0.placeholder.borrow().as_ref().and_then(WeakVNode::upgrade)
    }

    fn set_placeholder(&self, placeholder: &VNode<B::Node>) {
        *self.0.placeholder.borrow_mut() = Some(placeholder.downgrade());
    }

    /// Take over a new placeholder and its props.
    fn prepatch(&self, placeholder: &VNode<B::Node>) {
        self.set_placeholder(placeholder);
        if let Some(tree) = self.0.tree.borrow().as_ref() {
            tree.set_parent(Some(placeholder));
        }
        self.0.props.set_if_changed(props_of(placeholder));
    }

    fn call_hook(&self, lifecycle: Lifecycle) {
        let hooks: Vec<LifecycleHook> = self
            .0
            .hooks
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == lifecycle)
            .map(|(_, hook)| Rc::clone(hook))
            .collect();
        for hook in hooks {
            if let Err(err) = untracked(|| hook()) {
                error::report(&err, self.subscriber_id(), Phase::Hook(lifecycle.name()));
            }
        }
    }

    /// Views rendered directly by this one.
    fn child_views(&self) -> Vec<View<B>> {
        fn collect<B: Backend + 'static>(vnode: &VNode<B::Node>, out: &mut Vec<View<B>>) {
            if let Some(view) = vnode.component_instance().and_then(View::<B>::from_instance) {
                out.push(view);
                return;
            }
            for child in vnode.children().unwrap_or_default() {
                collect(child, out);
            }
        }

        let mut out = Vec::new();
        if let Some(tree) = self.tree() {
            collect(&tree, &mut out);
        }
        out
    }

    fn activate_child(&self, direct: bool) {
        if direct {
            self.0.direct_inactive.set(false);
        } else if self.0.direct_inactive.get() {
            return;
        }
        if self.0.inactive.get() != Some(false) {
            self.0.inactive.set(Some(false));
            for child in self.child_views() {
                child.activate_child(false);
            }
            self.call_hook(Lifecycle::Activated);
        }
    }

    fn deactivate_child(&self, direct: bool) {
        if direct {
            self.0.direct_inactive.set(true);
        }
        if self.0.inactive.get() != Some(true) {
            self.0.inactive.set(Some(true));
            for child in self.child_views() {
                child.deactivate_child(false);
            }
            self.call_hook(Lifecycle::Deactivated);
        }
    }

    fn from_instance(instance: Rc<dyn ComponentInstance<B::Node>>) -> Option<View<B>> {
        instance
            .into_any()
            .downcast::<View<B>>()
            .ok()
            .map(|view| View::clone(&view))
    }

    /// A placeholder node whose component is realized by a view built with
    /// `factory`. `props` become the placeholder's attributes.
    pub fn component<F>(tag: impl Into<String>, props: Props, factory: F) -> VNodeBuilder<B::Node>
    where
        F: Fn() -> View<B> + 'static,
    {
        VNode::component(tag).attrs(props).hooks(|hooks| {
            hooks
                .on_init(move |vnode, hydrating| {
                    let kept = vnode.component_instance().and_then(View::<B>::from_instance);
                    if let Some(view) = kept {
                        if keep_alive(vnode) && !view.is_destroyed() {
                            view.prepatch(vnode);
                            return Ok(None);
                        }
                    }

                    let view = factory();
                    view.set_placeholder(vnode);
                    view.0.props.set(props_of(vnode));
                    let el = if hydrating { vnode.elm() } else { None };
                    view.mount(el, hydrating);
                    let instance: Rc<dyn ComponentInstance<B::Node>> = Rc::new(view);
                    Ok(Some(instance))
                })
                .on_prepatch(|_old, new| {
                    if let Some(view) = new.component_instance().and_then(View::<B>::from_instance) {
                        view.prepatch(new);
                    }
                    Ok(())
                })
                .on_insert(|vnode| {
                    let Some(view) = vnode.component_instance().and_then(View::<B>::from_instance)
                    else {
                        return Ok(());
                    };
                    if !view.is_mounted() {
                        view.0.mounted.set(true);
                        view.call_hook(Lifecycle::Mounted);
                    }
                    if keep_alive(vnode) {
                        if scheduler::is_flushing() {
                            // Run activated hooks once the whole flush is patched.
                            scheduler::queue_activated(Rc::new(view));
                        } else {
                            view.activate_child(true);
                        }
                    }
                    Ok(())
                })
                .on_destroy(|vnode| {
                    let Some(view) = vnode.component_instance().and_then(View::<B>::from_instance)
                    else {
                        return Ok(());
                    };
                    if !view.is_destroyed() {
                        if keep_alive(vnode) {
                            view.deactivate_child(true);
                        } else {
                            view.destroy();
                        }
                    }
                    Ok(())
                });
        })
    }
}

fn upgrade<B: Backend>(weak: &Weak<ViewInner<B>>) -> Option<View<B>> {
    weak.upgrade().map(View)
}

fn props_of<N>(vnode: &VNode<N>) -> Props {
    vnode.data().map(|data| data.attrs.clone()).unwrap_or_default()
}

fn keep_alive<N>(vnode: &VNode<N>) -> bool {
    vnode.data().is_some_and(|data| data.keep_alive)
}

impl<B: Backend + 'static> ComponentInstance<B::Node> for View<B> {
    fn element(&self) -> Option<B::Node> {
        View::element(self)
    }

    fn root(&self) -> Option<VNode<B::Node>> {
        self.tree()
    }

    fn discard(&self) {
        self.destroy();
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl<B: Backend + 'static> Activate for View<B> {
    fn set_inactive(&self, inactive: bool) {
        self.0.inactive.set(Some(inactive));
    }

    fn activate(&self) {
        self.activate_child(true);
    }
}

impl<B: Backend> fmt::Debug for View<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("tag", &self.0.tag)
            .field("mounted", &self.0.mounted.get())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}
