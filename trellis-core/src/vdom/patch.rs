//! Reconciler
//!
//! [`Patcher`] turns the difference between two virtual trees into backend
//! operations. Nodes that are the [same node](VNode::same_node) are updated
//! in place; anything else is replaced. Children lists are diffed with four
//! pointers (old start/end against new start/end), falling back to a key
//! lookup for nodes that moved.
//!
//! Insert hooks are not fired while a tree is being built. They are queued
//! and run once the whole tree is attached, so a component's `mounted`
//! notification always sees its final parent. For a component root the queue
//! is parked on the placeholder and picked up when the parent attaches it.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::backend::Backend;
use super::module::{Module, RemovalJoin};
use super::refs::{self, RefModule};
use super::vnode::{Key, VNode, VNodeKind};
use crate::config;
use crate::error::{self, Diagnostic, Error, Phase, Result};

type Queue<N> = Vec<VNode<N>>;

/// Reconciles virtual trees against a [`Backend`].
pub struct Patcher<B: Backend> {
    pub(super) backend: Rc<B>,
    pub(super) modules: Vec<Rc<dyn Module<B::Node>>>,
    pub(super) hydration_bailed: Cell<bool>,
}

impl<B: Backend + 'static> Patcher<B> {
    /// A patcher with the built-in ref module installed.
    pub fn new(backend: Rc<B>) -> Self {
        let ref_module: Rc<dyn Module<B::Node>> = Rc::new(RefModule);
        Self {
            backend,
            modules: vec![ref_module],
            hydration_bailed: Cell::new(false),
        }
    }

    /// Install a module plugin. Modules run in installation order.
    pub fn add_module(&mut self, module: Rc<dyn Module<B::Node>>) -> &mut Self {
        self.modules.push(module);
        self
    }

    pub fn backend(&self) -> &Rc<B> {
        &self.backend
    }

    /// Whether a hydration mismatch was seen by this patcher.
    pub fn hydration_bailed(&self) -> bool {
        self.hydration_bailed.get()
    }

    /// Reconcile `new` against `old` and return the realized root.
    ///
    /// Without `old` the tree is created detached; the caller attaches it.
    pub fn patch(
        &self,
        old: Option<&VNode<B::Node>>,
        new: &VNode<B::Node>,
    ) -> Result<Option<B::Node>> {
        self.patch_root(old, new, false)
    }

    /// Like [`patch`](Self::patch), but the root's children diff never moves
    /// existing nodes; it only patches, creates and removes.
    pub fn patch_move_suppressed(
        &self,
        old: Option<&VNode<B::Node>>,
        new: &VNode<B::Node>,
    ) -> Result<Option<B::Node>> {
        self.patch_root(old, new, true)
    }

    /// Mount `new` in place of an existing backend node.
    ///
    /// With `hydrating`, the node is first adopted as pre-rendered output of
    /// `new`. If that fails (or without `hydrating`) a fresh tree is created
    /// next to `element` and `element` is removed.
    pub fn mount_on(
        &self,
        element: &B::Node,
        new: &VNode<B::Node>,
        hydrating: bool,
    ) -> Result<Option<B::Node>> {
        let mut queue = Vec::new();
        if hydrating {
            if self.hydrate(element, new, &mut queue)? {
                self.invoke_insert_hook(new, queue, true);
                return Ok(Some(element.clone()));
            }
            self.discard_hydrated(new);
            queue.clear();
        }

        let parent = self.replace_with(element, new, &mut queue)?;
        if let Some(parent) = parent {
            self.backend.remove_child(&parent, element);
        }
        self.invoke_insert_hook(new, queue, false);
        Ok(new.elm())
    }

    /// Run destroy hooks over a tree that is going away for good.
    pub fn destroy(&self, old: &VNode<B::Node>) {
        self.invoke_destroy_hook(old);
    }

    fn patch_root(
        &self,
        old: Option<&VNode<B::Node>>,
        new: &VNode<B::Node>,
        remove_only: bool,
    ) -> Result<Option<B::Node>> {
        let mut queue = Vec::new();
        let initial = old.is_none();

        match old {
            None => self.create_elm(new, &mut queue, None, None)?,
            Some(old) if old.ptr_eq(new) => return Ok(new.elm()),
            Some(old) if old.same_node(new) => {
                self.patch_vnode(old, new, &mut queue, remove_only)?
            }
            Some(old) => {
                let old_elm = old
                    .elm()
                    .ok_or_else(|| Error::UnrealizedNode(describe(old)))?;
                match self.replace_with(&old_elm, new, &mut queue)? {
                    Some(_) => self.remove_vnodes([old]),
                    None if old.kind().is_tagged() => self.invoke_destroy_hook(old),
                    None => {}
                }
            }
        }

        self.invoke_insert_hook(new, queue, initial);
        Ok(new.elm())
    }

    /// Create `new` right after `old_elm` and point the placeholder chain
    /// above `new` at the result. Returns the parent of `old_elm`.
    fn replace_with(
        &self,
        old_elm: &B::Node,
        new: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
    ) -> Result<Option<B::Node>> {
        let parent = self.backend.parent_of(old_elm);
        let next = self.backend.next_sibling_of(old_elm);
        tracing::trace!(node = %describe(new), "replacing root");
        self.create_elm(new, queue, parent.as_ref(), next.as_ref())?;

        let patchable = self.is_patchable(new);
        let mut ancestor = new.parent();
        while let Some(placeholder) = ancestor {
            for module in &self.modules {
                module.destroy(&placeholder)?;
            }
            placeholder.set_elm(new.elm());
            if patchable {
                for module in &self.modules {
                    module.create(&placeholder)?;
                }
            } else {
                refs::register(&placeholder, false);
            }
            ancestor = placeholder.parent();
        }

        Ok(parent)
    }

    pub(super) fn create_elm(
        &self,
        vnode: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
        parent: Option<&B::Node>,
        reference: Option<&B::Node>,
    ) -> Result<()> {
        if self.create_component(vnode, queue, parent, reference)? {
            return Ok(());
        }

        let elm = match vnode.kind() {
            VNodeKind::Element(tag) | VNodeKind::Component(tag) => {
                let elm = self.backend.create_element(tag);
                vnode.set_elm(Some(elm.clone()));
                match raw_markup(vnode) {
                    Some(markup) => self.backend.set_inner_markup(&elm, markup),
                    None => self.create_children(vnode, &elm, queue)?,
                }
                if vnode.data().is_some() {
                    self.invoke_create_hooks(vnode, queue)?;
                }
                elm
            }
            VNodeKind::Text => {
                let elm = self
                    .backend
                    .create_text(vnode.text_content().unwrap_or_default());
                vnode.set_elm(Some(elm.clone()));
                elm
            }
            VNodeKind::Comment | VNodeKind::Empty => {
                let elm = self
                    .backend
                    .create_comment(vnode.text_content().unwrap_or_default());
                vnode.set_elm(Some(elm.clone()));
                elm
            }
        };

        self.insert(parent, &elm, reference);
        Ok(())
    }

    /// Realize a placeholder through its `init` hook. Returns `false` when
    /// the node is not backed by a component instance.
    fn create_component(
        &self,
        vnode: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
        parent: Option<&B::Node>,
        reference: Option<&B::Node>,
    ) -> Result<bool> {
        let Some(data) = vnode.data() else {
            return Ok(false);
        };
        let reactivated = vnode.component_instance().is_some() && data.keep_alive;

        if let Some(init) = data.hooks.init.clone() {
            if let Some(instance) = init(vnode, false)? {
                vnode.set_component_instance(Some(instance));
            }
        }
        if vnode.component_instance().is_none() {
            return Ok(false);
        }

        self.init_component(vnode, queue)?;
        if let Some(elm) = vnode.elm() {
            self.insert(parent, &elm, reference);
        }
        if reactivated {
            self.reactivate_component(vnode, queue)?;
        }
        Ok(true)
    }

    pub(super) fn init_component(
        &self,
        vnode: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
    ) -> Result<()> {
        queue.extend(vnode.take_pending_insert());

        let elm = vnode
            .component_instance()
            .and_then(|instance| instance.element())
            .ok_or_else(|| Error::Component {
                tag: vnode.tag().unwrap_or_default().to_owned(),
                reason: "instance has no rendered element".into(),
            })?;
        vnode.set_elm(Some(elm));

        if self.is_patchable(vnode) {
            self.invoke_create_hooks(vnode, queue)
        } else {
            // Empty root: only the ref and the insert notification apply.
            refs::register(vnode, false);
            queue.push(vnode.clone());
            Ok(())
        }
    }

    /// A kept-alive instance skips its create phase on re-insertion; give
    /// modules their `activate` callback on the innermost root with data.
    fn reactivate_component(
        &self,
        vnode: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
    ) -> Result<()> {
        let mut inner = vnode.clone();
        while let Some(root) = inner.component_instance().and_then(|instance| instance.root()) {
            inner = root;
            if inner.data().is_some() {
                for module in &self.modules {
                    module.activate(&inner)?;
                }
                if inner.hooks().is_some_and(|hooks| hooks.insert.is_some()) {
                    queue.push(inner.clone());
                }
                break;
            }
        }
        Ok(())
    }

    fn insert(&self, parent: Option<&B::Node>, elm: &B::Node, reference: Option<&B::Node>) {
        let Some(parent) = parent else {
            return;
        };
        match reference {
            // The reference may have been moved away in the meantime.
            Some(reference) => {
                if self.backend.parent_of(reference).as_ref() == Some(parent) {
                    self.backend.insert_before(parent, elm, Some(reference));
                }
            }
            None => self.backend.append_child(parent, elm),
        }
    }

    pub(super) fn create_children(
        &self,
        vnode: &VNode<B::Node>,
        elm: &B::Node,
        queue: &mut Queue<B::Node>,
    ) -> Result<()> {
        if let Some(children) = vnode.children() {
            if config::current().dev_checks {
                check_duplicate_keys(children);
            }
            for child in children {
                self.create_elm(child, queue, Some(elm), None)?;
            }
        } else if let Some(text) = vnode.text_content() {
            let text = self.backend.create_text(text);
            self.backend.append_child(elm, &text);
        }
        Ok(())
    }

    /// Whether the node ends in a real element once component roots are
    /// followed down.
    pub(super) fn is_patchable(&self, vnode: &VNode<B::Node>) -> bool {
        let mut node = vnode.clone();
        while let Some(instance) = node.component_instance() {
            match instance.root() {
                Some(root) => node = root,
                None => return false,
            }
        }
        node.kind().is_tagged()
    }

    pub(super) fn invoke_create_hooks(
        &self,
        vnode: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
    ) -> Result<()> {
        for module in &self.modules {
            module.create(vnode)?;
        }
        if let Some(hooks) = vnode.hooks() {
            if let Some(create) = hooks.create.clone() {
                create(vnode)?;
            }
            if hooks.insert.is_some() {
                queue.push(vnode.clone());
            }
        }
        Ok(())
    }

    /// Fire `destroy` over a subtree. Failures are reported and the walk
    /// goes on.
    fn invoke_destroy_hook(&self, vnode: &VNode<B::Node>) {
        if vnode.data().is_some() {
            if let Some(destroy) = vnode.hooks().and_then(|hooks| hooks.destroy.clone()) {
                if let Err(err) = destroy(vnode) {
                    error::report(&err, None, Phase::Hook("destroy"));
                }
            }
            for module in &self.modules {
                if let Err(err) = module.destroy(vnode) {
                    error::report(&err, None, Phase::Hook("destroy"));
                }
            }
        }
        for child in vnode.children().unwrap_or_default() {
            self.invoke_destroy_hook(child);
        }
    }

    fn remove_vnodes<'a>(&self, vnodes: impl IntoIterator<Item = &'a VNode<B::Node>>) {
        for vnode in vnodes {
            if vnode.kind().is_tagged() {
                self.remove_and_invoke_remove_hook(vnode, None);
                self.invoke_destroy_hook(vnode);
            } else if let Some(elm) = vnode.elm() {
                self.remove_node(&elm);
            }
        }
    }

    fn remove_node(&self, elm: &B::Node) {
        // Already detached is fine.
        if let Some(parent) = self.backend.parent_of(elm) {
            self.backend.remove_child(&parent, elm);
        }
    }

    /// Start (or join) the removal of `vnode`. The backend node is removed
    /// once every module and the node's own `remove` hook signed off.
    fn remove_and_invoke_remove_hook(&self, vnode: &VNode<B::Node>, join: Option<RemovalJoin>) {
        if join.is_none() && vnode.data().is_none() {
            if let Some(elm) = vnode.elm() {
                self.remove_node(&elm);
            }
            return;
        }

        let observers = self.modules.len() + 1;
        let join = match join {
            Some(join) => {
                join.add(observers);
                join
            }
            None => {
                let backend = Rc::clone(&self.backend);
                let elm = vnode.elm();
                RemovalJoin::new(observers, move || {
                    if let Some(elm) = elm {
                        if let Some(parent) = backend.parent_of(&elm) {
                            backend.remove_child(&parent, &elm);
                        }
                    }
                })
            }
        };

        if let Some(root) = vnode.component_instance().and_then(|instance| instance.root()) {
            if root.data().is_some() {
                self.remove_and_invoke_remove_hook(&root, Some(join.clone()));
            }
        }

        for module in &self.modules {
            module.remove(vnode, join.clone());
        }

        match vnode.hooks().and_then(|hooks| hooks.remove.clone()) {
            Some(remove) => remove(vnode, join),
            None => join.done(),
        }
    }

    fn update_children(
        &self,
        parent: &B::Node,
        old_ch: &[VNode<B::Node>],
        new_ch: &[VNode<B::Node>],
        queue: &mut Queue<B::Node>,
        remove_only: bool,
    ) -> Result<()> {
        // Matched old nodes are taken out of their slot.
        let mut old: Vec<Option<VNode<B::Node>>> = old_ch.iter().cloned().map(Some).collect();
        let (mut old_start, mut old_end) = (0, old.len());
        let (mut new_start, mut new_end) = (0, new_ch.len());
        let mut key_map: Option<HashMap<Key, usize>> = None;
        let can_move = !remove_only;

        if config::current().dev_checks {
            check_duplicate_keys(new_ch);
        }

        while old_start < old_end && new_start < new_end {
            let Some(old_first) = old[old_start].clone() else {
                old_start += 1;
                continue;
            };
            let Some(old_last) = old[old_end - 1].clone() else {
                old_end -= 1;
                continue;
            };
            let new_first = &new_ch[new_start];
            let new_last = &new_ch[new_end - 1];

            if old_first.same_node(new_first) {
                self.patch_vnode(&old_first, new_first, queue, false)?;
                old_start += 1;
                new_start += 1;
            } else if old_last.same_node(new_last) {
                self.patch_vnode(&old_last, new_last, queue, false)?;
                old_end -= 1;
                new_end -= 1;
            } else if old_first.same_node(new_last) {
                // Moved right.
                self.patch_vnode(&old_first, new_last, queue, false)?;
                if can_move {
                    let after = old_last
                        .elm()
                        .and_then(|elm| self.backend.next_sibling_of(&elm));
                    self.move_before(parent, &old_first, after.as_ref());
                }
                old_start += 1;
                new_end -= 1;
            } else if old_last.same_node(new_first) {
                // Moved left.
                self.patch_vnode(&old_last, new_first, queue, false)?;
                if can_move {
                    self.move_before(parent, &old_last, old_first.elm().as_ref());
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let found = match new_first.key() {
                    Some(key) => key_map
                        .get_or_insert_with(|| key_to_index(&old, old_start, old_end))
                        .get(key)
                        .copied()
                        .filter(|idx| (old_start..old_end).contains(idx)),
                    None => find_in_old(new_first, &old, old_start, old_end),
                };
                let candidate = found.and_then(|idx| old[idx].clone().map(|node| (idx, node)));

                match candidate {
                    Some((idx, to_move)) if to_move.same_node(new_first) => {
                        self.patch_vnode(&to_move, new_first, queue, false)?;
                        old[idx] = None;
                        if can_move {
                            self.move_before(parent, &to_move, old_first.elm().as_ref());
                        }
                    }
                    // Unknown key, or same key on an incompatible node.
                    _ => {
                        tracing::trace!(node = %describe(new_first), "creating child");
                        self.create_elm(new_first, queue, Some(parent), old_first.elm().as_ref())?;
                    }
                }
                new_start += 1;
            }
        }

        if old_start >= old_end {
            let reference = new_ch.get(new_end).and_then(VNode::elm);
            for child in &new_ch[new_start..new_end] {
                self.create_elm(child, queue, Some(parent), reference.as_ref())?;
            }
        } else if new_start >= new_end {
            self.remove_vnodes(old[old_start..old_end].iter().flatten());
        }
        Ok(())
    }

    fn move_before(&self, parent: &B::Node, vnode: &VNode<B::Node>, reference: Option<&B::Node>) {
        if let Some(elm) = vnode.elm() {
            self.backend.insert_before(parent, &elm, reference);
        }
    }

    fn patch_vnode(
        &self,
        old: &VNode<B::Node>,
        new: &VNode<B::Node>,
        queue: &mut Queue<B::Node>,
        remove_only: bool,
    ) -> Result<()> {
        if old.ptr_eq(new) {
            return Ok(());
        }

        let elm = old.elm();
        new.set_elm(elm.clone());
        new.set_component_instance(old.component_instance());

        let hooks = new.hooks().cloned();
        if let Some(prepatch) = hooks.as_ref().and_then(|hooks| hooks.prepatch.clone()) {
            prepatch(old, new)?;
        }

        if new.data().is_some() && self.is_patchable(new) {
            for module in &self.modules {
                module.update(old, new)?;
            }
            if let Some(update) = hooks.as_ref().and_then(|hooks| hooks.update.clone()) {
                update(old, new)?;
            }
        }

        let realized = || elm.clone().ok_or_else(|| Error::UnrealizedNode(describe(old)));

        if let Some(markup) = raw_markup(new) {
            if raw_markup(old) != Some(markup) {
                self.backend.set_inner_markup(&realized()?, markup);
            }
        } else if let Some(text) = new.text_content() {
            if old.text_content() != Some(text) {
                self.backend.set_text_content(&realized()?, text);
            }
        } else {
            let mut old_children = old.children();
            let mut old_has_content = old.text_content().is_some();
            if raw_markup(old).is_some() {
                old_children = None;
                old_has_content = true;
            }

            match (old_children, new.children()) {
                (Some(old_ch), Some(new_ch)) => {
                    if !std::ptr::eq(old_ch, new_ch) {
                        self.update_children(&realized()?, old_ch, new_ch, queue, remove_only)?;
                    }
                }
                (None, Some(new_ch)) => {
                    if config::current().dev_checks {
                        check_duplicate_keys(new_ch);
                    }
                    let elm = realized()?;
                    if old_has_content {
                        self.backend.set_text_content(&elm, "");
                    }
                    for child in new_ch {
                        self.create_elm(child, queue, Some(&elm), None)?;
                    }
                }
                (Some(old_ch), None) => self.remove_vnodes(old_ch),
                (None, None) => {
                    if old_has_content {
                        self.backend.set_text_content(&realized()?, "");
                    }
                }
            }
        }

        if let Some(postpatch) = hooks.as_ref().and_then(|hooks| hooks.postpatch.clone()) {
            postpatch(old, new)?;
        }
        Ok(())
    }

    /// Fire the queued insert hooks, or park them on the placeholder when
    /// `vnode` is a freshly created component root.
    pub(super) fn invoke_insert_hook(
        &self,
        vnode: &VNode<B::Node>,
        queue: Queue<B::Node>,
        initial: bool,
    ) {
        if initial {
            if let Some(placeholder) = vnode.parent() {
                placeholder.set_pending_insert(queue);
                return;
            }
        }
        for node in queue {
            if let Some(insert) = node.hooks().and_then(|hooks| hooks.insert.clone()) {
                if let Err(err) = insert(&node) {
                    error::report(&err, None, Phase::Hook("insert"));
                }
            }
        }
    }

    /// Undo a partial hydration: release instances and refs it produced
    /// and forget the adopted backend nodes.
    fn discard_hydrated(&self, vnode: &VNode<B::Node>) {
        refs::register(vnode, true);
        if let Some(instance) = vnode.take_component_instance() {
            instance.discard();
        }
        vnode.set_elm(None);
        vnode.take_pending_insert();
        for child in vnode.children().unwrap_or_default() {
            self.discard_hydrated(child);
        }
    }

    /// Record a hydration mismatch. Only the first one is reported.
    pub(super) fn mismatch(&self, detail: impl Into<String>) -> bool {
        if !self.hydration_bailed.replace(true) {
            error::warn(Diagnostic::HydrationMismatch {
                detail: detail.into(),
            });
        }
        false
    }
}

pub(super) fn raw_markup<N>(vnode: &VNode<N>) -> Option<&str> {
    vnode.data()?.raw_markup.as_deref()
}

pub(super) fn describe<N>(vnode: &VNode<N>) -> String {
    match vnode.kind() {
        VNodeKind::Element(tag) | VNodeKind::Component(tag) => format!("<{tag}>"),
        VNodeKind::Text => "#text".into(),
        VNodeKind::Comment | VNodeKind::Empty => "#comment".into(),
    }
}

fn key_to_index<N>(old: &[Option<VNode<N>>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (idx, slot) in old.iter().enumerate().take(end).skip(start) {
        if let Some(key) = slot.as_ref().and_then(VNode::key) {
            map.insert(key.clone(), idx);
        }
    }
    map
}

fn find_in_old<N>(
    node: &VNode<N>,
    old: &[Option<VNode<N>>],
    start: usize,
    end: usize,
) -> Option<usize> {
    (start..end).find(|&idx| old[idx].as_ref().is_some_and(|candidate| node.same_node(candidate)))
}

fn check_duplicate_keys<N>(children: &[VNode<N>]) {
    let mut seen = HashSet::new();
    for child in children {
        if let Some(key) = child.key() {
            if !seen.insert(key) {
                error::warn(Diagnostic::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }
    }
}
