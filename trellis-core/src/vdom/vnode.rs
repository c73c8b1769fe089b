//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the desired output. Render functions
//! build a fresh tree on every evaluation; the reconciler diffs it against
//! the previous one and fills in the realized backend node as it goes.
//!
//! Nodes are `Rc` handles. The descriptive part (kind, key, data, children,
//! text) is fixed at construction. Only the bookkeeping the reconciler owns
//! (backend node, placeholder parent, component instance, pending inserts)
//! is mutable.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::hooks::{ComponentInstance, VNodeHooks};
use super::refs::RefBinding;

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNodeKind {
    /// A backend element with a tag name.
    Element(String),
    /// A placeholder that a component instance realizes.
    Component(String),
    Text,
    Comment,
    /// Renders as an empty comment.
    Empty,
}

impl VNodeKind {
    /// Elements and component placeholders carry a tag; text and comments do not.
    pub fn is_tagged(&self) -> bool {
        matches!(self, VNodeKind::Element(_) | VNodeKind::Component(_))
    }

    /// Whether two kinds may be patched into each other.
    fn compatible(&self, other: &VNodeKind) -> bool {
        match (self, other) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a == b,
            (VNodeKind::Text, VNodeKind::Text) => true,
            (
                VNodeKind::Comment | VNodeKind::Empty,
                VNodeKind::Comment | VNodeKind::Empty,
            ) => true,
            _ => false,
        }
    }
}

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(key) => f.write_str(key),
            Key::Int(key) => write!(f, "{key}"),
        }
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Str(key.to_owned())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Str(key)
    }
}

impl From<i32> for Key {
    fn from(key: i32) -> Self {
        Key::Int(key.into())
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Key::Int(key)
    }
}

impl From<usize> for Key {
    fn from(key: usize) -> Self {
        Key::Int(key as i64)
    }
}

/// The payload module plugins and hooks interpret.
pub struct VNodeData<N> {
    /// Attributes; for component placeholders, the props passed down.
    pub attrs: IndexMap<String, String>,
    pub hooks: VNodeHooks<N>,
    pub ref_binding: Option<RefBinding<N>>,
    /// Pre-rendered inner markup. Children of such nodes are not reconciled.
    pub raw_markup: Option<String>,
    /// Keep the component instance alive when the placeholder is removed.
    pub keep_alive: bool,
}

impl<N> Default for VNodeData<N> {
    fn default() -> Self {
        Self {
            attrs: IndexMap::new(),
            hooks: VNodeHooks::default(),
            ref_binding: None,
            raw_markup: None,
            keep_alive: false,
        }
    }
}

impl<N> VNodeData<N> {
    /// Whether anything beyond pre-renderable attributes is attached.
    pub(crate) fn needs_create_hooks(&self) -> bool {
        !self.hooks.is_empty() || self.ref_binding.is_some()
    }
}

struct VNodeInner<N> {
    kind: VNodeKind,
    key: Option<Key>,
    data: Option<VNodeData<N>>,
    children: Option<Vec<VNode<N>>>,
    text: Option<String>,
    elm: RefCell<Option<N>>,
    parent: RefCell<Option<WeakVNode<N>>>,
    component: RefCell<Option<Rc<dyn ComponentInstance<N>>>>,
    pending_insert: RefCell<Vec<VNode<N>>>,
}

/// Handle to a virtual node.
pub struct VNode<N>(Rc<VNodeInner<N>>);

/// Non-owning handle, used for the placeholder link of component roots.
pub struct WeakVNode<N>(Weak<VNodeInner<N>>);

impl<N> WeakVNode<N> {
    pub fn upgrade(&self) -> Option<VNode<N>> {
        self.0.upgrade().map(VNode)
    }
}

impl<N> Clone for WeakVNode<N> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<N> Clone for VNode<N> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<N> VNode<N> {
    /// Start building an element.
    pub fn element(tag: impl Into<String>) -> VNodeBuilder<N> {
        VNodeBuilder::new(VNodeKind::Element(tag.into()))
    }

    /// Start building a component placeholder.
    pub fn component(tag: impl Into<String>) -> VNodeBuilder<N> {
        VNodeBuilder::new(VNodeKind::Component(tag.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        VNodeBuilder::new(VNodeKind::Text).text(text).build()
    }

    pub fn comment(text: impl Into<String>) -> Self {
        VNodeBuilder::new(VNodeKind::Comment).text(text).build()
    }

    pub fn empty() -> Self {
        VNodeBuilder::new(VNodeKind::Empty).text("").build()
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.0.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            VNodeKind::Element(tag) | VNodeKind::Component(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn data(&self) -> Option<&VNodeData<N>> {
        self.0.data.as_ref()
    }

    pub fn hooks(&self) -> Option<&VNodeHooks<N>> {
        self.0.data.as_ref().map(|data| &data.hooks)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.0.data.as_ref()?.attrs.get(name).map(String::as_str)
    }

    pub fn children(&self) -> Option<&[VNode<N>]> {
        self.0.children.as_deref()
    }

    pub fn text_content(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    /// The placeholder this node is the root of, if it renders a component.
    pub fn parent(&self) -> Option<VNode<N>> {
        self.0.parent.borrow().as_ref().and_then(WeakVNode::upgrade)
    }

    pub fn set_parent(&self, parent: Option<&VNode<N>>) {
        *self.0.parent.borrow_mut() = parent.map(VNode::downgrade);
    }

    pub fn component_instance(&self) -> Option<Rc<dyn ComponentInstance<N>>> {
        self.0.component.borrow().clone()
    }

    pub fn set_component_instance(&self, instance: Option<Rc<dyn ComponentInstance<N>>>) {
        *self.0.component.borrow_mut() = instance;
    }

    pub(crate) fn take_component_instance(&self) -> Option<Rc<dyn ComponentInstance<N>>> {
        self.0.component.borrow_mut().take()
    }

    pub(crate) fn set_pending_insert(&self, queue: Vec<VNode<N>>) {
        *self.0.pending_insert.borrow_mut() = queue;
    }

    pub(crate) fn take_pending_insert(&self) -> Vec<VNode<N>> {
        std::mem::take(&mut *self.0.pending_insert.borrow_mut())
    }

    pub fn ptr_eq(&self, other: &VNode<N>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakVNode<N> {
        WeakVNode(Rc::downgrade(&self.0))
    }

    /// Whether `self` and `other` may be patched in place rather than
    /// replaced: equal keys, compatible kinds, equal presence of data, and
    /// for `input` elements a compatible `type`.
    pub fn same_node(&self, other: &VNode<N>) -> bool {
        self.0.key == other.0.key
            && self.0.kind.compatible(&other.0.kind)
            && self.0.data.is_some() == other.0.data.is_some()
            && self.same_input_type(other)
    }

    fn same_input_type(&self, other: &VNode<N>) -> bool {
        if self.tag() != Some("input") {
            return true;
        }
        let a = self.attr("type");
        let b = other.attr("type");
        a == b || (is_text_input_type(a) && is_text_input_type(b))
    }
}

impl<N: Clone> VNode<N> {
    /// The realized backend node.
    pub fn elm(&self) -> Option<N> {
        self.0.elm.borrow().clone()
    }

    pub fn set_elm(&self, elm: Option<N>) {
        *self.0.elm.borrow_mut() = elm;
    }
}

fn is_text_input_type(ty: Option<&str>) -> bool {
    matches!(
        ty,
        Some("text" | "number" | "password" | "search" | "email" | "tel" | "url")
    )
}

impl<N: fmt::Debug + Clone> fmt::Debug for VNode<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("kind", &self.0.kind);
        if let Some(key) = &self.0.key {
            s.field("key", key);
        }
        if let Some(text) = &self.0.text {
            s.field("text", text);
        }
        if let Some(children) = &self.0.children {
            s.field("children", children);
        }
        s.field("elm", &self.elm()).finish()
    }
}

/// Builder for [`VNode`].
pub struct VNodeBuilder<N> {
    kind: VNodeKind,
    key: Option<Key>,
    data: Option<VNodeData<N>>,
    children: Option<Vec<VNode<N>>>,
    text: Option<String>,
}

impl<N> VNodeBuilder<N> {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            data: None,
            children: None,
            text: None,
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach an (empty) data payload.
    pub fn with_data(mut self) -> Self {
        self.data_mut();
        self
    }

    fn data_mut(&mut self) -> &mut VNodeData<N> {
        self.data.get_or_insert_with(VNodeData::default)
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data_mut().attrs.insert(name.into(), value.into());
        self
    }

    pub fn attrs<K, V>(mut self, attrs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let data = self.data_mut();
        for (name, value) in attrs {
            data.attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Edit the hooks in place.
    pub fn hooks(mut self, edit: impl FnOnce(&mut VNodeHooks<N>)) -> Self {
        edit(&mut self.data_mut().hooks);
        self
    }

    pub fn ref_binding(mut self, binding: RefBinding<N>) -> Self {
        self.data_mut().ref_binding = Some(binding);
        self
    }

    pub fn raw_markup(mut self, markup: impl Into<String>) -> Self {
        self.data_mut().raw_markup = Some(markup.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.data_mut().keep_alive = keep_alive;
        self
    }

    pub fn child(mut self, child: impl Into<VNode<N>>) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child.into());
        self
    }

    pub fn children<C>(mut self, children: impl IntoIterator<Item = C>) -> Self
    where
        C: Into<VNode<N>>,
    {
        self.children
            .get_or_insert_with(Vec::new)
            .extend(children.into_iter().map(Into::into));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn build(self) -> VNode<N> {
        VNode(Rc::new(VNodeInner {
            kind: self.kind,
            key: self.key,
            data: self.data,
            children: self.children,
            text: self.text,
            elm: RefCell::new(None),
            parent: RefCell::new(None),
            component: RefCell::new(None),
            pending_insert: RefCell::new(Vec::new()),
        }))
    }
}

impl<N> From<VNodeBuilder<N>> for VNode<N> {
    fn from(builder: VNodeBuilder<N>) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Node = VNode<u32>;

    #[test]
    fn keys_and_kinds_decide_sameness() {
        let a: Node = VNode::element("li").key("a").build();
        let a2: Node = VNode::element("li").key("a").build();
        let b: Node = VNode::element("li").key("b").build();
        let p: Node = VNode::element("p").key("a").build();

        assert!(a.same_node(&a2));
        assert!(!a.same_node(&b));
        assert!(!a.same_node(&p));
        assert!(!a.ptr_eq(&a2));
    }

    #[test]
    fn data_presence_must_match() {
        let bare: Node = VNode::element("div").build();
        let with_data: Node = VNode::element("div").attr("id", "x").build();
        assert!(!bare.same_node(&with_data));
    }

    #[test]
    fn comments_and_empty_nodes_are_interchangeable() {
        let comment: Node = VNode::comment("if");
        let empty: Node = VNode::empty();
        let text: Node = VNode::text("if");

        assert!(comment.same_node(&empty));
        assert!(!comment.same_node(&text));
    }

    #[test]
    fn element_and_component_with_same_tag_differ() {
        let element: Node = VNode::element("card").build();
        let component: Node = VNode::component("card").build();
        assert!(!element.same_node(&component));
    }

    #[test]
    fn text_like_inputs_are_compatible() {
        let input = |ty: &str| -> Node { VNode::element("input").attr("type", ty).build() };

        assert!(input("text").same_node(&input("email")));
        assert!(input("checkbox").same_node(&input("checkbox")));
        assert!(!input("text").same_node(&input("checkbox")));
    }

    #[test]
    fn placeholder_link_is_weak() {
        let root: Node = VNode::element("div").build();
        {
            let placeholder: Node = VNode::component("child").build();
            root.set_parent(Some(&placeholder));
            assert!(root.parent().is_some_and(|p| p.ptr_eq(&placeholder)));
        }
        assert!(root.parent().is_none());
    }

    #[test]
    fn integer_keys_display() {
        assert_eq!(Key::from(3).to_string(), "3");
        assert_eq!(Key::from("row").to_string(), "row");
    }
}
