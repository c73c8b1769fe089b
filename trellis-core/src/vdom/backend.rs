//! Backend Contract
//!
//! The reconciler never touches a real node tree directly. Everything it
//! does to the output goes through a [`Backend`]: a handful of mutations and
//! the read-only queries hydration needs.

use std::fmt::Debug;

/// Coarse type of a backend node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    Comment,
}

/// Host node operations.
///
/// Handles are cheap to clone and compare by identity.
pub trait Backend {
    type Node: Clone + PartialEq + Debug + 'static;

    fn create_element(&self, tag: &str) -> Self::Node;

    fn create_text(&self, text: &str) -> Self::Node;

    fn create_comment(&self, text: &str) -> Self::Node;

    /// Insert `node` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. An attached `node` is moved.
    fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);

    fn remove_child(&self, parent: &Self::Node, node: &Self::Node);

    fn append_child(&self, parent: &Self::Node, node: &Self::Node);

    fn parent_of(&self, node: &Self::Node) -> Option<Self::Node>;

    fn next_sibling_of(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Replace the node's content with a single text run.
    fn set_text_content(&self, node: &Self::Node, text: &str);

    /// Fill an element from pre-rendered markup.
    fn set_inner_markup(&self, node: &Self::Node, markup: &str) {
        self.set_text_content(node, markup);
    }

    fn node_type(&self, node: &Self::Node) -> NodeType;

    /// Tag name of an element; `None` for text and comments.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Content of a text or comment node.
    fn text_of(&self, node: &Self::Node) -> Option<String>;
}
