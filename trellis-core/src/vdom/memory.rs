//! In-Memory Document
//!
//! A headless [`Backend`] holding its node tree in a slot map. Every
//! mutation is counted in [`OpStats`] and appended to a [`DomOp`] log, which
//! makes it the backend of choice for tests and for hosts that render
//! remotely.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use slotmap::{new_key_type, Key, SlotMap};

use super::backend::{Backend, NodeType};
use super::wire::DomOp;

new_key_type! {
    pub struct NodeId;
}

impl NodeId {
    /// Raw id, as used in the mutation log.
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

#[derive(Debug, Clone)]
enum Content {
    Element { tag: String, markup: Option<String> },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct DocNode {
    content: Content,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub creates: usize,
    /// Detached nodes put into a parent.
    pub inserts: usize,
    /// Attached nodes put somewhere else.
    pub moves: usize,
    pub removes: usize,
    /// Text and markup replacements.
    pub text_updates: usize,
}

impl OpStats {
    pub fn total(&self) -> usize {
        self.creates + self.inserts + self.moves + self.removes + self.text_updates
    }
}

#[derive(Default)]
struct Document {
    nodes: SlotMap<NodeId, DocNode>,
    log: Vec<DomOp>,
    log_paused: bool,
    stats: OpStats,
}

impl Document {
    fn create(&mut self, content: Content) -> NodeId {
        self.stats.creates += 1;
        self.nodes.insert(DocNode {
            content,
            parent: None,
            children: Vec::new(),
        })
    }

    fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|&child| child != node);
        }
        true
    }

    fn place(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        if self.detach(node) {
            self.stats.moves += 1;
        } else {
            self.stats.inserts += 1;
        }
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return;
        };
        let at = reference
            .and_then(|reference| parent_node.children.iter().position(|&c| c == reference))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(at, node);
        if let Some(child) = self.nodes.get_mut(node) {
            child.parent = Some(parent);
        }
    }

    fn replace_children(&mut self, node: NodeId) {
        let children = match self.nodes.get_mut(node) {
            Some(n) => std::mem::take(&mut n.children),
            None => return,
        };
        for child in children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        match &n.content {
            Content::Element { tag, markup } => {
                let _ = write!(out, "<{tag}>");
                match markup {
                    Some(markup) => out.push_str(markup),
                    None => {
                        for &child in &n.children {
                            self.write_markup(child, out);
                        }
                    }
                }
                let _ = write!(out, "</{tag}>");
            }
            Content::Text(text) => out.push_str(text),
            Content::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
        }
    }
}

/// Shared handle to an in-memory document.
#[derive(Clone, Default)]
pub struct MemoryDocument(Rc<RefCell<Document>>);

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> OpStats {
        self.0.borrow().stats
    }

    pub fn reset_stats(&self) {
        self.0.borrow_mut().stats = OpStats::default();
    }

    /// Turn the mutation log on or off. It is on for a new document and
    /// grows until drained with [`take_log`](Self::take_log), so hosts that
    /// never stream mutations should turn it off. Turning it off drops
    /// whatever was recorded.
    pub fn set_recording(&self, on: bool) {
        let mut doc = self.0.borrow_mut();
        doc.log_paused = !on;
        if !on {
            doc.log = Vec::new();
        }
    }

    pub fn is_recording(&self) -> bool {
        !self.0.borrow().log_paused
    }

    /// Drain the mutation log.
    pub fn take_log(&self) -> Vec<DomOp> {
        std::mem::take(&mut self.0.borrow_mut().log)
    }

    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Serialize a subtree. Text is written verbatim.
    pub fn markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.0.borrow().write_markup(node, &mut out);
        out
    }

    /// Number of nodes ever created and not reclaimed.
    pub fn node_count(&self) -> usize {
        self.0.borrow().nodes.len()
    }

    fn record(&self, op: DomOp) {
        let mut doc = self.0.borrow_mut();
        if !doc.log_paused {
            doc.log.push(op);
        }
    }
}

impl Backend for MemoryDocument {
    type Node = NodeId;

    fn create_element(&self, tag: &str) -> NodeId {
        let id = self.0.borrow_mut().create(Content::Element {
            tag: tag.to_owned(),
            markup: None,
        });
        self.record(DomOp::CreateElement {
            id: id.to_raw(),
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text(&self, text: &str) -> NodeId {
        let id = self.0.borrow_mut().create(Content::Text(text.to_owned()));
        self.record(DomOp::CreateText {
            id: id.to_raw(),
            text: text.to_owned(),
        });
        id
    }

    fn create_comment(&self, text: &str) -> NodeId {
        let id = self.0.borrow_mut().create(Content::Comment(text.to_owned()));
        self.record(DomOp::CreateComment {
            id: id.to_raw(),
            text: text.to_owned(),
        });
        id
    }

    fn insert_before(&self, parent: &NodeId, node: &NodeId, reference: Option<&NodeId>) {
        self.0.borrow_mut().place(*parent, *node, reference.copied());
        self.record(DomOp::InsertBefore {
            parent: parent.to_raw(),
            node: node.to_raw(),
            reference: reference.map(|r| r.to_raw()),
        });
    }

    fn remove_child(&self, parent: &NodeId, node: &NodeId) {
        {
            let mut doc = self.0.borrow_mut();
            if doc.nodes.get(*node).and_then(|n| n.parent) != Some(*parent) {
                return;
            }
            doc.detach(*node);
            doc.stats.removes += 1;
        }
        self.record(DomOp::RemoveChild {
            parent: parent.to_raw(),
            node: node.to_raw(),
        });
    }

    fn append_child(&self, parent: &NodeId, node: &NodeId) {
        self.0.borrow_mut().place(*parent, *node, None);
        self.record(DomOp::AppendChild {
            parent: parent.to_raw(),
            node: node.to_raw(),
        });
    }

    fn parent_of(&self, node: &NodeId) -> Option<NodeId> {
        self.0.borrow().nodes.get(*node)?.parent
    }

    fn next_sibling_of(&self, node: &NodeId) -> Option<NodeId> {
        let doc = self.0.borrow();
        let parent = doc.nodes.get(*node)?.parent?;
        let siblings = &doc.nodes.get(parent)?.children;
        let at = siblings.iter().position(|c| c == node)?;
        siblings.get(at + 1).copied()
    }

    fn set_text_content(&self, node: &NodeId, text: &str) {
        {
            let mut doc = self.0.borrow_mut();
            doc.stats.text_updates += 1;
            let content = doc.nodes.get(*node).map(|n| n.content.clone());
            match content {
                Some(Content::Element { tag, .. }) => {
                    doc.replace_children(*node);
                    if let Some(n) = doc.nodes.get_mut(*node) {
                        n.content = Content::Element { tag, markup: None };
                    }
                    if !text.is_empty() {
                        let child = doc.nodes.insert(DocNode {
                            content: Content::Text(text.to_owned()),
                            parent: Some(*node),
                            children: Vec::new(),
                        });
                        if let Some(n) = doc.nodes.get_mut(*node) {
                            n.children.push(child);
                        }
                    }
                }
                Some(Content::Text(_)) => {
                    if let Some(n) = doc.nodes.get_mut(*node) {
                        n.content = Content::Text(text.to_owned());
                    }
                }
                Some(Content::Comment(_)) => {
                    if let Some(n) = doc.nodes.get_mut(*node) {
                        n.content = Content::Comment(text.to_owned());
                    }
                }
                None => {}
            }
        }
        self.record(DomOp::SetTextContent {
            node: node.to_raw(),
            text: text.to_owned(),
        });
    }

    fn set_inner_markup(&self, node: &NodeId, markup: &str) {
        {
            let mut doc = self.0.borrow_mut();
            doc.stats.text_updates += 1;
            doc.replace_children(*node);
            if let Some(n) = doc.nodes.get_mut(*node) {
                if let Content::Element { markup: slot, .. } = &mut n.content {
                    *slot = Some(markup.to_owned());
                }
            }
        }
        self.record(DomOp::SetInnerMarkup {
            node: node.to_raw(),
            markup: markup.to_owned(),
        });
    }

    fn node_type(&self, node: &NodeId) -> NodeType {
        match self.0.borrow().nodes.get(*node).map(|n| &n.content) {
            Some(Content::Text(_)) => NodeType::Text,
            Some(Content::Comment(_)) => NodeType::Comment,
            _ => NodeType::Element,
        }
    }

    fn tag_name(&self, node: &NodeId) -> Option<String> {
        match &self.0.borrow().nodes.get(*node)?.content {
            Content::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    fn first_child(&self, node: &NodeId) -> Option<NodeId> {
        self.0.borrow().nodes.get(*node)?.children.first().copied()
    }

    fn text_of(&self, node: &NodeId) -> Option<String> {
        match &self.0.borrow().nodes.get(*node)?.content {
            Content::Text(text) | Content::Comment(text) => Some(text.clone()),
            Content::Element { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserting_an_attached_node_counts_as_a_move() {
        let doc = MemoryDocument::new();
        let ul = doc.create_element("ul");
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.append_child(&ul, &a);
        doc.append_child(&ul, &b);
        doc.reset_stats();

        doc.insert_before(&ul, &b, Some(&a));

        assert_eq!(doc.children_of(ul), vec![b, a]);
        assert_eq!(
            doc.stats(),
            OpStats {
                moves: 1,
                ..OpStats::default()
            }
        );
        assert_eq!(doc.next_sibling_of(&b), Some(a));
        assert_eq!(doc.next_sibling_of(&a), None);
    }

    #[test]
    fn text_content_replaces_element_children() {
        let doc = MemoryDocument::new();
        let p = doc.create_element("p");
        let span = doc.create_element("span");
        doc.append_child(&p, &span);

        doc.set_text_content(&p, "plain");

        assert_eq!(doc.markup(p), "<p>plain</p>");
        assert_eq!(doc.parent_of(&span), None);
    }

    #[test]
    fn removing_from_the_wrong_parent_is_ignored() {
        let doc = MemoryDocument::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let child = doc.create_comment("x");
        doc.append_child(&a, &child);
        doc.reset_stats();

        doc.remove_child(&b, &child);
        assert_eq!(doc.parent_of(&child), Some(a));
        assert_eq!(doc.stats().removes, 0);

        doc.remove_child(&a, &child);
        assert_eq!(doc.parent_of(&child), None);
        assert_eq!(doc.stats().removes, 1);
    }

    #[test]
    fn inspection_for_hydration() {
        let doc = MemoryDocument::new();
        let div = doc.create_element("DIV");
        let comment = doc.create_comment("v-if");
        doc.append_child(&div, &comment);

        assert_eq!(doc.tag_name(&div).as_deref(), Some("DIV"));
        assert_eq!(doc.node_type(&comment), NodeType::Comment);
        assert_eq!(doc.first_child(&div), Some(comment));
        assert_eq!(doc.text_of(&comment).as_deref(), Some("v-if"));
        assert_eq!(doc.markup(div), "<DIV><!--v-if--></DIV>");
    }

    #[test]
    fn paused_log_records_nothing() {
        let doc = MemoryDocument::new();
        let div = doc.create_element("div");
        doc.set_recording(false);
        assert!(doc.take_log().is_empty());

        let text = doc.create_text("quiet");
        doc.append_child(&div, &text);
        assert!(!doc.is_recording());
        assert!(doc.take_log().is_empty());
        assert_eq!(doc.stats().creates, 2);

        doc.set_recording(true);
        doc.remove_child(&div, &text);
        assert_eq!(doc.take_log().len(), 1);
    }

    #[test]
    fn raw_ids_round_trip() {
        let doc = MemoryDocument::new();
        let node = doc.create_element("div");
        assert_eq!(NodeId::from_raw(node.to_raw()), node);
    }
}
