//! Hydration
//!
//! Adopts a pre-rendered backend tree as the realization of a virtual tree
//! instead of creating it again. The two trees are walked in lockstep; the
//! first structural difference aborts the walk and the caller falls back
//! to a full render.

use super::backend::{Backend, NodeType};
use super::patch::{describe, raw_markup, Patcher};
use super::vnode::{VNode, VNodeKind};
use crate::error::Result;

impl<B: Backend + 'static> Patcher<B> {
    /// Adopt `elm` as the realization of `vnode`. Returns `false` on a
    /// mismatch, which has already been reported.
    pub(super) fn hydrate(
        &self,
        elm: &B::Node,
        vnode: &VNode<B::Node>,
        queue: &mut Vec<VNode<B::Node>>,
    ) -> Result<bool> {
        vnode.set_elm(Some(elm.clone()));

        if !self.node_matches(elm, vnode) {
            let found = self
                .backend
                .tag_name(elm)
                .unwrap_or_else(|| format!("{:?}", self.backend.node_type(elm)));
            return Ok(self.mismatch(format!("expected {}, found {found}", describe(vnode))));
        }

        if let Some(data) = vnode.data() {
            if let Some(init) = data.hooks.init.clone() {
                if let Some(instance) = init(vnode, true)? {
                    vnode.set_component_instance(Some(instance));
                }
            }
            if vnode.component_instance().is_some() {
                self.init_component(vnode, queue)?;
                return Ok(true);
            }
        }

        if vnode.kind().is_tagged() {
            let first = self.backend.first_child(elm);
            if let Some(markup) = raw_markup(vnode) {
                // Pre-rendered markup is trusted as is.
                if first.is_none() {
                    self.backend.set_inner_markup(elm, markup);
                }
            } else if let Some(children) = vnode.children() {
                match first {
                    None => self.create_children(vnode, elm, queue)?,
                    Some(first) => {
                        let mut cursor = Some(first);
                        for child in children {
                            let Some(node) = cursor else {
                                return Ok(self.mismatch(format!(
                                    "{} has fewer children than expected",
                                    describe(vnode)
                                )));
                            };
                            if !self.hydrate(&node, child, queue)? {
                                return Ok(false);
                            }
                            cursor = self.backend.next_sibling_of(&node);
                        }
                        if cursor.is_some() {
                            return Ok(self.mismatch(format!(
                                "{} has more children than expected",
                                describe(vnode)
                            )));
                        }
                    }
                }
            } else if let Some(text) = vnode.text_content() {
                match first {
                    None => {
                        let node = self.backend.create_text(text);
                        self.backend.append_child(elm, &node);
                    }
                    Some(node)
                        if self.backend.node_type(&node) == NodeType::Text
                            && self.backend.next_sibling_of(&node).is_none() =>
                    {
                        if self.backend.text_of(&node).as_deref() != Some(text) {
                            self.backend.set_text_content(&node, text);
                        }
                    }
                    Some(_) => {
                        return Ok(self.mismatch(format!(
                            "{} should hold only the text {text:?}",
                            describe(vnode)
                        )));
                    }
                }
            }

            // Attributes are pre-rendered; hooks and refs are not.
            if vnode.data().is_some_and(|data| data.needs_create_hooks()) {
                self.invoke_create_hooks(vnode, queue)?;
            }
        } else if let Some(text) = vnode.text_content() {
            if self.backend.text_of(elm).as_deref() != Some(text) {
                self.backend.set_text_content(elm, text);
            }
        }

        Ok(true)
    }

    fn node_matches(&self, elm: &B::Node, vnode: &VNode<B::Node>) -> bool {
        match vnode.kind() {
            VNodeKind::Component(_) => true,
            VNodeKind::Element(tag) => self
                .backend
                .tag_name(elm)
                .is_some_and(|found| found.eq_ignore_ascii_case(tag)),
            VNodeKind::Text => self.backend.node_type(elm) == NodeType::Text,
            VNodeKind::Comment | VNodeKind::Empty => {
                self.backend.node_type(elm) == NodeType::Comment
            }
        }
    }
}
