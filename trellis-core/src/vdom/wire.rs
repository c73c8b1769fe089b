//! Mutation Stream
//!
//! [`MemoryDocument`](super::MemoryDocument) records every mutation as a
//! [`DomOp`]. The log can be shipped to a remote renderer as MessagePack and
//! replayed there with a [`Mirror`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::backend::Backend;
use super::memory::{MemoryDocument, NodeId};
use crate::error::{Error, Result};

/// One backend mutation. Nodes are named by their raw ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomOp {
    CreateElement { id: u64, tag: String },
    CreateText { id: u64, text: String },
    CreateComment { id: u64, text: String },
    InsertBefore { parent: u64, node: u64, reference: Option<u64> },
    AppendChild { parent: u64, node: u64 },
    RemoveChild { parent: u64, node: u64 },
    SetTextContent { node: u64, text: String },
    SetInnerMarkup { node: u64, markup: String },
}

/// Encode a mutation log as MessagePack.
pub fn encode_ops(ops: &[DomOp]) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(ops)?)
}

/// Decode a mutation log produced by [`encode_ops`].
pub fn decode_ops(bytes: &[u8]) -> Result<Vec<DomOp>> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Replays a mutation log onto a local document.
///
/// Remote ids are mapped to the mirror's own nodes as they are created.
/// Nodes that existed before the log started (the mount point, usually)
/// are introduced with [`bind`](Self::bind).
pub struct Mirror {
    doc: MemoryDocument,
    ids: HashMap<u64, NodeId>,
}

impl Mirror {
    pub fn new(doc: MemoryDocument) -> Self {
        Self {
            doc,
            ids: HashMap::new(),
        }
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.doc
    }

    /// Map a remote id to an existing local node.
    pub fn bind(&mut self, remote: u64, local: NodeId) {
        self.ids.insert(remote, local);
    }

    /// The local node a remote id maps to.
    pub fn local(&self, remote: u64) -> Option<NodeId> {
        self.ids.get(&remote).copied()
    }

    pub fn apply(&mut self, ops: &[DomOp]) -> Result<()> {
        for op in ops {
            self.apply_one(op)?;
        }
        Ok(())
    }

    fn apply_one(&mut self, op: &DomOp) -> Result<()> {
        match op {
            DomOp::CreateElement { id, tag } => {
                let node = self.doc.create_element(tag);
                self.ids.insert(*id, node);
            }
            DomOp::CreateText { id, text } => {
                let node = self.doc.create_text(text);
                self.ids.insert(*id, node);
            }
            DomOp::CreateComment { id, text } => {
                let node = self.doc.create_comment(text);
                self.ids.insert(*id, node);
            }
            DomOp::InsertBefore {
                parent,
                node,
                reference,
            } => {
                let reference = reference.map(|id| self.resolve(id)).transpose()?;
                self.doc
                    .insert_before(&self.resolve(*parent)?, &self.resolve(*node)?, reference.as_ref());
            }
            DomOp::AppendChild { parent, node } => {
                self.doc
                    .append_child(&self.resolve(*parent)?, &self.resolve(*node)?);
            }
            DomOp::RemoveChild { parent, node } => {
                self.doc
                    .remove_child(&self.resolve(*parent)?, &self.resolve(*node)?);
            }
            DomOp::SetTextContent { node, text } => {
                self.doc.set_text_content(&self.resolve(*node)?, text);
            }
            DomOp::SetInnerMarkup { node, markup } => {
                self.doc.set_inner_markup(&self.resolve(*node)?, markup);
            }
        }
        Ok(())
    }

    fn resolve(&self, remote: u64) -> Result<NodeId> {
        self.local(remote)
            .ok_or_else(|| Error::msg(format!("mutation refers to unknown node {remote}")))
    }
}
