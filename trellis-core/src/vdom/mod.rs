//! Virtual Tree and Reconciler
//!
//! - `vnode`: the virtual node model and the same-node predicate.
//! - `hooks` / `module`: the extension points reconciliation calls into.
//! - `patch` / `hydrate`: the reconciler and pre-rendered tree adoption.
//! - `refs`: named references to realized nodes.
//! - `backend` / `memory` / `wire`: the output side.

mod backend;
mod hooks;
mod hydrate;
mod memory;
mod module;
mod patch;
pub mod refs;
mod vnode;
pub mod wire;

pub use backend::{Backend, NodeType};
pub use hooks::{ComponentInstance, InitHook, NodeHook, PatchHook, RemoveHook, VNodeHooks};
pub use memory::{MemoryDocument, NodeId, OpStats};
pub use module::{Module, RemovalJoin};
pub use patch::Patcher;
pub use refs::{RefBinding, RefModule, RefTarget, RefValue, Refs};
pub use vnode::{Key, VNode, VNodeBuilder, VNodeData, VNodeKind, WeakVNode};
pub use wire::DomOp;
