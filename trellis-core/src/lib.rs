//! Trellis Core
//!
//! This crate provides the core runtime of the Trellis view engine.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects, watchers)
//! - A batching update scheduler with deferred flushes
//! - A virtual node model and a keyed reconciler
//! - Hydration of pre-rendered output
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: dependency tracking between state and computations
//! - `scheduler`: batching, ordering and deferral of re-evaluations
//! - `vdom`: virtual nodes, the reconciler and backends
//! - `view`: render functions bound to subscribers and placeholders
//! - `config` / `error`: runtime tunables, failures and diagnostics
//!
//! Everything is single-threaded: a reactive graph and the trees rendered
//! from it belong to the thread that built them.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use trellis_core::reactive::Signal;
//! use trellis_core::scheduler::tick;
//! use trellis_core::vdom::{MemoryDocument, Patcher, VNode};
//! use trellis_core::view::View;
//!
//! let doc = MemoryDocument::new();
//! let patcher = Rc::new(Patcher::new(Rc::new(doc.clone())));
//!
//! let count = Signal::new(0);
//! let source = count.clone();
//! let view = View::new(patcher, "counter", move |_props| {
//!     Ok(VNode::element("p").text(source.get().to_string()).build())
//! });
//! let el = view.mount(None, false).unwrap();
//!
//! count.set(5);
//! tick::run_until_idle();
//! assert_eq!(doc.markup(el), "<p>5</p>");
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod vdom;
pub mod view;

pub use config::Config;
pub use error::{Diagnostic, Error, ErrorReporter, Phase, Result};
