//! Errors and Diagnostics
//!
//! Two kinds of problems flow out of the core:
//!
//! - [`Error`]: something failed. A computation returned an error, a
//!   component could not be created, a config document did not parse.
//!   Failures inside a subscriber are caught by the subscriber and forwarded
//!   to the installed [`ErrorReporter`] together with the [`Phase`] they
//!   happened in; they never unwind through the scheduler.
//!
//! - [`Diagnostic`]: something suspicious happened but the core recovered
//!   on its own (runaway updates, hydration mismatches, duplicate keys).
//!   These are reported, never corrected.
//!
//! The reporter is a per-thread collaborator. The default one logs through
//! `tracing`; hosts and tests install their own with [`set_reporter`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::config;
use crate::reactive::SubscriberId;

/// Errors produced by the reactive core and the reconciler.
#[derive(Error, Debug)]
pub enum Error {
    /// A user computation (render function, watcher, hook) failed.
    #[error("{0}")]
    Message(String),

    /// A component placeholder could not be realized.
    #[error("component <{tag}> failed: {reason}")]
    Component { tag: String, reason: String },

    /// A node that should already have a backend node does not.
    #[error("virtual node `{0}` has no realized backend node")]
    UnrealizedNode(String),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A mutation log could not be encoded.
    #[error("failed to encode patch stream: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A mutation log could not be decoded.
    #[error("failed to decode patch stream: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl Error {
    /// Build an [`Error::Message`] from anything printable.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::Message(message.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where a reported failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A render subscriber (view update).
    Render,
    /// The source expression of a user watcher.
    Watcher,
    /// The change callback of a user watcher.
    WatcherCallback,
    /// A lazy computed value.
    Computed,
    /// An eager effect.
    Effect,
    /// A deferred callback.
    NextTick,
    /// A lifecycle hook.
    Hook(&'static str),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Render => f.write_str("render"),
            Phase::Watcher => f.write_str("watcher getter"),
            Phase::WatcherCallback => f.write_str("watcher callback"),
            Phase::Computed => f.write_str("computed getter"),
            Phase::Effect => f.write_str("effect"),
            Phase::NextTick => f.write_str("nextTick"),
            Phase::Hook(name) => write!(f, "{name} hook"),
        }
    }
}

/// A recovered anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A subscriber kept re-scheduling itself inside one flush and was halted.
    RunawayUpdate {
        subscriber: SubscriberId,
        label: Option<String>,
        count: u32,
    },
    /// A pre-rendered backend tree did not match the virtual tree.
    HydrationMismatch { detail: String },
    /// Two siblings share a key.
    DuplicateKey { key: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RunawayUpdate { label: Some(label), count, .. } => {
                write!(f, "possible infinite update loop in `{label}` ({count} re-entries in one flush)")
            }
            Diagnostic::RunawayUpdate { subscriber, count, .. } => write!(
                f,
                "possible infinite update loop in subscriber {} ({count} re-entries in one flush)",
                subscriber.raw()
            ),
            Diagnostic::HydrationMismatch { detail } => write!(
                f,
                "hydration mismatch ({detail}); bailing hydration and performing a full render"
            ),
            Diagnostic::DuplicateKey { key } => {
                write!(f, "duplicate key `{key}` among siblings; this may cause an update error")
            }
        }
    }
}

/// Sink for failures and diagnostics.
pub trait ErrorReporter {
    /// Report a failure caught inside the core.
    fn report(&self, error: &Error, source: Option<SubscriberId>, phase: Phase);

    /// Report a recovered anomaly.
    fn diagnostic(&self, diagnostic: &Diagnostic) {
        if !config::current().silent {
            tracing::warn!(target: "trellis", "{diagnostic}");
        }
    }
}

/// Reporter that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &Error, source: Option<SubscriberId>, phase: Phase) {
        match source {
            Some(id) => tracing::error!(target: "trellis", subscriber = id.raw(), %phase, "{error}"),
            None => tracing::error!(target: "trellis", %phase, "{error}"),
        }
    }
}

thread_local! {
    static REPORTER: RefCell<Rc<dyn ErrorReporter>> = RefCell::new(Rc::new(TracingReporter));
}

/// Install a reporter for the current thread, returning the previous one.
pub fn set_reporter(reporter: Rc<dyn ErrorReporter>) -> Rc<dyn ErrorReporter> {
    REPORTER.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), reporter))
}

/// Forward a failure to the current reporter.
pub fn report(error: &Error, source: Option<SubscriberId>, phase: Phase) {
    // Clone out so a reporter may itself swap reporters.
    let reporter = REPORTER.with(|slot| slot.borrow().clone());
    reporter.report(error, source, phase);
}

/// Forward a diagnostic to the current reporter.
pub fn warn(diagnostic: Diagnostic) {
    let reporter = REPORTER.with(|slot| slot.borrow().clone());
    reporter.diagnostic(&diagnostic);
}
