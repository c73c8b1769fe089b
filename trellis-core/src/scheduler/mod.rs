//! Update Scheduling
//!
//! - `queue`: batches, orders and runs subscriber re-evaluations.
//! - `tick`: the deferred-callback queue the flush is scheduled on.

mod queue;
pub mod tick;

pub use queue::{
    current_flush_timestamp, enqueue, flush, is_flushing, pending_len, queue_activated, Activate,
};
pub use tick::{next_tick, Deferrer, ManualDeferrer, TokioDeferrer};
