//! Deferred Callbacks
//!
//! `next_tick` queues a callback to run after the current synchronous work.
//! Callbacks run in FIFO order in rounds: a round drains the callbacks that
//! were queued when it started, and anything queued while it runs waits for
//! the next round.
//!
//! When the first callback of a round is queued, the installed [`Deferrer`]
//! is asked to call [`drain`] later. The default [`ManualDeferrer`] leaves
//! that to the host, which drains explicitly ([`drain`] or
//! [`run_until_idle`]). [`TokioDeferrer`] spawns the drain on the current
//! `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::error::{self, Phase, Result};

type Callback = Box<dyn FnOnce() -> Result<()>>;

/// Schedules the drain of the callback queue.
pub trait Deferrer {
    /// Arrange for `drain` to be called once the current work yields.
    fn defer(&self, drain: fn());
}

/// Never schedules anything; the host drains the queue itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDeferrer;

impl Deferrer for ManualDeferrer {
    fn defer(&self, _drain: fn()) {}
}

/// Drains on a local tokio task.
///
/// Must be used from inside a `tokio::task::LocalSet`, since the reactive
/// graph is not `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDeferrer;

impl Deferrer for TokioDeferrer {
    fn defer(&self, drain: fn()) {
        tokio::task::spawn_local(async move { drain() });
    }
}

thread_local! {
    static CALLBACKS: RefCell<Vec<Callback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static DEFERRER: RefCell<Rc<dyn Deferrer>> = RefCell::new(Rc::new(ManualDeferrer));
}

/// Install a deferrer for the current thread, returning the previous one.
pub fn set_deferrer(deferrer: Rc<dyn Deferrer>) -> Rc<dyn Deferrer> {
    DEFERRER.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), deferrer))
}

/// Queue `callback` for the next round.
///
/// An error returned by the callback is reported, not propagated.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() -> Result<()> + 'static,
{
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));

    if !PENDING.with(|pending| pending.replace(true)) {
        let deferrer = DEFERRER.with(|slot| slot.borrow().clone());
        deferrer.defer(drain);
    }
}

/// A future that resolves after the next round has run.
pub fn tick() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
        Ok(())
    });
    async move {
        let _ = rx.await;
    }
}

/// Run one round of callbacks.
pub fn drain() {
    PENDING.with(|pending| pending.set(false));
    let batch = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));
    if batch.is_empty() {
        return;
    }

    tracing::trace!(callbacks = batch.len(), "draining tick queue");
    for callback in batch {
        if let Err(err) = callback() {
            error::report(&err, None, Phase::NextTick);
        }
    }
}

/// Drain rounds until nothing is queued.
pub fn run_until_idle() {
    while is_pending() {
        drain();
    }
}

/// Whether callbacks are waiting to run.
pub fn is_pending() -> bool {
    CALLBACKS.with(|callbacks| !callbacks.borrow().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn callbacks_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            next_tick(move || {
                log.borrow_mut().push(i);
                Ok(())
            });
        }
        assert!(log.borrow().is_empty());

        drain();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!is_pending());
    }

    #[test]
    fn callbacks_queued_during_a_round_wait_for_the_next() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = log.clone();
        next_tick(move || {
            outer.borrow_mut().push("first");
            let inner = outer.clone();
            next_tick(move || {
                inner.borrow_mut().push("second");
                Ok(())
            });
            Ok(())
        });

        drain();
        assert_eq!(*log.borrow(), vec!["first"]);
        assert!(is_pending());

        run_until_idle();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn failing_callback_does_not_stop_the_round() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        next_tick(|| Err(Error::msg("boom")));
        next_tick(move || {
            flag.set(true);
            Ok(())
        });

        drain();
        assert!(ran.get());
    }

    struct Counting(Rc<Cell<usize>>);

    impl Deferrer for Counting {
        fn defer(&self, _drain: fn()) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn deferrer_is_asked_once_per_round() {
        let asked = Rc::new(Cell::new(0));
        let previous = set_deferrer(Rc::new(Counting(asked.clone())));

        next_tick(|| Ok(()));
        next_tick(|| Ok(()));
        assert_eq!(asked.get(), 1);

        drain();
        next_tick(|| Ok(()));
        assert_eq!(asked.get(), 2);

        drain();
        set_deferrer(previous);
    }

    #[tokio::test]
    async fn tokio_deferrer_drains_on_the_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let previous = set_deferrer(Rc::new(TokioDeferrer));
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                next_tick(move || {
                    flag.set(true);
                    Ok(())
                });

                tick().await;
                assert!(ran.get());
                set_deferrer(previous);
            })
            .await;
    }
}
