//! Update Scheduler
//!
//! The scheduler batches subscriber re-evaluations. Any number of changes
//! made in one synchronous stretch queue each affected subscriber once, and
//! a single flush runs them later.
//!
//! # Algorithm
//!
//! 1. `enqueue` deduplicates by subscriber ID. The first enqueue of a cycle
//!    schedules a flush through [`next_tick`](super::tick::next_tick).
//!
//! 2. `flush` sorts the queue: non-`post` subscribers before `post` ones,
//!    then ascending ID. IDs follow creation order, so a parent view renders
//!    before its children, and a child destroyed by its parent's render is
//!    skipped because it is no longer active.
//!
//! 3. Subscribers enqueued while the flush runs are spliced into the
//!    unprocessed part of the queue at their ID position. The loop re-reads
//!    the queue length on every step.
//!
//! 4. A subscriber that lands back in the queue more than
//!    `Config::max_update_count` times in one flush is halted for the rest of
//!    that flush and reported once. The rest of the queue keeps running.
//!
//! 5. After the loop: activated hooks in enqueue order, after-update hooks
//!    in reverse order, then listener slot compaction.
//!
//! The state lives in a thread-local and is never borrowed while a
//! subscriber or hook runs, so they may freely enqueue more work.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use super::tick;
use crate::config;
use crate::error::{self, Diagnostic};
use crate::reactive::{cleanup_deps, ReactiveContext, Subscriber, SubscriberId};

/// A kept-alive component that was re-inserted during a flush.
pub trait Activate {
    fn set_inactive(&self, inactive: bool);

    /// Fire the component's activated hooks.
    fn activate(&self);
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Subscriber>,
    has: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, u32>,
    halted: HashSet<SubscriberId>,
    activated: Vec<Rc<dyn Activate>>,
    waiting: bool,
    flushing: bool,
    index: usize,
    timestamp: Option<Instant>,
}

impl SchedulerState {
    fn reset(&mut self) -> (Vec<Rc<dyn Activate>>, Vec<Subscriber>) {
        let activated = std::mem::take(&mut self.activated);
        let updated = std::mem::take(&mut self.queue);
        self.has.clear();
        self.circular.clear();
        self.halted.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
        (activated, updated)
    }
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue a subscriber for the next flush.
pub fn enqueue(subscriber: Subscriber) {
    if !subscriber.is_active() {
        return;
    }
    let id = subscriber.id();
    let schedule = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.has.contains(&id) || state.halted.contains(&id) {
            return false;
        }
        if subscriber.options().no_recurse && ReactiveContext::current_subscriber() == Some(id) {
            return false;
        }

        state.has.insert(id);
        if !state.flushing || state.queue.is_empty() {
            state.queue.push(subscriber);
        } else {
            let mut i = state.queue.len() - 1;
            while i > state.index && state.queue[i].id() > id {
                i -= 1;
            }
            state.queue.insert(i + 1, subscriber);
        }
        tracing::trace!(subscriber = id.raw(), "enqueue");

        !std::mem::replace(&mut state.waiting, true)
    });

    if schedule {
        if config::current().async_flush {
            tick::next_tick(|| {
                flush();
                Ok(())
            });
        } else {
            flush();
        }
    }
}

fn by_flush_order(a: &Subscriber, b: &Subscriber) -> std::cmp::Ordering {
    (a.options().post, a.id()).cmp(&(b.options().post, b.id()))
}

/// Run every queued subscriber.
pub fn flush() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.timestamp = Some(Instant::now());
        state.flushing = true;
        state.queue.sort_by(by_flush_order);
    });

    let max_updates = config::current().max_update_count;
    let mut index = 0;

    loop {
        let next = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.index = index;
            let subscriber = state.queue.get(index)?.clone();
            Some((!state.halted.contains(&subscriber.id())).then_some(subscriber))
        });

        let subscriber = match next {
            None => break,
            // Halted earlier in this flush.
            Some(None) => {
                index += 1;
                continue;
            }
            Some(Some(subscriber)) => subscriber,
        };
        let id = subscriber.id();

        if subscriber.is_active() {
            subscriber.run_before();
        }
        STATE.with(|state| state.borrow_mut().has.remove(&id));

        subscriber.evaluate();

        let runaway = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return None;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            let count = *count;
            if count > max_updates {
                state.halted.insert(id);
                Some(count)
            } else {
                None
            }
        });

        if let Some(count) = runaway {
            error::warn(Diagnostic::RunawayUpdate {
                subscriber: id,
                label: subscriber.label().map(str::to_owned),
                count,
            });
        }

        index += 1;
    }

    let (activated, updated) = STATE.with(|state| state.borrow_mut().reset());
    tracing::debug!(
        ran = updated.len(),
        activated = activated.len(),
        "flush complete"
    );

    for component in &activated {
        component.set_inactive(true);
        component.activate();
    }

    let mut seen = HashSet::new();
    for subscriber in updated.iter().rev() {
        if subscriber.is_active() && subscriber.has_after() && seen.insert(subscriber.id()) {
            subscriber.run_after();
        }
    }

    cleanup_deps();
}

/// Record a kept-alive component that was re-inserted during a flush.
///
/// Its activated hooks run after the flush, once the whole tree is patched.
pub fn queue_activated(component: Rc<dyn Activate>) {
    component.set_inactive(false);
    STATE.with(|state| state.borrow_mut().activated.push(component));
}

/// Whether a flush is running.
pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// When the current (or last) flush started.
pub fn current_flush_timestamp() -> Option<Instant> {
    STATE.with(|state| state.borrow().timestamp)
}

/// Number of queued subscribers, including ones already run this flush.
pub fn pending_len() -> usize {
    STATE.with(|state| state.borrow().queue.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{Error, ErrorReporter, Phase};
    use crate::reactive::{Signal, SubscriberOptions};
    use crate::scheduler::tick::run_until_idle;
    use std::cell::Cell;

    fn logging(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
        options: SubscriberOptions,
    ) -> Subscriber {
        let log = log.clone();
        Subscriber::new(options, move || {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn enqueue_deduplicates_until_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = logging(&log, "a", SubscriberOptions::user());

        enqueue(sub.clone());
        enqueue(sub.clone());
        enqueue(sub);
        assert_eq!(pending_len(), 1);

        run_until_idle();
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(pending_len(), 0);
        assert!(!is_flushing());
    }

    #[test]
    fn torn_down_subscribers_are_not_queued() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = logging(&log, "gone", SubscriberOptions::user());
        sub.teardown();

        enqueue(sub.clone());
        sub.update();
        assert_eq!(pending_len(), 0);

        run_until_idle();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn flush_orders_by_id_then_post() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let post = logging(&log, "post", SubscriberOptions::user().post(true));
        let first = logging(&log, "first", SubscriberOptions::user());
        let second = logging(&log, "second", SubscriberOptions::user());

        enqueue(second);
        enqueue(post);
        enqueue(first);

        run_until_idle();
        assert_eq!(*log.borrow(), vec!["first", "second", "post"]);
        assert!(current_flush_timestamp().is_some());
    }

    #[test]
    fn enqueue_during_flush_splices_by_id() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = logging(&log, "late", SubscriberOptions::user());
        let trigger = {
            let log = log.clone();
            let late = late.clone();
            Subscriber::new(SubscriberOptions::user(), move || {
                log.borrow_mut().push("trigger");
                assert!(is_flushing());
                enqueue(late.clone());
                Ok(())
            })
        };
        let last = logging(&log, "last", SubscriberOptions::user());

        enqueue(last);
        enqueue(trigger);
        run_until_idle();

        // `late` was created before `last` and runs ahead of it.
        assert_eq!(*log.borrow(), vec!["trigger", "late", "last"]);
    }

    #[test]
    fn sync_mode_flushes_inline() {
        config::with(
            Config {
                async_flush: false,
                ..config::current()
            },
            || {
                let log = Rc::new(RefCell::new(Vec::new()));
                enqueue(logging(&log, "now", SubscriberOptions::user()));
                assert_eq!(*log.borrow(), vec!["now"]);
            },
        );
    }

    struct Diagnostics(RefCell<Vec<Diagnostic>>);

    impl ErrorReporter for Diagnostics {
        fn report(&self, _error: &Error, _source: Option<SubscriberId>, _phase: Phase) {}

        fn diagnostic(&self, diagnostic: &Diagnostic) {
            self.0.borrow_mut().push(diagnostic.clone());
        }
    }

    #[test]
    fn runaway_subscriber_is_halted_once() {
        let reporter = Rc::new(Diagnostics(RefCell::new(Vec::new())));
        let previous = error::set_reporter(reporter.clone());

        let counter = Signal::new(0);
        let (reader, writer) = (counter.clone(), counter.clone());
        let runaway = Subscriber::new(SubscriberOptions::user().label("loop"), move || {
            let v = reader.get();
            writer.set(v + 1);
            Ok(())
        });
        runaway.evaluate();

        let bystander_runs = Rc::new(Cell::new(0));
        let runs = bystander_runs.clone();
        let bystander = Subscriber::new(SubscriberOptions::user(), move || {
            runs.set(runs.get() + 1);
            Ok(())
        });

        enqueue(bystander);
        counter.set(100);
        run_until_idle();

        error::set_reporter(previous);
        let diagnostics = reporter.0.borrow();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::RunawayUpdate { label: Some(label), count: 101, .. } if label == "loop"
        ));
        assert_eq!(bystander_runs.get(), 1);
        assert!(!is_flushing());
    }

    struct Kept {
        inactive: Cell<bool>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Activate for Kept {
        fn set_inactive(&self, inactive: bool) {
            self.inactive.set(inactive);
        }

        fn activate(&self) {
            self.log.borrow_mut().push("activated");
        }
    }

    #[test]
    fn activated_then_after_hooks_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let kept = Rc::new(Kept {
            inactive: Cell::new(true),
            log: log.clone(),
        });

        let parent = logging(&log, "parent", SubscriberOptions::render());
        let child = logging(&log, "child", SubscriberOptions::render());
        {
            let log = log.clone();
            parent.set_after(move || log.borrow_mut().push("parent updated"));
        }
        {
            let log = log.clone();
            let kept = kept.clone();
            child.set_after(move || log.borrow_mut().push("child updated"));
            child.set_before(move || queue_activated(kept.clone()));
        }

        enqueue(child);
        enqueue(parent);
        run_until_idle();

        assert_eq!(
            *log.borrow(),
            vec![
                "parent",
                "child",
                "activated",
                "child updated",
                "parent updated"
            ]
        );
        assert!(kept.inactive.get());
    }
}
