//! Integration Tests for the Reactive System
//!
//! These tests verify that signals, memos, effects, watchers and the
//! scheduler work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::config::{self, Config};
use trellis_core::error::{self, Diagnostic, Error, ErrorReporter, Phase};
use trellis_core::reactive::{untracked, Effect, Memo, Signal, SubscriberId, Watch};
use trellis_core::scheduler::tick::{self, run_until_idle};
use trellis_core::scheduler::{self, TokioDeferrer};

#[derive(Default)]
struct Recorder {
    errors: RefCell<Vec<(String, Phase)>>,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl ErrorReporter for Recorder {
    fn report(&self, error: &Error, _source: Option<SubscriberId>, phase: Phase) {
        self.errors.borrow_mut().push((error.to_string(), phase));
    }

    fn diagnostic(&self, diagnostic: &Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic.clone());
    }
}

fn record() -> Rc<Recorder> {
    let recorder = Rc::new(Recorder::default());
    error::set_reporter(recorder.clone());
    recorder
}

/// Test that any number of writes in one synchronous stretch re-run an
/// effect once.
#[test]
fn writes_are_batched_into_one_flush() {
    let a = Signal::new(1);
    let b = Signal::new(2);
    let runs = Rc::new(Cell::new(0));
    let seen = Rc::new(Cell::new(0));

    let (ra, rb, counter, sum) = (a.clone(), b.clone(), runs.clone(), seen.clone());
    let _effect = Effect::new(move || {
        counter.set(counter.get() + 1);
        sum.set(ra.get() + rb.get());
    });
    assert_eq!(runs.get(), 1);

    a.set(10);
    b.set(20);
    a.set(30);
    assert_eq!(runs.get(), 1, "nothing runs before the flush");
    assert_eq!(scheduler::pending_len(), 1);

    run_until_idle();
    assert_eq!(runs.get(), 2);
    assert_eq!(seen.get(), 50);
}

/// Test that a memo chain invalidates without any manual bookkeeping.
#[test]
fn memo_chain_recomputes_after_a_write() {
    let base = Signal::new(5);
    let computed = Rc::new(Cell::new(0));

    let source = base.clone();
    let counter = computed.clone();
    let doubled = Memo::new(move || {
        counter.set(counter.get() + 1);
        source.get() * 2
    });
    let inner = doubled.clone();
    let plus_ten = Memo::new(move || inner.get().unwrap_or_default() + 10);

    assert_eq!(plus_ten.get(), Some(20));
    assert_eq!(plus_ten.get(), Some(20));
    assert_eq!(computed.get(), 1);

    base.set(10);
    assert_eq!(plus_ten.get(), Some(30));
    assert_eq!(doubled.get(), Some(20));
    assert_eq!(computed.get(), 2);
}

/// Test that an effect reading a memo re-runs when the memo's input changes.
#[test]
fn effect_sees_memo_inputs() {
    let count = Signal::new(1);
    let source = count.clone();
    let squared = Memo::new(move || source.get() * source.get());

    let seen = Rc::new(Cell::new(0));
    let sink = seen.clone();
    let memo = squared.clone();
    let _effect = Effect::new(move || sink.set(memo.get().unwrap_or_default()));
    assert_eq!(seen.get(), 1);

    count.set(4);
    run_until_idle();
    assert_eq!(seen.get(), 16);
}

/// Test that subscribers created first run first, whatever order they were
/// queued in.
#[test]
fn parent_runs_before_child() {
    let parent_input = Signal::new(0);
    let child_input = Signal::new(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let (input, out) = (parent_input.clone(), log.clone());
    let _parent = Effect::new(move || {
        input.get();
        out.borrow_mut().push("parent");
    });
    let (input, out) = (child_input.clone(), log.clone());
    let _child = Effect::new(move || {
        input.get();
        out.borrow_mut().push("child");
    });
    log.borrow_mut().clear();

    child_input.set(1);
    parent_input.set(1);
    run_until_idle();

    assert_eq!(*log.borrow(), vec!["parent", "child"]);
}

/// Test that dependencies follow the branch the computation took.
#[test]
fn dependencies_follow_the_taken_branch() {
    let use_left = Signal::new(true);
    let left = Signal::new("l");
    let right = Signal::new("r");
    let runs = Rc::new(Cell::new(0));

    let (flag, l, r, counter) = (use_left.clone(), left.clone(), right.clone(), runs.clone());
    let effect = Effect::new(move || {
        counter.set(counter.get() + 1);
        if flag.get() {
            l.get();
        } else {
            r.get();
        }
    });
    assert_eq!(effect.dependency_count(), 2);

    right.set("r2");
    run_until_idle();
    assert_eq!(runs.get(), 1);

    use_left.set(false);
    run_until_idle();
    assert_eq!(runs.get(), 2);

    left.set("l2");
    run_until_idle();
    assert_eq!(runs.get(), 2);
    assert_eq!(left.subscriber_count(), 0);
}

/// Test that reads inside `untracked` create no dependency.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Signal::new(0);
    let ignored = Signal::new(0);
    let runs = Rc::new(Cell::new(0));

    let (t, i, counter) = (tracked.clone(), ignored.clone(), runs.clone());
    let _effect = Effect::new(move || {
        counter.set(counter.get() + 1);
        t.get();
        untracked(|| i.get());
    });

    ignored.set(1);
    run_until_idle();
    assert_eq!(runs.get(), 1);

    tracked.set(1);
    run_until_idle();
    assert_eq!(runs.get(), 2);
}

/// Test that a watcher hands over new and old values and skips no-op
/// changes.
#[test]
fn watcher_reports_transitions() {
    let count = Signal::new(1);
    let transitions = Rc::new(RefCell::new(Vec::new()));

    let source = count.clone();
    let out = transitions.clone();
    let watch = Watch::new(
        move || source.get() % 3,
        move |new: &i32, old: Option<&i32>| out.borrow_mut().push((*new, old.copied())),
    );

    count.set(2);
    run_until_idle();
    count.set(5);
    run_until_idle();
    count.set(6);
    run_until_idle();

    assert_eq!(*transitions.borrow(), vec![(2, Some(1)), (0, Some(2))]);
    assert_eq!(watch.value(), Some(0));
}

/// Test that a failing effect is reported once per run and keeps reacting.
#[test]
fn failing_effect_is_reported_and_survives() {
    let recorder = record();
    let input = Signal::new(0);
    let runs = Rc::new(Cell::new(0));

    let (source, counter) = (input.clone(), runs.clone());
    let _effect = Effect::try_new(move || {
        counter.set(counter.get() + 1);
        if source.get() == 1 {
            return Err(Error::msg("odd input"));
        }
        Ok(())
    });

    input.set(1);
    run_until_idle();
    assert_eq!(
        *recorder.errors.borrow(),
        vec![("odd input".to_owned(), Phase::Effect)]
    );

    input.set(2);
    run_until_idle();
    assert_eq!(runs.get(), 3);
    assert_eq!(recorder.errors.borrow().len(), 1);
}

/// Test that a watcher feeding its own source is halted with one
/// diagnostic while the rest of the flush still runs.
#[test]
fn self_feeding_watcher_is_halted() {
    let recorder = record();
    let count = Signal::new(0);
    let other = Signal::new(0);
    let bystander_runs = Rc::new(Cell::new(0));

    let (source, target) = (count.clone(), count.clone());
    let _runaway = Watch::new(move || source.get(), move |new: &i32, _old: Option<&i32>| {
        target.set(*new + 1)
    });
    let (input, counter) = (other.clone(), bystander_runs.clone());
    let _bystander = Effect::new(move || {
        input.get();
        counter.set(counter.get() + 1);
    });

    count.set(1);
    other.set(1);
    run_until_idle();

    let runaway = recorder
        .diagnostics
        .borrow()
        .iter()
        .filter(|d| matches!(d, Diagnostic::RunawayUpdate { .. }))
        .count();
    assert_eq!(runaway, 1);
    assert_eq!(bystander_runs.get(), 2);
    assert!(!scheduler::is_flushing());
}

/// Test that with deferral off every write flushes inline.
#[test]
fn synchronous_mode_flushes_inline() {
    let sync = Config {
        async_flush: false,
        ..config::current()
    };
    config::with(sync, || {
        let count = Signal::new(0);
        let seen = Rc::new(Cell::new(-1));
        let (source, sink) = (count.clone(), seen.clone());
        let _effect = Effect::new(move || sink.set(source.get()));

        count.set(7);
        assert_eq!(seen.get(), 7);
        assert!(!tick::is_pending());
    });
}

/// Test that a disposed effect no longer runs.
#[test]
fn disposed_effect_does_not_run() {
    let count = Signal::new(0);
    let runs = Rc::new(Cell::new(0));

    let (source, counter) = (count.clone(), runs.clone());
    let effect = Effect::new(move || {
        source.get();
        counter.set(counter.get() + 1);
    });
    effect.dispose();

    count.set(1);
    run_until_idle();
    effect.schedule();
    run_until_idle();

    assert!(effect.is_disposed());
    assert_eq!(runs.get(), 1);
}

/// Test that flushes driven by the tokio deferrer run without manual
/// draining.
#[tokio::test]
async fn tokio_deferrer_drives_flushes() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            tick::set_deferrer(Rc::new(TokioDeferrer));

            let count = Signal::new(0);
            let seen = Rc::new(Cell::new(0));
            let (source, sink) = (count.clone(), seen.clone());
            let _effect = Effect::new(move || sink.set(source.get()));

            count.set(3);
            tick::tick().await;
            assert_eq!(seen.get(), 3);
        })
        .await;
}
