//! Effects
//!
//! An [`Effect`] is a user subscriber without a callback: its function is
//! the side effect. It runs once on creation to collect what it reads, then
//! again on the scheduler's next flush after any of that changes (or inline,
//! for `sync` effects). Every run rebuilds the read set, so a branch that is
//! no longer taken stops triggering it.
//!
//! Unlike a [`Memo`](super::Memo), an effect is eager and keeps no value.
//! Writes it makes to its own inputs do not queue it again.

use std::fmt;

use super::subscriber::{Subscriber, SubscriberId, SubscriberOptions};
use crate::error::Result;

/// Handle to an eager side effect.
///
/// Dropping every handle stops the effect.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let reader = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", reader.get());
/// });
///
/// count.set(5);
/// scheduler::tick::run_until_idle();  // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    subscriber: Subscriber,
}

impl Effect {
    /// Start an effect. `run` is called right away.
    pub fn new<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::try_new(move || {
            run();
            Ok(())
        })
    }

    /// Create an effect whose function may fail.
    ///
    /// Failures are reported and the effect keeps reacting.
    pub fn try_new<F>(run: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        Self::with_options(SubscriberOptions::user(), run)
    }

    /// Create an effect with explicit options (`sync`, `post`, a label).
    pub fn with_options<F>(options: SubscriberOptions, run: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        let effect = Self::lazy_with_options(options, run);
        effect.execute();
        effect
    }

    /// An effect that tracks nothing until the first [`execute`](Self::execute).
    pub fn new_lazy<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::lazy_with_options(SubscriberOptions::user(), move || {
            run();
            Ok(())
        })
    }

    fn lazy_with_options<F>(options: SubscriberOptions, run: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        // An effect writing to its own input must not queue itself again.
        let options = options.no_recurse(true);
        Self {
            subscriber: Subscriber::new(options, run),
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// The underlying subscriber.
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Run the effect now, re-tracking its dependencies.
    pub fn execute(&self) {
        self.subscriber.evaluate();
    }

    /// Schedule the effect to re-run, as if a dependency changed.
    pub fn schedule(&self) {
        self.subscriber.update();
    }

    /// Stop the effect and drop its dependencies. Idempotent.
    pub fn dispose(&self) {
        self.subscriber.teardown();
    }

    pub fn is_disposed(&self) -> bool {
        !self.subscriber.is_active()
    }

    /// Completed runs, failed ones included.
    pub fn run_count(&self) -> usize {
        self.subscriber.run_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber", &self.subscriber.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use crate::scheduler::tick;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();

        let _effect = Effect::new(move || counter.set(counter.get() + 1));

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn lazy_effect_tracks_nothing_until_executed() {
        let count = Signal::new(0);
        let reader = count.clone();
        let lazy = Effect::new_lazy(move || {
            reader.get();
        });
        assert_eq!((lazy.run_count(), count.subscriber_count()), (0, 0));

        lazy.execute();
        assert_eq!((lazy.run_count(), count.subscriber_count()), (1, 1));
    }

    #[test]
    fn changes_are_batched_until_the_queue_drains() {
        let count = Signal::new(0);
        let reader = count.clone();
        let seen = Rc::new(Cell::new(-1));
        let out = seen.clone();

        let effect = Effect::new(move || out.set(reader.get()));
        assert_eq!(effect.run_count(), 1);

        count.set(1);
        count.set(2);
        count.set(3);
        assert_eq!(effect.run_count(), 1);

        tick::run_until_idle();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn sync_effect_runs_inline() {
        let count = Signal::new(0);
        let reader = count.clone();
        let effect = Effect::with_options(SubscriberOptions::user().sync(true), move || {
            reader.get();
            Ok(())
        });

        count.set(1);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let count = Signal::new(0);
        let reader = count.clone();
        let effect = Effect::with_options(SubscriberOptions::user().sync(true), move || {
            reader.get();
            Ok(())
        });

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(count.subscriber_count(), 0);

        count.set(1);
        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn handles_share_one_subscriber() {
        let first = Effect::new(|| {});
        let second = first.clone();
        assert_eq!(first.subscriber_id(), second.subscriber_id());

        second.dispose();
        first.schedule();
        tick::run_until_idle();

        assert!(first.is_disposed());
        assert_eq!(first.run_count(), 1);
    }
}
