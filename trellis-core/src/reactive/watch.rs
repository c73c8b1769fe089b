//! Watchers
//!
//! A [`Watch`] pairs a tracked source expression with an untracked change
//! callback. The source re-runs whenever something it read changes; the
//! callback runs only when the produced value differs from the previous one,
//! receiving both.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId, SubscriberOptions};
use crate::error::Result;

/// Options for [`Watch::with_options`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Run the callback once with the initial value, without an old value.
    pub immediate: bool,
    pub subscriber: SubscriberOptions,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            subscriber: SubscriberOptions::user(),
        }
    }
}

/// A user watcher.
pub struct Watch<T> {
    subscriber: Subscriber,
    value: Rc<RefCell<Option<T>>>,
}

impl<T: Clone + PartialEq + 'static> Watch<T> {
    /// Watch `source`, calling `callback(new, old)` when its value changes.
    pub fn new<S, C>(mut source: S, mut callback: C) -> Self
    where
        S: FnMut() -> T + 'static,
        C: FnMut(&T, Option<&T>) + 'static,
    {
        Self::with_options(
            WatchOptions::default(),
            move || Ok(source()),
            move |new, old| {
                callback(new, old);
                Ok(())
            },
        )
    }

    /// Watch with explicit options and fallible closures.
    ///
    /// The source runs immediately to capture the initial value.
    pub fn with_options<S, C>(options: WatchOptions, mut source: S, mut callback: C) -> Self
    where
        S: FnMut() -> Result<T> + 'static,
        C: FnMut(&T, Option<&T>) -> Result<()> + 'static,
    {
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let staged: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let primed = Rc::new(Cell::new(false));

        let into = staged.clone();
        let subscriber = Subscriber::new(options.subscriber, move || {
            *into.borrow_mut() = Some(source()?);
            Ok(())
        });

        let immediate = options.immediate;
        let current = value.clone();
        subscriber.set_callback(move || {
            let Some(next) = staged.borrow_mut().take() else {
                return Ok(());
            };

            if !primed.replace(true) {
                *current.borrow_mut() = Some(next.clone());
                return if immediate { callback(&next, None) } else { Ok(()) };
            }

            let old = current.borrow_mut().replace(next.clone());
            if old.as_ref() == Some(&next) {
                return Ok(());
            }
            callback(&next, old.as_ref())
        });

        subscriber.evaluate();
        Self { subscriber, value }
    }

    /// The last value produced by the source.
    pub fn value(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

impl<T> Watch<T> {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Stop watching.
    pub fn stop(&self) {
        self.subscriber.teardown();
    }
}

impl<T> Clone for Watch<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("subscriber", &self.subscriber.id())
            .field("value", &*self.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use crate::scheduler::tick;

    type Log = Rc<RefCell<Vec<(i32, Option<i32>)>>>;

    fn recorder() -> (Log, impl FnMut(&i32, Option<&i32>) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &i32, old: Option<&i32>| {
            sink.borrow_mut().push((*new, old.copied()))
        })
    }

    #[test]
    fn callback_receives_new_and_old() {
        let count = Signal::new(1);
        let reader = count.clone();
        let (log, cb) = recorder();
        let watch = Watch::new(move || reader.get(), cb);

        assert!(log.borrow().is_empty());
        assert_eq!(watch.value(), Some(1));

        count.set(2);
        tick::run_until_idle();
        assert_eq!(*log.borrow(), vec![(2, Some(1))]);
    }

    #[test]
    fn equal_values_do_not_fire() {
        let count = Signal::new(4);
        let reader = count.clone();
        let (log, cb) = recorder();
        let _watch = Watch::new(move || reader.get() / 2, cb);

        count.set(5);
        tick::run_until_idle();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn immediate_fires_with_the_initial_value() {
        let count = Signal::new(9);
        let reader = count.clone();
        let (log, mut cb) = recorder();
        let _watch = Watch::with_options(
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
            move || Ok(reader.get()),
            move |new, old| {
                cb(new, old);
                Ok(())
            },
        );

        assert_eq!(*log.borrow(), vec![(9, None)]);
    }

    #[test]
    fn stopped_watch_is_silent() {
        let count = Signal::new(0);
        let reader = count.clone();
        let (log, cb) = recorder();
        let watch = Watch::new(move || reader.get(), cb);

        watch.stop();
        count.set(1);
        tick::run_until_idle();
        assert!(log.borrow().is_empty());
    }
}
