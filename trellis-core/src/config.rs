//! Runtime Configuration
//!
//! Process-wide defaults live behind a lock so any thread can set them
//! before it starts building views. Each thread takes a snapshot of the
//! defaults the first time it reads its configuration and may override it
//! afterwards; the reactive core itself is single-threaded, so the hot path
//! only touches the thread-local copy.

use std::cell::Cell;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables of the reactive core and the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defer scheduler flushes to the next tick. When off, every enqueue
    /// flushes inline and `Dep::notify` sorts listeners by id.
    pub async_flush: bool,

    /// How often one subscriber may re-enter the queue within a single
    /// flush before it is halted as a runaway update.
    pub max_update_count: u32,

    /// Verification checks: duplicate keys among siblings.
    pub dev_checks: bool,

    /// Suppress diagnostics in the default reporter.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            max_update_count: 100,
            dev_checks: cfg!(debug_assertions),
            silent: false,
        }
    }
}

impl Config {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

static DEFAULTS: OnceLock<RwLock<Config>> = OnceLock::new();

fn defaults() -> &'static RwLock<Config> {
    DEFAULTS.get_or_init(|| RwLock::new(Config::default()))
}

thread_local! {
    static CURRENT: Cell<Option<Config>> = const { Cell::new(None) };
}

/// Replace the process-wide defaults.
///
/// Threads that already read their configuration keep their snapshot.
pub fn set_defaults(config: Config) {
    *defaults().write() = config;
}

/// The configuration of the current thread.
pub fn current() -> Config {
    CURRENT.with(|slot| match slot.get() {
        Some(config) => config,
        None => {
            let config = *defaults().read();
            slot.set(Some(config));
            config
        }
    })
}

/// Override the configuration of the current thread.
pub fn set(config: Config) {
    CURRENT.with(|slot| slot.set(Some(config)));
}

/// Run `f` with a temporary configuration, restoring the previous one after.
pub fn with<R>(config: Config, f: impl FnOnce() -> R) -> R {
    struct Restore(Config);

    impl Drop for Restore {
        fn drop(&mut self) {
            set(self.0);
        }
    }

    let _restore = Restore(current());
    set(config);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = Config::from_json(r#"{ "max_update_count": 5 }"#).unwrap();
        assert_eq!(config.max_update_count, 5);
        assert!(config.async_flush);
        assert!(!config.silent);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Config::from_json("{ nope").is_err());
    }

    #[test]
    fn scoped_override_is_restored() {
        let before = current();
        let inner = with(
            Config {
                async_flush: false,
                ..before
            },
            || current().async_flush,
        );
        assert!(!inner);
        assert_eq!(current(), before);
    }
}
