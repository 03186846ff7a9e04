//! Logging [Middleware](crate::middleware::Middleware) which
//! publishes only the fields changed by each
//! [Store::set()](crate::Store::set()), computed with `serde-diff`
//! and rendered as JSON.

use super::{simple_logger::LogLevel, Middleware, SetNext};
use crate::{State, Store};
use serde_diff::{Diff, SerdeDiff};

/// Logs the difference between the previous and the next state of a
/// [Store] for every patch applied to it.
pub struct DiffLoggerMiddleware {
    log_level: LogLevel,
}

impl DiffLoggerMiddleware {
    pub fn new() -> Self {
        Self {
            log_level: LogLevel::default(),
        }
    }

    /// Set the level at which the diffs from this middleware will be
    /// logged.
    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Default for DiffLoggerMiddleware {
    fn default() -> Self {
        DiffLoggerMiddleware::new()
    }
}

/// Render the changes between `prev` and `next` as a JSON string.
pub fn diff_json<S: SerdeDiff>(prev: &S, next: &S) -> serde_json::Result<String> {
    serde_json::to_string(&Diff::serializable(prev, next))
}

impl<S> Middleware<S> for DiffLoggerMiddleware
where
    S: State + SerdeDiff,
{
    fn on_set(&self, store: &Store<S>, patch: S::Patch, next: SetNext<'_, S>) {
        let prev_state = store.get();
        next.run(store, patch);
        let next_state = store.get();

        match diff_json(&*prev_state, &*next_state) {
            Ok(diff) => self.log_level.log(format!("state diff: {}", diff)),
            Err(error) => log::warn!("unable to serialize state diff: {}", error),
        }
    }
}
