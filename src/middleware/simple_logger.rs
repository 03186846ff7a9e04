use crate::{
    middleware::{Middleware, NotifyNext, SetNext},
    NotifyReport, State, Store,
};
use std::fmt::Debug;

/// The [log] level at which a logging middleware writes its records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Warn,
    Info,
}

impl LogLevel {
    /// Write `message` to the [log] facade at this level.
    pub fn log<S: AsRef<str>>(&self, message: S) {
        match self {
            LogLevel::Trace => log::trace!("{}", message.as_ref()),
            LogLevel::Debug => log::debug!("{}", message.as_ref()),
            LogLevel::Warn => log::warn!("{}", message.as_ref()),
            LogLevel::Info => log::info!("{}", message.as_ref()),
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

/// Logs every patch applied to a [Store], with the state before and
/// after it, and the outcome of the notification pass which follows.
pub struct SimpleLoggerMiddleware {
    log_level: LogLevel,
}

impl SimpleLoggerMiddleware {
    pub fn new() -> Self {
        SimpleLoggerMiddleware {
            log_level: LogLevel::default(),
        }
    }

    /// Set the level at which this middleware logs, [LogLevel::Debug]
    /// by default.
    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Default for SimpleLoggerMiddleware {
    fn default() -> Self {
        SimpleLoggerMiddleware::new()
    }
}

impl<S> Middleware<S> for SimpleLoggerMiddleware
where
    S: State + Debug,
    S::Patch: Debug,
{
    fn on_set(&self, store: &Store<S>, patch: S::Patch, next: SetNext<'_, S>) {
        self.log_level.log(format!("prev state: {:?}", store.get()));
        self.log_level.log(format!("patch: {:?}", patch));

        next.run(store, patch);

        self.log_level.log(format!("next state: {:?}", store.get()));
    }

    fn on_notify(&self, store: &Store<S>, next: NotifyNext<'_, S>) -> NotifyReport {
        let report = next.run(store);
        self.log_level.log(format!(
            "notified: {}, panicked: {}",
            report.notified, report.panicked
        ));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, SimpleLoggerMiddleware};
    use crate::Store;
    use std::{cell::Cell, collections::BTreeMap, rc::Rc};

    #[test]
    fn logger_passes_patch_through() {
        let store = Store::new(BTreeMap::new());
        store.add_middleware(SimpleLoggerMiddleware::new().log_level(LogLevel::Info));

        let count = Rc::new(Cell::new(0));
        let count_copy = count.clone();
        let _s = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        let mut patch = BTreeMap::new();
        patch.insert("first", "Ann".to_string());
        store.set(patch);

        assert_eq!(store.get()["first"], "Ann");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn logs_at_debug_by_default() {
        assert_eq!(SimpleLoggerMiddleware::new().log_level, LogLevel::Debug);
        assert_eq!(
            SimpleLoggerMiddleware::default().log_level(LogLevel::Trace).log_level,
            LogLevel::Trace
        );
    }
}
