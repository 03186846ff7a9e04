//! [Middleware] used to modify the behaviour of a [Store] during a
//! [Store::set()]. This module also contains some simple middleware
//! implementations which can be used as utilities in an application.

#[cfg(feature = "diff_logger")]
pub mod diff_logger;
pub mod simple_logger;

use crate::{NotifyReport, State, Store};
use std::rc::Rc;

/// Executes subsequent middleware and then merges the patch into the
/// [Store] state.
pub struct SetNext<'a, S: State> {
    middleware: &'a [Rc<dyn Middleware<S>>],
}

impl<'a, S: State> SetNext<'a, S> {
    pub(crate) fn new(middleware: &'a [Rc<dyn Middleware<S>>]) -> Self {
        Self { middleware }
    }

    pub fn run(self, store: &Store<S>, patch: S::Patch) {
        match self.middleware.split_first() {
            Some((current, rest)) => current.on_set(store, patch, SetNext::new(rest)),
            None => store.apply(patch),
        }
    }
}

/// Executes subsequent middleware and then notifies the [Store]
/// subscribers.
pub struct NotifyNext<'a, S: State> {
    middleware: &'a [Rc<dyn Middleware<S>>],
}

impl<'a, S: State> NotifyNext<'a, S> {
    pub(crate) fn new(middleware: &'a [Rc<dyn Middleware<S>>]) -> Self {
        Self { middleware }
    }

    pub fn run(self, store: &Store<S>) -> NotifyReport {
        match self.middleware.split_first() {
            Some((current, rest)) => current.on_notify(store, NotifyNext::new(rest)),
            None => store.notify_subscribers(),
        }
    }
}

/// `Middleware` used to modify the behaviour of a [Store] during a
/// [Store::set()].
pub trait Middleware<S: State> {
    /// This method is invoked by the [Store] during a [Store::set()]
    /// before the patch is merged into the current state. Call
    /// `next.run(store, patch)` to execute subsequent middleware and
    /// install the merged state.
    ///
    /// This method allows modifying the patch in question, or even
    /// dropping it, in which case no new state is installed and the
    /// subscribers are not notified.
    fn on_set(&self, store: &Store<S>, patch: S::Patch, next: SetNext<'_, S>) {
        next.run(store, patch)
    }

    /// This method is invoked by the [Store] during a [Store::set()]
    /// after the new state has been installed, just before the
    /// subscribers are notified. Call `next.run(store)` to execute
    /// subsequent middleware and notify the subscribers.
    fn on_notify(&self, store: &Store<S>, next: NotifyNext<'_, S>) -> NotifyReport {
        next.run(store)
    }
}
