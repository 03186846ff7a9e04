use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

/// Identifies a single registration in a [SubscriptionRegistry].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// A wrapper for a zero argument callback which is notified of
/// changes to [Store](crate::Store) `State`.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn()>);

impl Callback {
    pub fn new<C: Fn() + 'static>(closure: C) -> Self {
        Callback(Rc::new(closure))
    }

    pub fn emit(&self) {
        (self.0)()
    }
}

impl<C> From<C> for Callback
where
    C: Fn() + 'static,
{
    fn from(closure: C) -> Self {
        Callback(Rc::new(closure))
    }
}

impl Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback(@ {:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

struct Entry {
    id: SubscriberId,
    /// Cleared on removal, so that a notification pass which already
    /// took its snapshot skips this entry.
    active: Cell<bool>,
    callback: Callback,
}

struct Registrations {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Rc<Entry>>>,
}

impl Registrations {
    fn remove(&self, id: SubscriberId) -> bool {
        // The entry is dropped after the borrow is released, its
        // callback may own subscriptions to this same registry.
        let (removed, remaining) = {
            let mut entries = self.entries.borrow_mut();
            let removed = entries
                .iter()
                .position(|entry| entry.id == id)
                .map(|index| entries.remove(index));
            (removed, entries.len())
        };

        match removed {
            Some(entry) => {
                entry.active.set(false);
                log::trace!("unsubscribed {:?}, {} subscriber(s) remain", id, remaining);
                true
            }
            None => false,
        }
    }
}

/// The outcome of a [SubscriptionRegistry::notify_all()] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Callbacks which ran to completion.
    pub notified: usize,
    /// Callbacks which panicked. Their panic was caught and logged.
    pub panicked: usize,
}

/// The set of callbacks registered with a [Store](crate::Store).
///
/// Registrations are notified in the order they were made. A
/// notification pass iterates over a snapshot of the registrations
/// taken when the pass starts, so callbacks may freely subscribe and
/// unsubscribe (or trigger nested passes) while it is running:
/// callbacks added during a pass are first notified by the next pass,
/// and callbacks removed during a pass are not invoked again, unless
/// they already ran.
pub struct SubscriptionRegistry {
    inner: Rc<Registrations>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Registrations {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register `callback`, returning the [Subscription] which removes
    /// exactly this registration.
    ///
    /// No deduplication occurs, subscribing the same callback twice
    /// produces two registrations which are notified independently.
    pub fn subscribe<C: Into<Callback>>(&self, callback: C) -> Subscription {
        let id = SubscriberId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let mut entries = self.inner.entries.borrow_mut();
        entries.push(Rc::new(Entry {
            id,
            active: Cell::new(true),
            callback: callback.into(),
        }));
        log::trace!("subscribed {:?}, {} subscriber(s)", id, entries.len());

        Subscription {
            id,
            registrations: Rc::downgrade(&self.inner),
        }
    }

    /// Invoke every registered callback, synchronously and in
    /// registration order.
    ///
    /// A callback which panics does not prevent the remaining
    /// callbacks from running: the panic is caught, logged, and
    /// counted in the returned [NotifyReport].
    pub fn notify_all(&self) -> NotifyReport {
        let snapshot: Vec<Rc<Entry>> = self.inner.entries.borrow().clone();
        let mut report = NotifyReport::default();

        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }

            let callback = &entry.callback;
            match panic::catch_unwind(AssertUnwindSafe(|| callback.emit())) {
                Ok(()) => report.notified += 1,
                Err(payload) => {
                    report.panicked += 1;
                    log::error!(
                        "subscriber {:?} panicked during notification: {}",
                        entry.id,
                        panic_message(&*payload)
                    );
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriptionRegistry{{subscribers: {}}}", self.len())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// The capability to remove one registration from a
/// [SubscriptionRegistry].
///
/// The registration is removed when [unsubscribe()](Subscription::unsubscribe())
/// is called or when this value is dropped, whichever happens first.
/// Removing it more than once has no effect. The subscription only
/// holds a weak reference to the registry, so it may outlive the
/// [Store](crate::Store) it came from.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriberId,
    registrations: Weak<Registrations>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove this registration. Calling this again, or after the
    /// store has been dropped, is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registrations) = self.registrations.upgrade() {
            registrations.remove(self.id);
        }
    }

    /// Returns `true` while the registration is still present in the
    /// registry.
    pub fn is_active(&self) -> bool {
        match self.registrations.upgrade() {
            Some(registrations) => registrations
                .entries
                .borrow()
                .iter()
                .any(|entry| entry.id == self.id),
            None => false,
        }
    }

    /// Keep the registration alive for as long as the registry lives,
    /// giving up the ability to remove it.
    pub fn forget(mut self) {
        self.registrations = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subscription({:?})", self.id)
    }
}
