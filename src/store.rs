use crate::{
    middleware::{Middleware, NotifyNext, SetNext},
    Callback, NotifyReport, State, Subscription, SubscriptionRegistry,
};
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    ops::Deref,
    rc::{Rc, Weak},
};

/// Owns the current state snapshot of a [Store].
struct StateCell<S> {
    current: RefCell<Rc<S>>,
    /// Incremented every time a new snapshot is installed.
    version: Cell<u64>,
}

impl<S> StateCell<S> {
    fn new(initial: S) -> Self {
        Self {
            current: RefCell::new(Rc::new(initial)),
            version: Cell::new(0),
        }
    }

    fn get(&self) -> Rc<S> {
        self.current.borrow().clone()
    }

    fn replace(&self, next: S) {
        // The previous snapshot is dropped outside of the borrow.
        let _previous = self.current.replace(Rc::new(next));
        self.version.set(self.version.get() + 1);
    }

    fn version(&self) -> u64 {
        self.version.get()
    }
}

/// A wrapper for an [Rc] reference to a [Store].
///
/// This is the handle which gets passed around an application (see
/// [Scope](crate::Scope)) and held by
/// [SelectorBinding](crate::SelectorBinding)s. Two `StoreRef`s are
/// equal when they refer to the same store.
pub struct StoreRef<S: State>(Rc<Store<S>>);

impl<S: State> StoreRef<S> {
    pub fn new(initial: S) -> Self {
        Self(Rc::new(Store::new(initial)))
    }

    pub fn from_store(store: Store<S>) -> Self {
        Self(Rc::new(store))
    }

    pub fn downgrade(&self) -> Weak<Store<S>> {
        Rc::downgrade(&self.0)
    }
}

impl<S: State> Clone for StoreRef<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: State> Deref for StoreRef<S> {
    type Target = Store<S>;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl<S: State> PartialEq for StoreRef<S> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<S: State> Eq for StoreRef<S> {}

impl<S: State> Debug for StoreRef<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreRef(@ {:p})", Rc::as_ptr(&self.0))
    }
}

/// A container for a single shared `State` record, which notifies its
/// subscribers whenever the record is replaced.
///
/// The current state ([Store::get()]) can only be modified with
/// [Store::set()], which shallow merges a `Patch` into the current
/// state to produce a new snapshot (see [State]). The previous
/// snapshot is never mutated and remains valid for anyone holding it.
///
/// Every call to [Store::set()] is followed by one synchronous
/// notification pass over the callbacks registered with
/// [Store::subscribe()]. Callbacks are free to read the store, write
/// to it (which runs a nested set and notification pass before
/// returning), subscribe or unsubscribe.
pub struct Store<S: State> {
    state: StateCell<S>,
    subscribers: SubscriptionRegistry,
    /// Middleware which modifies the functionality of this store.
    middleware: RefCell<Vec<Rc<dyn Middleware<S>>>>,
}

impl<S: State> Store<S> {
    /// Create a new [Store] holding the `initial` state.
    pub fn new(initial: S) -> Self {
        Self {
            state: StateCell::new(initial),
            subscribers: SubscriptionRegistry::new(),
            middleware: RefCell::new(Vec::new()),
        }
    }

    /// Get the current `State` snapshot stored in this store.
    pub fn get(&self) -> Rc<S> {
        self.state.get()
    }

    /// The number of snapshots installed since this store was
    /// created.
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Shallow merge `patch` into the current state, install the
    /// result as the new current state and notify every subscriber.
    ///
    /// Both steps complete before this returns. [Middleware] on this
    /// store runs around each of them, in the order it was added. If
    /// a middleware swallows the patch, so that no new state is
    /// installed, subscribers are not notified.
    pub fn set(&self, patch: S::Patch) {
        let middleware: Vec<Rc<dyn Middleware<S>>> = self.middleware.borrow().clone();
        let version = self.state.version();

        SetNext::new(&middleware).run(self, patch);

        if self.state.version() == version {
            log::trace!("set installed no new state, subscribers not notified");
            return;
        }

        let report = NotifyNext::new(&middleware).run(self);
        log::trace!(
            "set v{}: notified {} subscriber(s), {} panicked",
            version + 1,
            report.notified,
            report.panicked
        );
    }

    /// Register a callback to be invoked after every [Store::set()].
    ///
    /// The returned [Subscription] unsubscribes the callback when it is
    /// dropped, or when [Subscription::unsubscribe()] is called.
    pub fn subscribe<C: Into<Callback>>(&self, callback: C) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Add [Middleware] to modify the behaviour of this [Store]. It
    /// takes effect from the next call to [Store::set()].
    pub fn add_middleware<M: Middleware<S> + 'static>(&self, middleware: M) {
        self.middleware.borrow_mut().push(Rc::new(middleware));
    }

    /// Merge and install without running any middleware.
    pub(crate) fn apply(&self, patch: S::Patch) {
        let next = self.state.get().merge(patch);
        self.state.replace(next);
    }

    /// Notify subscribers without running any middleware.
    pub(crate) fn notify_subscribers(&self) -> NotifyReport {
        self.subscribers.notify_all()
    }
}

impl<S: State + Debug> Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.state.get())
            .field("version", &self.state.version())
            .field("subscribers", &self.subscribers)
            .field("middleware", &self.middleware.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        middleware::{Middleware, SetNext},
        State, Store, StoreRef,
    };
    use std::{
        cell::{Cell, RefCell},
        collections::HashMap,
        panic::{catch_unwind, AssertUnwindSafe},
        rc::Rc,
    };

    #[derive(Clone, Debug, PartialEq)]
    pub struct Point {
        x: i32,
        y: i32,
    }

    crate::patchable! {
        #[derive(Clone, Debug, PartialEq)]
        pub struct TestState => TestPatch {
            pub a: i32,
            pub b: i32,
            pub point: Point,
        }
    }

    fn initial_state() -> TestState {
        TestState {
            a: 1,
            b: 2,
            point: Point { x: 0, y: 0 },
        }
    }

    #[test]
    fn test_read_after_write() {
        let store = Store::new(initial_state());
        let previous = store.get();

        store.set(TestPatch::default().a(5));

        assert_eq!(
            *store.get(),
            TestState {
                a: 5,
                b: 2,
                point: Point { x: 0, y: 0 },
            }
        );
        assert_eq!(*previous, initial_state());
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_set_replaces_nested_record() {
        let store = Store::new(initial_state());
        store.set(TestPatch::default().point(Point { x: 3, y: 4 }));
        assert_eq!(store.get().point, Point { x: 3, y: 4 });
        assert_eq!(store.get().a, 1);
    }

    #[test]
    fn test_map_state() {
        let mut initial = HashMap::new();
        initial.insert("a", 1);
        initial.insert("b", 2);
        let store = Store::new(initial);

        let mut patch = HashMap::new();
        patch.insert("a", 10);
        store.set(patch);

        assert_eq!(store.get()["a"], 10);
        assert_eq!(store.get()["b"], 2);
    }

    #[test]
    fn test_notify() {
        let store = Store::new(initial_state());

        let callback_test = Rc::new(RefCell::new(Vec::new()));
        let callback_test_copy = callback_test.clone();

        let other_store = StoreRef::new(initial_state());
        let other_count = Rc::new(Cell::new(0));
        let other_count_copy = other_count.clone();
        let _other = other_store.subscribe(move || other_count_copy.set(other_count_copy.get() + 1));

        let count = Rc::new(Cell::new(0));
        let count_copy = count.clone();
        let _s1 = store.subscribe(move || count_copy.set(count_copy.get() + 1));
        let count_copy = count.clone();
        let _s2 = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        let observed = store.subscribe(move || callback_test_copy.borrow_mut().push(()));

        store.set(TestPatch::default().a(2));
        store.set(TestPatch::default().b(3));
        assert_eq!(count.get(), 4);
        assert_eq!(callback_test.borrow().len(), 2);

        observed.unsubscribe();
        store.set(TestPatch::default().b(4));
        observed.unsubscribe();
        assert_eq!(count.get(), 6);
        assert_eq!(callback_test.borrow().len(), 2);
        assert_eq!(store.subscriber_count(), 2);
        assert_eq!(other_count.get(), 0);
        assert_eq!(other_store.get().b, 2);
    }

    #[test]
    fn test_subscriber_reads_new_state() {
        let store = StoreRef::new(initial_state());
        let seen = Rc::new(Cell::new(0));

        let seen_copy = seen.clone();
        let weak_store = store.downgrade();
        let _s = store.subscribe(move || {
            if let Some(store) = weak_store.upgrade() {
                seen_copy.set(store.get().a);
            }
        });

        store.set(TestPatch::default().a(42));
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn test_reentrant_set() {
        let store = StoreRef::new(initial_state());
        let calls = Rc::new(RefCell::new(Vec::new()));

        // Mirrors `a` into `b`, through a nested set.
        let weak_store = store.downgrade();
        let calls_copy = calls.clone();
        let _mirror = store.subscribe(move || {
            calls_copy.borrow_mut().push("mirror");
            if let Some(store) = weak_store.upgrade() {
                let state = store.get();
                if state.b != state.a {
                    store.set(TestPatch::default().b(state.a));
                }
            }
        });

        let weak_store = store.downgrade();
        let calls_copy = calls.clone();
        let _observer = store.subscribe(move || {
            let b = weak_store.upgrade().map(|store| store.get().b);
            calls_copy.borrow_mut().push(if b == Some(7) { "observer 7" } else { "observer" });
        });

        store.set(TestPatch::default().a(7));

        assert_eq!(store.get().b, 7);
        assert_eq!(store.version(), 2);
        assert_eq!(
            *calls.borrow(),
            vec!["mirror", "mirror", "observer 7", "observer 7"]
        );
    }

    struct RecordingMiddleware {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Middleware<TestState> for RecordingMiddleware {
        fn on_set(&self, store: &Store<TestState>, patch: TestPatch, next: SetNext<'_, TestState>) {
            self.log
                .borrow_mut()
                .push(format!("{} before a={}", self.name, store.get().a));
            next.run(store, patch);
            self.log
                .borrow_mut()
                .push(format!("{} after a={}", self.name, store.get().a));
        }
    }

    struct OverrideMiddleware;

    impl Middleware<TestState> for OverrideMiddleware {
        fn on_set(&self, store: &Store<TestState>, patch: TestPatch, next: SetNext<'_, TestState>) {
            next.run(store, TestPatch { b: Some(100), ..patch });
        }
    }

    struct SwallowMiddleware;

    impl Middleware<TestState> for SwallowMiddleware {
        fn on_set(&self, _store: &Store<TestState>, _patch: TestPatch, _next: SetNext<'_, TestState>) {}
    }

    #[test]
    fn test_middleware_order() {
        let store = Store::new(initial_state());
        let log = Rc::new(RefCell::new(Vec::new()));
        store.add_middleware(RecordingMiddleware {
            name: "outer",
            log: log.clone(),
        });
        store.add_middleware(RecordingMiddleware {
            name: "inner",
            log: log.clone(),
        });

        store.set(TestPatch::default().a(9));

        assert_eq!(
            *log.borrow(),
            vec![
                "outer before a=1",
                "inner before a=1",
                "inner after a=9",
                "outer after a=9",
            ]
        );
    }

    #[test]
    fn test_middleware_modifies_patch() {
        let store = Store::new(initial_state());
        store.add_middleware(OverrideMiddleware);

        store.set(TestPatch::default().a(3));
        assert_eq!(store.get().a, 3);
        assert_eq!(store.get().b, 100);
    }

    #[test]
    fn test_swallowed_patch_does_not_notify() {
        let store = Store::new(initial_state());
        store.add_middleware(SwallowMiddleware);

        let count = Rc::new(Cell::new(0));
        let count_copy = count.clone();
        let _s = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        store.set(TestPatch::default().a(3));
        assert_eq!(store.get().a, 1);
        assert_eq!(store.version(), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_break_set() {
        let store = Store::new(initial_state());
        let count = Rc::new(Cell::new(0));

        let _faulty = store.subscribe(|| panic!("faulty consumer"));
        let count_copy = count.clone();
        let _ok = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        store.set(TestPatch::default().a(2));
        store.set(TestPatch::default().a(3));
        assert_eq!(store.get().a, 3);
        assert_eq!(count.get(), 2);
    }

    /// Replaces `n` with the patch, refusing an empty one.
    #[derive(Clone, Debug, PartialEq)]
    struct Fragile {
        n: i32,
    }

    impl State for Fragile {
        type Patch = Option<i32>;

        fn merge(&self, patch: Option<i32>) -> Self {
            match patch {
                Some(n) => Fragile { n },
                None => panic!("empty patch"),
            }
        }
    }

    #[test]
    fn test_failed_merge_installs_nothing() {
        let store = Store::new(Fragile { n: 1 });
        let previous = store.get();
        let count = Rc::new(Cell::new(0));
        let count_copy = count.clone();
        let _s = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        let result = catch_unwind(AssertUnwindSafe(|| store.set(None)));

        assert!(result.is_err());
        assert!(Rc::ptr_eq(&store.get(), &previous));
        assert_eq!(store.version(), 0);
        assert_eq!(count.get(), 0);

        store.set(Some(2));
        assert_eq!(*store.get(), Fragile { n: 2 });
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_store_ref_from_configured_store() {
        let store = Store::new(initial_state());
        store.add_middleware(OverrideMiddleware);
        let store = StoreRef::from_store(store);

        let count = Rc::new(Cell::new(0));
        let count_copy = count.clone();
        let _s = store.subscribe(move || count_copy.set(count_copy.get() + 1));

        store.clone().set(TestPatch::default().a(3));
        assert_eq!(store.get().a, 3);
        assert_eq!(store.get().b, 100);
        assert_eq!(count.get(), 1);
    }
}
