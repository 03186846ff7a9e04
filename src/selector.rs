//! Per consumer bindings which keep a value derived from a [Store]
//! state current.

use crate::{SelectorError, State, Store, StoreRef, Subscription};
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::{Rc, Weak},
};

type SelectFn<S, T> = Rc<dyn Fn(&S) -> Result<T, SelectorError>>;

/// Options for a [SelectorBinding].
pub struct BindOptions<T> {
    on_publish: Option<Box<dyn Fn(&T)>>,
    equals: Option<fn(&T, &T) -> bool>,
}

impl<T> BindOptions<T> {
    pub fn new() -> Self {
        Self {
            on_publish: None,
            equals: None,
        }
    }

    /// Call `on_publish` with every value published to the binding
    /// after a store notification. This is how a consumer is told to
    /// observe its new value.
    pub fn on_publish<P: Fn(&T) + 'static>(mut self, on_publish: P) -> Self {
        self.on_publish = Some(Box::new(on_publish));
        self
    }

    /// Skip publishing a recomputed value which is equal to the
    /// current one.
    ///
    /// By default every notification republishes, whether or not the
    /// selected value changed.
    pub fn distinct(mut self) -> Self
    where
        T: PartialEq,
    {
        self.equals = Some(<T as PartialEq>::eq);
        self
    }
}

impl<T> Default for BindOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The binding's value slot, shared with its store subscription.
struct Slot<T> {
    value: RefCell<T>,
    publishes: Cell<u64>,
    error: RefCell<Option<SelectorError>>,
    on_publish: Option<Box<dyn Fn(&T)>>,
    equals: Option<fn(&T, &T) -> bool>,
}

impl<T: Clone> Slot<T> {
    fn new(value: T, options: BindOptions<T>) -> Self {
        Self {
            value: RefCell::new(value),
            publishes: Cell::new(0),
            error: RefCell::new(None),
            on_publish: options.on_publish,
            equals: options.equals,
        }
    }

    fn publish(&self, value: T) {
        self.error.borrow_mut().take();

        if let Some(equals) = self.equals {
            if equals(&self.value.borrow(), &value) {
                return;
            }
        }

        // No borrow may be held while calling out, the callback is
        // allowed to write to the store and re-enter this slot.
        *self.value.borrow_mut() = value.clone();
        self.publishes.set(self.publishes.get() + 1);

        if let Some(on_publish) = &self.on_publish {
            on_publish(&value);
        }
    }

    fn fail(&self, error: SelectorError) {
        log::warn!("selector failed during notification, keeping previous value: {}", error);
        *self.error.borrow_mut() = Some(error);
    }
}

/// The write handle of a [SelectorBinding]: the whole state
/// [Store::set()] of the bound store, whatever the binding selects.
pub struct Setter<S: State>(StoreRef<S>);

impl<S: State> Setter<S> {
    pub fn set(&self, patch: S::Patch) {
        self.0.set(patch)
    }
}

impl<S: State> Clone for Setter<S> {
    fn clone(&self) -> Self {
        Setter(self.0.clone())
    }
}

impl<S: State> Debug for Setter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Setter({:?})", self.0)
    }
}

/// A value of type `T`, computed by a selector from the state of a
/// [Store], and kept current as the store changes.
///
/// Creating the binding computes the initial value and subscribes to
/// the store. Every notification from the store then recomputes the
/// value and publishes it: the value is stored in the binding, the
/// publish count is incremented, and the `on_publish` callback (see
/// [BindOptions]) is invoked. This happens after every
/// [Store::set()], even when the selected value did not change,
/// unless the binding was created with [BindOptions::distinct()].
///
/// Dropping the binding unsubscribes it from the store.
///
/// If the selector panics while computing the initial value the panic
/// propagates to the caller, and nothing is left subscribed. A panic
/// during a later recompute is isolated to this binding by the
/// store's notification pass. Fallible selectors (see
/// [SelectorBinding::try_bind()]) report recompute errors through
/// [SelectorBinding::take_error()] and keep their previous value.
pub struct SelectorBinding<S: State, T> {
    store: StoreRef<S>,
    slot: Rc<Slot<T>>,
    subscription: Subscription,
}

impl<S, T> SelectorBinding<S, T>
where
    S: State + 'static,
    T: Clone + 'static,
{
    pub fn bind<F>(store: &StoreRef<S>, selector: F) -> Self
    where
        F: Fn(&S) -> T + 'static,
    {
        Self::bind_with(store, selector, BindOptions::new())
    }

    pub fn bind_with<F>(store: &StoreRef<S>, selector: F, options: BindOptions<T>) -> Self
    where
        F: Fn(&S) -> T + 'static,
    {
        let value = selector(&*store.get());
        let select: SelectFn<S, T> =
            Rc::new(move |state: &S| Ok::<T, SelectorError>(selector(state)));
        Self::attach(store, select, value, options)
    }

    pub fn try_bind<E, F>(store: &StoreRef<S>, selector: F) -> Result<Self, SelectorError>
    where
        E: std::error::Error + 'static,
        F: Fn(&S) -> Result<T, E> + 'static,
    {
        Self::try_bind_with(store, selector, BindOptions::new())
    }

    pub fn try_bind_with<E, F>(
        store: &StoreRef<S>,
        selector: F,
        options: BindOptions<T>,
    ) -> Result<Self, SelectorError>
    where
        E: std::error::Error + 'static,
        F: Fn(&S) -> Result<T, E> + 'static,
    {
        let value = selector(&*store.get()).map_err(SelectorError::new)?;
        let select: SelectFn<S, T> =
            Rc::new(move |state: &S| selector(state).map_err(SelectorError::new));
        Ok(Self::attach(store, select, value, options))
    }

    fn attach(
        store: &StoreRef<S>,
        select: SelectFn<S, T>,
        value: T,
        options: BindOptions<T>,
    ) -> Self {
        let slot = Rc::new(Slot::new(value, options));
        let subscription = subscribe(store, &slot, select);

        Self {
            store: store.clone(),
            slot,
            subscription,
        }
    }

    /// Replace the selector of this binding.
    ///
    /// The new selector's value is computed first. If that panics, the
    /// binding is left as it was. Otherwise the value is installed and
    /// the previous subscription is released in favour of a new one.
    pub fn reselect<F>(&mut self, selector: F)
    where
        F: Fn(&S) -> T + 'static,
    {
        let value = selector(&*self.store.get());
        let select: SelectFn<S, T> =
            Rc::new(move |state: &S| Ok::<T, SelectorError>(selector(state)));
        self.resubscribe(select, value);
    }

    /// Replace the selector of this binding with a fallible one. On
    /// error the binding is left as it was.
    pub fn try_reselect<E, F>(&mut self, selector: F) -> Result<(), SelectorError>
    where
        E: std::error::Error + 'static,
        F: Fn(&S) -> Result<T, E> + 'static,
    {
        let value = selector(&*self.store.get()).map_err(SelectorError::new)?;
        let select: SelectFn<S, T> =
            Rc::new(move |state: &S| selector(state).map_err(SelectorError::new));
        self.resubscribe(select, value);
        Ok(())
    }

    fn resubscribe(&mut self, select: SelectFn<S, T>, value: T) {
        *self.slot.value.borrow_mut() = value;
        self.slot.error.borrow_mut().take();
        // Assigning drops, and so unsubscribes, the previous subscription.
        self.subscription = subscribe(&self.store, &self.slot, select);
    }
}

impl<S: State, T: Clone> SelectorBinding<S, T> {
    /// The most recently published value.
    pub fn value(&self) -> T {
        self.slot.value.borrow().clone()
    }

    /// Call `f` with the most recently published value.
    ///
    /// `f` gets a copy of the value, so it may write through this
    /// binding and have the new value published while it runs.
    pub fn with_value<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
        let value = self.value();
        f(&value)
    }

    /// The number of values published since the binding was created.
    pub fn publish_count(&self) -> u64 {
        self.slot.publishes.get()
    }

    /// The value and the write handle, as a pair.
    pub fn parts(&self) -> (T, Setter<S>) {
        (self.value(), self.setter())
    }
}

impl<S: State, T> SelectorBinding<S, T> {
    /// Take the error of the last failed recompute, if the selector
    /// has not succeeded since.
    pub fn take_error(&self) -> Option<SelectorError> {
        self.slot.error.borrow_mut().take()
    }

    /// Write `patch` to the bound store. The patch may touch any field
    /// of the state, not only the ones this binding selects.
    pub fn set(&self, patch: S::Patch) {
        self.store.set(patch)
    }

    pub fn setter(&self) -> Setter<S> {
        Setter(self.store.clone())
    }

    pub fn store(&self) -> &StoreRef<S> {
        &self.store
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<S: State, T: Debug> Debug for SelectorBinding<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorBinding")
            .field("value", &*self.slot.value.borrow())
            .field("publishes", &self.slot.publishes.get())
            .field("store", &self.store)
            .field("subscription", &self.subscription)
            .finish()
    }
}

fn subscribe<S, T>(store: &StoreRef<S>, slot: &Rc<Slot<T>>, select: SelectFn<S, T>) -> Subscription
where
    S: State + 'static,
    T: Clone + 'static,
{
    let weak_store: Weak<Store<S>> = store.downgrade();
    let weak_slot: Weak<Slot<T>> = Rc::downgrade(slot);

    store.subscribe(move || {
        let (store, slot) = match (weak_store.upgrade(), weak_slot.upgrade()) {
            (Some(store), Some(slot)) => (store, slot),
            _ => return,
        };

        match select(&*store.get()) {
            Ok(value) => slot.publish(value),
            Err(error) => slot.fail(error),
        }
    })
}
