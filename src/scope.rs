use crate::{
    BindOptions, Error, ScopeError, SelectorBinding, State, StoreRef,
};
use std::{
    any::Any,
    fmt::{Debug, Display},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifies the [StoreContext] a store was provided for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "context #{}", self.0)
    }
}

struct Provided {
    context: ContextId,
    store: Rc<dyn Any>,
}

/// A link in the chain of provided stores.
///
/// Scopes are plain values passed down the call tree by reference.
/// [Scope::provide()] runs a closure with a child scope in which the
/// given store is resolvable, and [Scope::resolve()] looks the store
/// up starting from the nearest enclosing provider. A provider nested
/// inside another one for the same context shadows it.
pub struct Scope<'p> {
    provided: Option<Provided>,
    parent: Option<&'p Scope<'p>>,
}

impl Scope<'static> {
    /// The empty scope, in which nothing can be resolved.
    pub fn root() -> Self {
        Scope {
            provided: None,
            parent: None,
        }
    }
}

impl<'p> Scope<'p> {
    /// Run `subtree` with a child scope in which `store` is resolvable
    /// for `context`.
    pub fn provide<S, R, F>(&self, context: ContextId, store: StoreRef<S>, subtree: F) -> R
    where
        S: State + 'static,
        F: FnOnce(&Scope<'_>) -> R,
    {
        log::trace!("providing {:?} for {}", store, context);
        let child = Scope {
            provided: Some(Provided {
                context,
                store: Rc::new(store),
            }),
            parent: Some(self),
        };
        subtree(&child)
    }

    /// Resolve the store provided for `context` by the nearest
    /// enclosing [Scope::provide()].
    pub fn resolve<S>(&self, context: ContextId) -> Result<StoreRef<S>, ScopeError>
    where
        S: State + 'static,
    {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(provided) = &current.provided {
                if provided.context == context {
                    if let Some(store) = provided.store.downcast_ref::<StoreRef<S>>() {
                        return Ok(store.clone());
                    }
                }
            }
            scope = current.parent;
        }

        Err(ScopeError { context })
    }

    /// The number of providers enclosing this scope.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.provided.is_some() {
                depth += 1;
            }
            scope = current.parent;
        }
        depth
    }
}

impl Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scope{{context: {:?}, depth: {}}}",
            self.provided.as_ref().map(|provided| provided.context),
            self.depth()
        )
    }
}

/// Create a [StoreContext], the entry point for a store holding records
/// of type `S`.
///
/// Every [StoreContext::provide()] mounts a new, independent store
/// initialised with a clone of `initial`.
pub fn create_store<S>(initial: S) -> StoreContext<S>
where
    S: State + Clone + 'static,
{
    StoreContext {
        id: ContextId::next(),
        initial,
    }
}

/// Mounts stores into a [Scope] and binds consumers to the nearest
/// mounted one. See [create_store()].
pub struct StoreContext<S> {
    id: ContextId,
    initial: S,
}

impl<S> StoreContext<S>
where
    S: State + Clone + 'static,
{
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Mount a new store initialised from this context's initial state
    /// and run `subtree` with it in scope.
    pub fn provide<R, F>(&self, scope: &Scope<'_>, subtree: F) -> R
    where
        F: FnOnce(&Scope<'_>) -> R,
    {
        self.provide_store(scope, StoreRef::new(self.initial.clone()), subtree)
    }

    /// Run `subtree` with an existing `store` in scope for this
    /// context. Useful to mount a store which has middleware attached.
    pub fn provide_store<R, F>(&self, scope: &Scope<'_>, store: StoreRef<S>, subtree: F) -> R
    where
        F: FnOnce(&Scope<'_>) -> R,
    {
        scope.provide(self.id, store, subtree)
    }

    pub fn resolve(&self, scope: &Scope<'_>) -> Result<StoreRef<S>, ScopeError> {
        scope.resolve(self.id)
    }

    /// Bind `selector` to the store in scope. See [SelectorBinding].
    pub fn use_selector<T, F>(
        &self,
        scope: &Scope<'_>,
        selector: F,
    ) -> Result<SelectorBinding<S, T>, ScopeError>
    where
        T: Clone + 'static,
        F: Fn(&S) -> T + 'static,
    {
        self.use_selector_with_options(scope, selector, BindOptions::new())
    }

    /// Like [use_selector()](StoreContext::use_selector()), calling
    /// `on_publish` with every value published to the binding.
    pub fn use_selector_with<T, F, P>(
        &self,
        scope: &Scope<'_>,
        selector: F,
        on_publish: P,
    ) -> Result<SelectorBinding<S, T>, ScopeError>
    where
        T: Clone + 'static,
        F: Fn(&S) -> T + 'static,
        P: Fn(&T) + 'static,
    {
        self.use_selector_with_options(scope, selector, BindOptions::new().on_publish(on_publish))
    }

    /// Like [use_selector()](StoreContext::use_selector()), but a
    /// recomputed value equal to the current one is not published.
    pub fn use_selector_eq<T, F>(
        &self,
        scope: &Scope<'_>,
        selector: F,
    ) -> Result<SelectorBinding<S, T>, ScopeError>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(&S) -> T + 'static,
    {
        self.use_selector_with_options(scope, selector, BindOptions::new().distinct())
    }

    pub fn use_selector_with_options<T, F>(
        &self,
        scope: &Scope<'_>,
        selector: F,
        options: BindOptions<T>,
    ) -> Result<SelectorBinding<S, T>, ScopeError>
    where
        T: Clone + 'static,
        F: Fn(&S) -> T + 'static,
    {
        let store = self.resolve(scope)?;
        Ok(SelectorBinding::bind_with(&store, selector, options))
    }

    /// Bind a fallible `selector` to the store in scope. A selector
    /// error while computing the initial value is returned as
    /// [Error::Selector].
    pub fn try_use_selector<T, E, F>(
        &self,
        scope: &Scope<'_>,
        selector: F,
    ) -> Result<SelectorBinding<S, T>, Error>
    where
        T: Clone + 'static,
        E: std::error::Error + 'static,
        F: Fn(&S) -> Result<T, E> + 'static,
    {
        let store = self.resolve(scope)?;
        Ok(SelectorBinding::try_bind_with(
            &store,
            selector,
            BindOptions::new(),
        )?)
    }

    /// Bind to the whole state of the store in scope.
    pub fn use_store(&self, scope: &Scope<'_>) -> Result<SelectorBinding<S, S>, ScopeError> {
        self.use_selector(scope, S::clone)
    }
}

impl<S> Debug for StoreContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreContext({})", self.id)
    }
}
