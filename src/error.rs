//! Errors surfaced by a [Scope](crate::Scope) lookup or by a
//! selector while computing a [SelectorBinding](crate::SelectorBinding)
//! value.

use crate::ContextId;
use thiserror::Error;

/// No [Store](crate::Store) was provided for the requested context
/// by any enclosing [Scope::provide()](crate::Scope::provide()).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no store found for {context}")]
pub struct ScopeError {
    pub context: ContextId,
}

/// A selector failed while computing its value from the store state.
#[derive(Debug, Error)]
#[error("selector failed: {source}")]
pub struct SelectorError {
    #[source]
    source: Box<dyn std::error::Error + 'static>,
}

impl SelectorError {
    pub fn new<E: std::error::Error + 'static>(error: E) -> Self {
        Self {
            source: Box::new(error),
        }
    }

    /// Attempt to downcast the underlying selector error to `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
}
