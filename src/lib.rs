//! A small external state container with selector scoped
//! subscriptions.
//!
//! A [Store] holds a single shared `State` record. Writes go through
//! [Store::set()] as a shallow patch of the record, after which every
//! subscriber is notified synchronously. Consumers usually don't
//! subscribe directly. They bind a selector through a [StoreContext],
//! obtaining a [SelectorBinding] whose value is recomputed and
//! republished on every write. Stores are made reachable to consumers
//! by providing them into a [Scope].
//!
//! ```
//! use fast_context::{create_store, patchable, Scope};
//!
//! patchable! {
//!     #[derive(Clone, Debug, PartialEq)]
//!     pub struct Form => FormPatch {
//!         pub first: String,
//!         pub last: String,
//!     }
//! }
//!
//! let form = create_store(Form { first: "".into(), last: "".into() });
//!
//! form.provide(&Scope::root(), |scope| {
//!     let first = form.use_selector(scope, |form| form.first.clone()).unwrap();
//!     first.set(FormPatch::default().first("Ann"));
//!     assert_eq!(first.value(), "Ann");
//! });
//! ```

mod error;
mod listener;
pub mod middleware;
mod scope;
mod selector;
mod state;
mod store;

pub use error::*;
pub use listener::*;
pub use scope::*;
pub use selector::*;
pub use state::*;
pub use store::{Store, StoreRef};
