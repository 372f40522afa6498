//! Observable state store.
//!
//! A [`Store`] holds a [`State`] with a fixed set of root keys, merges
//! [`Change`]s into it through a [`Reducer`] and notifies subscribed listeners
//! after every successful change.

mod change;
mod reducer;
mod registry;
mod state;
mod store;

pub use change::Change;
pub use reducer::{merge, MergeReducer, Reducer};
pub use registry::ListenerId;
pub use state::{Branch, State, KIND_FIELD};
pub use store::{Store, StoreBuilder, StoreOptions, Subscription, WeakStore};
