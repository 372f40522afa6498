//! # Tincan
//!
//! A minimal observable state store for Rust.
//!
//! Callers hold a single root [`State`], submit partial updates as
//! [`Change`]s tagged with a change kind, and get a merged new state back.
//! Listeners registered with [`Store::subscribe`] are called synchronously
//! after every successful change with the previous state, the new state and
//! the change itself.
//!
//! - Root keys are fixed when the store is created; a change naming any other
//!   key is rejected.
//! - Merging is shallow: fields of a root are overwritten, nested values are
//!   replaced wholesale.
//! - Listeners may apply changes or (un)subscribe while being notified. Such
//!   changes are queued and delivered in order, each in its own pass, before
//!   the outer call returns.
//!
//! ```
//! use serde_json::json;
//! use tincan::{Change, State, Store};
//!
//! let store = Store::new(State::from_value(json!({
//!     "test": { "counter": 0, "items": {} }
//! })).unwrap());
//!
//! store.apply_change(Change::new("TEST").set("test", "counter", 66)).unwrap();
//!
//! assert_eq!(store.get().to_value(), json!({ "test": { "counter": 66, "items": {} } }));
//! ```

pub mod error;
pub mod store;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use store::{
    merge, Branch, Change, ListenerId, MergeReducer, Reducer, State, Store, StoreBuilder,
    StoreOptions, Subscription, WeakStore, KIND_FIELD,
};
