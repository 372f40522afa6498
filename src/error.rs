//! Error types for store operations.

use thiserror::Error;

/// Errors raised by [`Store`](crate::Store) operations.
///
/// Every failing operation leaves the store state exactly as it was.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A change referenced a root key that the store was not created with.
    #[error("no root property with name '{key}' found in the old state")]
    UnknownRootKey { key: String },

    /// A change or state used the name reserved for the change kind as a
    /// root key.
    #[error("'{key}' is reserved for the change kind and cannot be a root property")]
    ReservedRootKey { key: String },

    /// A reducer produced a state without one of the initial root keys.
    #[error("root property '{key}' is missing from the reduced state")]
    MissingRootKey { key: String },

    /// The store requires a change kind and the change carried none.
    #[error("missing 'kind' in state changes")]
    MissingChangeKind,

    /// A root value was not an object. The key is empty when the state
    /// itself was not an object.
    #[error("root property '{key}' must be an object")]
    InvalidState { key: String },

    /// A JSON value could not be read as a change payload.
    #[error("invalid change payload: {0}")]
    InvalidChange(#[from] serde_json::Error),
}

/// Result alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
