use crate::error::{Result, StoreError};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::rc::Rc;

/// A root-level sub-object: field name to value.
pub type Branch = Map<String, Value>;

/// Field carrying the change kind in the JSON form of a [`Change`](crate::Change).
/// It can never be a root key.
pub const KIND_FIELD: &str = "kind";

/// The root state held by a [`Store`](crate::Store).
///
/// An ordered mapping from root key to [`Branch`]. Branches are shared behind
/// `Rc`, so a merge that leaves a root untouched hands the very same branch to
/// the next state. Use [`State::shares_root`] to detect that cheaply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State {
    roots: IndexMap<String, Rc<Branch>>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`State::set_root`].
    pub fn with_root(mut self, key: impl Into<String>, branch: impl Into<Rc<Branch>>) -> Self {
        self.set_root(key, branch);
        self
    }

    /// Build a state from a JSON object whose values are all objects.
    ///
    /// A root named [`KIND_FIELD`] is rejected, since no change could address
    /// it.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(StoreError::InvalidState {
                key: String::new(),
            });
        };

        let mut state = Self::new();
        for (key, branch) in object {
            if key == KIND_FIELD {
                return Err(StoreError::ReservedRootKey { key });
            }
            match branch {
                Value::Object(branch) => {
                    state.set_root(key, branch);
                }
                _ => return Err(StoreError::InvalidState { key }),
            }
        }
        Ok(state)
    }

    /// Convert back into a plain JSON object.
    pub fn to_value(&self) -> Value {
        let object = self
            .roots
            .iter()
            .map(|(key, branch)| (key.clone(), Value::Object((**branch).clone())))
            .collect();
        Value::Object(object)
    }

    /// Insert or replace a root, returning the previous branch.
    ///
    /// [`KIND_FIELD`] is reserved for the change kind; a store whose state has
    /// a root by that name rejects every change that names it.
    pub fn set_root(
        &mut self,
        key: impl Into<String>,
        branch: impl Into<Rc<Branch>>,
    ) -> Option<Rc<Branch>> {
        self.roots.insert(key.into(), branch.into())
    }

    /// Get the branch stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Branch> {
        self.roots.get(key).map(|branch| &**branch)
    }

    /// Get the shared handle to the branch stored under `key`.
    pub fn branch(&self, key: &str) -> Option<&Rc<Branch>> {
        self.roots.get(key)
    }

    /// Shorthand for reading a single field of a root.
    pub fn field(&self, key: &str, field: &str) -> Option<&Value> {
        self.get(key).and_then(|branch| branch.get(field))
    }

    /// Whether `key` is a root of this state.
    pub fn contains_key(&self, key: &str) -> bool {
        self.roots.contains_key(key)
    }

    /// Root keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Roots and their branches in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Branch)> {
        self.roots.iter().map(|(key, branch)| (key.as_str(), &**branch))
    }

    /// Number of roots.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the state has no roots.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether both states hold the same (pointer-equal) branch for `key`.
    pub fn shares_root(&self, other: &State, key: &str) -> bool {
        match (self.roots.get(key), other.roots.get(key)) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl TryFrom<Value> for State {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.roots.len()))?;
        for (key, branch) in &self.roots {
            map.serialize_entry(key, &**branch)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_from_value_keeps_root_order() {
        let state = State::from_value(json!({
            "user": { "name": "ada" },
            "counter": { "n": 0 },
            "flags": {}
        }))
        .unwrap();

        assert_eq!(state.keys().collect::<Vec<_>>(), ["user", "counter", "flags"]);
        assert_eq!(state.field("counter", "n"), Some(&json!(0)));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn state_rejects_non_object_roots() {
        let err = State::from_value(json!({ "counter": 3 })).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { key } if key == "counter"));

        let err = State::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[test]
    fn state_rejects_kind_root() {
        let err = State::from_value(json!({ "kind": { "n": 0 } })).unwrap_err();
        assert!(matches!(err, StoreError::ReservedRootKey { key } if key == KIND_FIELD));
    }

    #[test]
    fn state_serializes_as_plain_object() {
        let value = json!({ "counter": { "n": 1, "label": "one" } });
        let state = State::from_value(value.clone()).unwrap();

        assert_eq!(serde_json::to_value(&state).unwrap(), value);
        assert_eq!(state.to_value(), value);
    }

    #[test]
    fn cloned_state_shares_roots() {
        let state = State::new().with_root("counter", Branch::new());
        let copy = state.clone();

        assert!(state.shares_root(&copy, "counter"));
        assert!(!state.shares_root(&copy, "missing"));
    }
}
