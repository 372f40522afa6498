use crate::error::Result;
use crate::store::state::Branch;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A partial update submitted to a [`Store`](crate::Store).
///
/// Carries an optional change kind plus one partial [`Branch`] per root key to
/// update. The JSON form is a flat object where `kind` is the tag and every
/// other entry names a root:
///
/// ```
/// use serde_json::json;
/// use tincan::Change;
///
/// let change = Change::from_value(json!({
///     "kind": "INCREMENT",
///     "counter": { "n": 1 }
/// }))
/// .unwrap();
///
/// assert_eq!(change.kind(), Some("INCREMENT"));
/// assert_eq!(change, Change::new("INCREMENT").set("counter", "n", 1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(flatten)]
    roots: IndexMap<String, Branch>,
}

impl Change {
    /// Create an empty change tagged with `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            roots: IndexMap::new(),
        }
    }

    /// Create an empty change without a kind.
    ///
    /// Only accepted by stores built with `require_change_kind` disabled.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Parse a change from its JSON form.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Merge `partial` into the entry for `root`.
    ///
    /// `root` must not be [`KIND_FIELD`](crate::store::KIND_FIELD); such an
    /// entry is rejected when the change is applied.
    pub fn merge(mut self, root: impl Into<String>, partial: Branch) -> Self {
        self.roots.entry(root.into()).or_default().extend(partial);
        self
    }

    /// Set a single field of `root`. The same reserved-name rule as
    /// [`Change::merge`] applies.
    pub fn set(
        mut self,
        root: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.roots
            .entry(root.into())
            .or_default()
            .insert(field.into(), value.into());
        self
    }

    /// The change kind, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Whether the change carries a non-empty kind.
    pub fn has_kind(&self) -> bool {
        self.kind.as_deref().is_some_and(|kind| !kind.is_empty())
    }

    /// The partial branch for `root`.
    pub fn get(&self, root: &str) -> Option<&Branch> {
        self.roots.get(root)
    }

    /// Root entries in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, &Branch)> {
        self.roots.iter().map(|(key, partial)| (key.as_str(), partial))
    }

    /// Number of roots the change names.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the change names no roots.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl TryFrom<Value> for Change {
    type Error = crate::error::StoreError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}
