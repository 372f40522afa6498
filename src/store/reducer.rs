use crate::error::{Result, StoreError};
use crate::store::change::Change;
use crate::store::state::{State, KIND_FIELD};

/// Computes the next state from a base state and a change.
///
/// Implemented for [`MergeReducer`] (the default) and for any closure of
/// shape `Fn(&State, &Change) -> Result<State>`.
pub trait Reducer {
    fn reduce(&self, base: &State, change: &Change) -> Result<State>;
}

/// The default reducer: a one-level shallow merge, see [`merge`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, base: &State, change: &Change) -> Result<State> {
        merge(base, change)
    }
}

impl<F> Reducer for F
where
    F: Fn(&State, &Change) -> Result<State>,
{
    fn reduce(&self, base: &State, change: &Change) -> Result<State> {
        self(base, change)
    }
}

/// Merge `change` into `base`, returning a new state.
///
/// Each root named by the change gets its fields overwritten by the partial
/// branch; nested values are replaced, not merged. Roots the change does not
/// name are carried over as the same shared branch. Fails with
/// [`StoreError::UnknownRootKey`] if the change names a root `base` lacks, and
/// with [`StoreError::ReservedRootKey`] if it names [`KIND_FIELD`].
pub fn merge(base: &State, change: &Change) -> Result<State> {
    let mut next = base.clone();

    for (key, partial) in change.roots() {
        if key == KIND_FIELD {
            return Err(StoreError::ReservedRootKey {
                key: key.to_string(),
            });
        }
        let Some(branch) = base.get(key) else {
            return Err(StoreError::UnknownRootKey {
                key: key.to_string(),
            });
        };

        let mut merged = branch.clone();
        merged.extend(partial.iter().map(|(field, value)| (field.clone(), value.clone())));
        next.set_root(key, merged);
    }

    Ok(next)
}
