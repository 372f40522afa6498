use crate::error::{Result, StoreError};
use crate::store::change::Change;
use crate::store::reducer::{MergeReducer, Reducer};
use crate::store::registry::{ListenerId, Registry};
use crate::store::state::State;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Store configuration.
///
/// Deserializable so it can live in an application config file; missing
/// fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Reject changes without a non-empty kind. Defaults to `true`.
    pub require_change_kind: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            require_change_kind: true,
        }
    }
}

/// One committed change awaiting delivery.
struct Transition {
    previous: Rc<State>,
    change: Rc<Change>,
}

struct Inner {
    initial: Rc<State>,
    state: RefCell<Rc<State>>,
    registry: RefCell<Registry>,
    pending: RefCell<VecDeque<Transition>>,
    reducer: Box<dyn Reducer>,
    options: StoreOptions,
}

/// A single-threaded observable state container.
///
/// Changes are merged into the current state and every subscribed listener is
/// called synchronously with `(previous, current, change)`, in subscription
/// order. `current` is always the store's state at the moment the listener is
/// called, so it already includes changes applied by earlier listeners.
///
/// Listeners may call back into the store. A change applied from inside a
/// listener is committed at once but its notification is queued and delivered
/// after the running pass, before the outermost `apply_change` returns.
/// Subscribing or unsubscribing from inside a listener takes effect from the
/// next pass on.
///
/// Cloning a `Store` yields another handle to the same state.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tincan::{Change, State, Store};
///
/// let store = Store::new(State::from_value(json!({ "counter": { "n": 0 } })).unwrap());
///
/// let sub = store.subscribe(|previous, current, change| {
///     println!("{:?}: {:?} -> {:?}", change.kind(), previous, current);
/// });
///
/// store.apply_change(Change::new("INCREMENT").set("counter", "n", 1)).unwrap();
/// assert_eq!(store.get().field("counter", "n"), Some(&json!(1)));
///
/// sub.unsubscribe();
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<Inner>,
}

impl Store {
    /// Create a store with default options and the merge reducer.
    pub fn new(initial: State) -> Self {
        Self::builder(initial).build()
    }

    /// Create a store with the given options and the merge reducer.
    pub fn with_options(initial: State, options: StoreOptions) -> Self {
        Self::builder(initial).options(options).build()
    }

    /// Start building a store with custom options or a custom reducer.
    pub fn builder(initial: State) -> StoreBuilder {
        StoreBuilder {
            initial,
            options: StoreOptions::default(),
            reducer: Box::new(MergeReducer),
        }
    }

    /// Get the current state.
    ///
    /// The returned snapshot is immutable; later changes produce new states.
    pub fn get(&self) -> Rc<State> {
        Rc::clone(&*self.inner.state.borrow())
    }

    /// Get the state the store was created with.
    pub fn initial_state(&self) -> Rc<State> {
        Rc::clone(&self.inner.initial)
    }

    /// The options this store was built with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Merge `change` into the current state and notify listeners.
    ///
    /// Fails with [`StoreError::MissingChangeKind`] or
    /// [`StoreError::UnknownRootKey`], leaving the state untouched.
    pub fn apply_change(&self, change: Change) -> Result<()> {
        self.commit(change, false)
    }

    /// Merge `change` into the initial state, discarding every earlier change,
    /// and notify listeners.
    pub fn reset_and_apply_change(&self, change: Change) -> Result<()> {
        self.commit(change, true)
    }

    /// Register a listener. It stays subscribed until
    /// [`Subscription::unsubscribe`] is called; dropping the handle does not
    /// unsubscribe.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&State, &State, &Change) + 'static,
    {
        let mut registry = self.inner.registry.borrow_mut();
        let id = registry.insert(Rc::new(listener));
        debug!(%id, staged = registry.is_notifying(), "listener subscribed");

        Subscription {
            id,
            store: Rc::downgrade(&self.inner),
            active: Cell::new(true),
        }
    }

    /// Number of listeners the next notification pass will call.
    pub fn listener_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Whether a notification pass is running right now.
    pub fn is_notifying(&self) -> bool {
        self.inner.registry.borrow().is_notifying()
    }

    /// Create a handle that does not keep the store alive, for use inside
    /// listeners.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn commit(&self, change: Change, reset: bool) -> Result<()> {
        let inner = &self.inner;

        if inner.options.require_change_kind && !change.has_kind() {
            return Err(StoreError::MissingChangeKind);
        }

        let previous = self.get();
        let base = if reset { &inner.initial } else { &previous };
        let next = inner.reducer.reduce(base, &change)?;
        check_root_keys(&inner.initial, &next)?;

        *inner.state.borrow_mut() = Rc::new(next);

        let transition = Transition {
            previous,
            change: Rc::new(change),
        };
        let deferred = inner.registry.borrow().is_notifying();
        debug!(
            kind = transition.change.kind().unwrap_or_default(),
            reset,
            deferred,
            "state change committed"
        );

        if deferred {
            inner.pending.borrow_mut().push_back(transition);
            return Ok(());
        }

        self.notify(&transition);
        loop {
            // Keep the queue borrow out of the pass: listeners push to it.
            let next = inner.pending.borrow_mut().pop_front();
            let Some(transition) = next else {
                break;
            };
            self.notify(&transition);
        }

        Ok(())
    }

    fn notify(&self, transition: &Transition) {
        let snapshot = self.inner.registry.borrow_mut().begin_pass();
        let _pass = PassGuard { inner: &self.inner };
        trace!(listeners = snapshot.len(), "notification pass");

        for entry in snapshot.iter() {
            // Read per listener: an earlier one may have applied a change.
            let current = self.get();
            (entry.listener)(&*transition.previous, &*current, &*transition.change);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get())
            .field("listeners", &self.listener_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Ends a notification pass, also when a listener panics.
///
/// On unwind the queued notifications are dropped: the call that owned them is
/// failing, and the next call starts from a clean queue.
struct PassGuard<'a> {
    inner: &'a Inner,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.inner.registry.borrow_mut().end_pass();
        if std::thread::panicking() {
            self.inner.pending.borrow_mut().clear();
        }
    }
}

/// The key set is closed: a reducer may neither add nor drop roots.
fn check_root_keys(initial: &State, next: &State) -> Result<()> {
    if let Some(key) = next.keys().find(|key| !initial.contains_key(key)) {
        return Err(StoreError::UnknownRootKey {
            key: key.to_string(),
        });
    }
    if let Some(key) = initial.keys().find(|key| !next.contains_key(key)) {
        return Err(StoreError::MissingRootKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Builder for a [`Store`] with custom options or reducer.
pub struct StoreBuilder {
    initial: State,
    options: StoreOptions,
    reducer: Box<dyn Reducer>,
}

impl StoreBuilder {
    /// Replace all options at once.
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether changes must carry a non-empty kind.
    pub fn require_change_kind(mut self, require: bool) -> Self {
        self.options.require_change_kind = require;
        self
    }

    /// Replace the default merge reducer.
    ///
    /// Whatever the reducer returns must keep the initial root keys, or the
    /// change is rejected.
    pub fn reducer<R>(mut self, reducer: R) -> Self
    where
        R: Reducer + 'static,
    {
        self.reducer = Box::new(reducer);
        self
    }

    /// Create the store.
    pub fn build(self) -> Store {
        let initial = Rc::new(self.initial);
        Store {
            inner: Rc::new(Inner {
                state: RefCell::new(Rc::clone(&initial)),
                initial,
                registry: RefCell::new(Registry::new()),
                pending: RefCell::new(VecDeque::new()),
                reducer: self.reducer,
                options: self.options,
            }),
        }
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// `unsubscribe` is one-shot: the first call removes the listener, later calls
/// do nothing.
pub struct Subscription {
    id: ListenerId,
    store: Weak<Inner>,
    active: Cell<bool>,
}

impl Subscription {
    /// Remove the listener. Does nothing after the first call.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            let mut registry = inner.registry.borrow_mut();
            registry.remove(self.id);
            debug!(id = %self.id, staged = registry.is_notifying(), "listener unsubscribed");
        }
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// The registry id of the listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Non-owning handle to a [`Store`].
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<Inner>,
}

impl WeakStore {
    /// Get the store back, if it is still alive.
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn counter_store() -> Store {
        Store::new(State::from_value(json!({ "test": { "counter": 0 } })).unwrap())
    }

    fn counter(state: &State) -> i64 {
        state
            .field("test", "counter")
            .and_then(|value| value.as_i64())
            .unwrap()
    }

    #[test]
    fn store_starts_with_initial_state() {
        let store = counter_store();

        assert_eq!(store.get().to_value(), json!({ "test": { "counter": 0 } }));
        assert!(Rc::ptr_eq(&store.get(), &store.initial_state()));
    }

    #[test]
    fn store_apply_change() {
        let store = counter_store();

        store
            .apply_change(Change::new("TEST").set("test", "counter", 66))
            .unwrap();

        assert_eq!(counter(&store.get()), 66);
    }

    #[test]
    fn store_rejects_missing_kind() {
        let store = counter_store();

        let err = store
            .apply_change(Change::untyped().set("test", "counter", 1))
            .unwrap_err();

        assert!(matches!(err, StoreError::MissingChangeKind));
        assert_eq!(counter(&store.get()), 0);
    }

    #[test]
    fn store_allows_untyped_when_configured() {
        let store = Store::with_options(
            State::from_value(json!({ "test": { "counter": 0 } })).unwrap(),
            StoreOptions {
                require_change_kind: false,
            },
        );

        store
            .apply_change(Change::untyped().set("test", "counter", 1))
            .unwrap();

        assert_eq!(counter(&store.get()), 1);
    }

    #[test]
    fn store_rejects_unknown_root() {
        let store = counter_store();
        let before = store.get();

        let err = store
            .apply_change(Change::new("TEST").set("newRoot", "counter", 0))
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownRootKey { key } if key == "newRoot"));
        assert!(Rc::ptr_eq(&before, &store.get()));
    }

    #[test]
    fn store_reset_starts_from_initial_state() {
        let store = counter_store();

        store
            .apply_change(Change::new("TEST").set("test", "counter", 27))
            .unwrap();
        store.reset_and_apply_change(Change::new("RESET")).unwrap();

        assert_eq!(*store.get(), *store.initial_state());
    }

    #[test]
    fn store_subscribe() {
        let store = counter_store();
        let calls = Rc::new(RefCell::new(Vec::new()));

        store.subscribe({
            let calls = Rc::clone(&calls);
            move |previous, current, change| {
                calls.borrow_mut().push((
                    counter(previous),
                    counter(current),
                    change.kind().map(str::to_string),
                ));
            }
        });

        store
            .apply_change(Change::new("TEST").set("test", "counter", 1))
            .unwrap();

        assert_eq!(*calls.borrow(), [(0, 1, Some("TEST".to_string()))]);
    }

    #[test]
    fn store_unsubscribe_is_one_shot() {
        let store = counter_store();
        let calls = Rc::new(Cell::new(0));

        let sub = store.subscribe({
            let calls = Rc::clone(&calls);
            move |_, _, _| calls.set(calls.get() + 1)
        });
        let other = store.subscribe(|_, _, _| {});

        sub.unsubscribe();
        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert!(other.is_active());
        assert_eq!(store.listener_count(), 1);

        store
            .apply_change(Change::new("TEST").set("test", "counter", 27))
            .unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn custom_reducer_runs() {
        let store = Store::builder(State::from_value(json!({ "test": { "counter": 0 } })).unwrap())
            .reducer(|base: &State, change: &Change| -> Result<State> {
                let step = change
                    .get("test")
                    .and_then(|partial| partial.get("step"))
                    .and_then(|step| step.as_i64())
                    .unwrap_or(1);
                let mut branch = base.get("test").cloned().unwrap_or_default();
                let counter = branch.get("counter").and_then(|v| v.as_i64()).unwrap_or(0);
                branch.insert("counter".to_string(), json!(counter + step));
                Ok(base.clone().with_root("test", branch))
            })
            .build();

        store.apply_change(Change::new("INC").set("test", "step", 5)).unwrap();
        store.apply_change(Change::new("INC")).unwrap();

        assert_eq!(counter(&store.get()), 6);
    }

    #[test]
    fn custom_reducer_cannot_change_root_keys() {
        let initial = State::from_value(json!({ "test": { "counter": 0 } })).unwrap();

        let adding = Store::builder(initial.clone())
            .reducer(|base: &State, _: &Change| -> Result<State> {
                Ok(base.clone().with_root("test1", serde_json::Map::new()))
            })
            .build();
        let err = adding.apply_change(Change::new("T")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownRootKey { key } if key == "test1"));

        let dropping = Store::builder(initial)
            .reducer(|_: &State, _: &Change| -> Result<State> { Ok(State::new()) })
            .build();
        let err = dropping.apply_change(Change::new("T")).unwrap_err();
        assert!(matches!(err, StoreError::MissingRootKey { key } if key == "test"));
        assert_eq!(counter(&dropping.get()), 0);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: StoreOptions = serde_json::from_value(json!({})).unwrap();
        assert!(options.require_change_kind);

        let options: StoreOptions =
            serde_json::from_value(json!({ "require_change_kind": false })).unwrap();
        assert!(!options.require_change_kind);
    }

    #[test]
    fn weak_store_does_not_keep_store_alive() {
        let store = counter_store();
        let weak = store.downgrade();

        assert!(weak.upgrade().is_some());
        drop(store);
        assert!(weak.upgrade().is_none());
    }
}
