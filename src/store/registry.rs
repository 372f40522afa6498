use crate::store::change::Change;
use crate::store::state::State;
use std::fmt;
use std::rc::Rc;

/// A state listener: `(previous, current, change)`.
pub(crate) type Listener = Rc<dyn Fn(&State, &State, &Change)>;

/// Identifies one subscription in a store's registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: ListenerId,
    pub(crate) listener: Listener,
}

/// Ordered listener list with staging for changes made mid-notification.
///
/// While a pass runs it iterates the `live` snapshot it was handed; inserts
/// and removals go to `staged`, a copy of `live` made on first mutation, which
/// replaces `live` once the pass ends.
pub(crate) struct Registry {
    live: Rc<Vec<Entry>>,
    staged: Option<Vec<Entry>>,
    notifying: bool,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            live: Rc::new(Vec::new()),
            staged: None,
            notifying: false,
            next_id: 0,
        }
    }

    pub(crate) fn insert(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.writable().push(Entry { id, listener });
        id
    }

    /// Remove the listener registered under `id`. Returns `false` if absent.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let entries = self.writable();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Mark a pass as running and hand out the listeners it must notify.
    pub(crate) fn begin_pass(&mut self) -> Rc<Vec<Entry>> {
        self.notifying = true;
        Rc::clone(&self.live)
    }

    /// Mark the pass as finished and publish staged changes.
    pub(crate) fn end_pass(&mut self) {
        self.notifying = false;
        if let Some(staged) = self.staged.take() {
            self.live = Rc::new(staged);
        }
    }

    pub(crate) fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// Number of listeners the next pass would see.
    pub(crate) fn len(&self) -> usize {
        self.staged.as_ref().map_or(self.live.len(), Vec::len)
    }

    fn writable(&mut self) -> &mut Vec<Entry> {
        if self.notifying {
            let live = &self.live;
            self.staged.get_or_insert_with(|| live.as_ref().clone())
        } else {
            // No pass holds a snapshot here, so this never clones.
            Rc::make_mut(&mut self.live)
        }
    }
}
