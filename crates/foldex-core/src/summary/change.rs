//! Folder change events.

use std::sync::{Arc, Mutex};

use indexmap::IndexSet;
use tracing::trace;

use crate::record::Uid;
use crate::sync::lock;

/// UIDs added, removed and changed in one folder event.
///
/// Recording the same UID several times merges sensibly: a UID removed
/// and then added again is reported as changed, a UID added and then
/// removed disappears from the event altogether.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeInfo {
    /// UIDs that appeared.
    pub added: IndexSet<Uid>,
    /// UIDs that disappeared.
    pub removed: IndexSet<Uid>,
    /// UIDs whose record changed.
    pub changed: IndexSet<Uid>,
}

impl ChangeInfo {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an added UID.
    pub fn add_uid(&mut self, uid: &str) {
        if self.removed.shift_remove(uid) {
            self.changed.insert(uid.to_string());
        } else if !self.added.contains(uid) {
            self.added.insert(uid.to_string());
        }
    }

    /// Records a removed UID.
    pub fn remove_uid(&mut self, uid: &str) {
        self.changed.shift_remove(uid);
        if !self.added.shift_remove(uid) {
            self.removed.insert(uid.to_string());
        }
    }

    /// Records a changed UID.
    pub fn change_uid(&mut self, uid: &str) {
        if !self.added.contains(uid) && !self.removed.contains(uid) {
            self.changed.insert(uid.to_string());
        }
    }

    /// Folds another change set into this one.
    pub fn merge(&mut self, other: &Self) {
        for uid in &other.added {
            self.add_uid(uid);
        }
        for uid in &other.removed {
            self.remove_uid(uid);
        }
        for uid in &other.changed {
            self.change_uid(uid);
        }
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Added and changed UIDs, the ones whose current record matters.
    pub fn touched(&self) -> impl Iterator<Item = &Uid> {
        self.added.iter().chain(self.changed.iter())
    }
}

/// Callback invoked with each emitted change event.
pub type ChangeCallback = Arc<dyn Fn(&ChangeInfo) + Send + Sync>;

/// Handle identifying a change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber list with freeze/thaw batching.
///
/// Callbacks run on the emitting thread after all internal locks have
/// been released, so they may call back into the folder.
#[derive(Default)]
pub struct ChangeNotifier {
    state: Mutex<NotifierState>,
}

#[derive(Default)]
struct NotifierState {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, ChangeCallback)>,
    frozen: u32,
    pending: ChangeInfo,
}

impl ChangeNotifier {
    /// Creates a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback.
    pub fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.push((id, callback));
        id
    }

    /// Removes a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = lock(&self.state);
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() != before
    }

    /// Defers emission until the matching [`ChangeNotifier::thaw`].
    pub fn freeze(&self) {
        lock(&self.state).frozen += 1;
    }

    /// Ends one freeze level, flushing queued changes as a single event
    /// when the last level ends.
    pub fn thaw(&self) {
        let flush = {
            let mut state = lock(&self.state);
            state.frozen = state.frozen.saturating_sub(1);
            if state.frozen == 0 && !state.pending.is_empty() {
                let changes = std::mem::take(&mut state.pending);
                Some((changes, subscribers(&state)))
            } else {
                None
            }
        };

        if let Some((changes, subscribers)) = flush {
            trace!(
                added = changes.added.len(),
                removed = changes.removed.len(),
                changed = changes.changed.len(),
                "flushing frozen changes"
            );
            emit(&subscribers, &changes);
        }
    }

    /// Returns true while frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        lock(&self.state).frozen > 0
    }

    /// Emits `changes`, or queues them while frozen.
    pub fn notify(&self, changes: ChangeInfo) {
        if changes.is_empty() {
            return;
        }

        let subscribers = {
            let mut state = lock(&self.state);
            if state.frozen > 0 {
                state.pending.merge(&changes);
                return;
            }
            subscribers(&state)
        };

        emit(&subscribers, &changes);
    }
}

fn subscribers(state: &NotifierState) -> Vec<ChangeCallback> {
    state
        .subscribers
        .iter()
        .map(|(_, callback)| Arc::clone(callback))
        .collect()
}

fn emit(subscribers: &[ChangeCallback], changes: &ChangeInfo) {
    for callback in subscribers {
        callback(changes);
    }
}
