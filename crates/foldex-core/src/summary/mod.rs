//! Per-folder message summary.
//!
//! [`FolderSummary`] keeps one [`MessageRecord`] per UID together with
//! aggregate [`Counters`], tracks which records need saving and emits
//! [`ChangeInfo`] events to subscribers.
//!
//! Records are handed out as `Arc` snapshots; writers replace the
//! record copy-on-write, so a reader never observes a half-applied
//! update.

mod change;
mod counts;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, warn};

pub use change::{ChangeCallback, ChangeInfo, ChangeNotifier, SubscriptionId};
pub use counts::Counters;

use crate::record::{MessageRecord, SystemFlags, Uid};
use crate::storage::{RecordBackend, SaveBatch, SummaryHeader, UidRange};
use crate::sync::lock;
use crate::{Error, Result};

/// Summary format version written by this build.
pub const SUMMARY_VERSION: u32 = 1;

/// In-memory index of one folder's messages.
pub struct FolderSummary {
    folder_name: String,
    state: Mutex<SummaryState>,
    notifier: ChangeNotifier,
}

#[derive(Default)]
struct SummaryState {
    records: IndexMap<Uid, Arc<MessageRecord>>,
    counters: Counters,
    dirty: HashSet<Uid>,
    removed: HashSet<Uid>,
    extra: String,
}

impl FolderSummary {
    /// Creates an empty summary for `folder_name`.
    pub fn new(folder_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
            state: Mutex::new(SummaryState::default()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Folder this summary belongs to.
    #[must_use]
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Returns a snapshot of a record.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<Arc<MessageRecord>> {
        lock(&self.state).records.get(uid).cloned()
    }

    /// Returns true if `uid` is present.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        lock(&self.state).records.contains_key(uid)
    }

    /// All UIDs in insertion order.
    #[must_use]
    pub fn uids(&self) -> Vec<Uid> {
        lock(&self.state).records.keys().cloned().collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    /// Returns true if the summary holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        lock(&self.state).counters
    }

    /// Inserts or replaces a record.
    ///
    /// Inserting a record equal to the stored one does nothing. Returns
    /// whether the summary changed.
    pub fn insert(&self, record: MessageRecord) -> bool {
        self.insert_with(record, true)
    }

    /// Like [`FolderSummary::insert`], emitting a change event only when
    /// `notify` is set. Counters are updated either way.
    pub fn insert_with(&self, record: MessageRecord, notify: bool) -> bool {
        let uid = record.uid.clone();
        let mut changes = ChangeInfo::new();
        {
            let mut state = lock(&self.state);
            let SummaryState {
                records,
                counters,
                dirty,
                removed,
                ..
            } = &mut *state;

            match records.get_mut(&uid) {
                Some(existing) if **existing == record => return false,
                Some(existing) => {
                    counters.update(existing.flags, record.flags);
                    *existing = Arc::new(record);
                    changes.change_uid(&uid);
                }
                None => {
                    counters.add(record.flags);
                    records.insert(uid.clone(), Arc::new(record));
                    removed.remove(&uid);
                    changes.add_uid(&uid);
                }
            }
            dirty.insert(uid);
        }
        if notify {
            self.notifier.notify(changes);
        }
        true
    }

    /// Removes a record. Returns whether it was present.
    pub fn remove(&self, uid: &str) -> bool {
        {
            let mut state = lock(&self.state);
            let Some(record) = state.records.shift_remove(uid) else {
                return false;
            };
            state.counters.remove(record.flags);
            state.dirty.remove(uid);
            state.removed.insert(uid.to_string());
        }

        let mut changes = ChangeInfo::new();
        changes.remove_uid(uid);
        self.notifier.notify(changes);
        true
    }

    /// Replaces the flags selected by `mask` with the matching bits of
    /// `bits`. Returns whether any flag changed.
    pub fn set_flags(&self, uid: &str, mask: SystemFlags, bits: SystemFlags) -> bool {
        self.update(uid, |record| {
            let flags = record.flags.apply(mask, bits);
            (flags != record.flags).then_some(move |r: &mut MessageRecord| r.flags = flags)
        })
    }

    /// Sets or clears a user flag. Returns whether it changed.
    pub fn set_user_flag(&self, uid: &str, name: &str, value: bool) -> bool {
        self.update(uid, |record| {
            (record.user_flags.contains(name) != value).then_some(move |r: &mut MessageRecord| {
                if value {
                    r.user_flags.insert(name.to_string());
                } else {
                    r.user_flags.remove(name);
                }
            })
        })
    }

    /// Sets a user tag, or removes it when `value` is `None` or empty.
    /// Returns whether it changed.
    pub fn set_user_tag(&self, uid: &str, name: &str, value: Option<&str>) -> bool {
        let value = value.filter(|v| !v.is_empty());
        self.update(uid, |record| {
            (record.user_tags.get(name).map(String::as_str) != value).then_some(
                move |r: &mut MessageRecord| match value {
                    Some(v) => {
                        r.user_tags.insert(name.to_string(), v.to_string());
                    }
                    None => {
                        r.user_tags.remove(name);
                    }
                },
            )
        })
    }

    /// Applies the edit returned by `plan`, if any, copy-on-write.
    fn update<F, E>(&self, uid: &str, plan: F) -> bool
    where
        F: FnOnce(&MessageRecord) -> Option<E>,
        E: FnOnce(&mut MessageRecord),
    {
        {
            let mut state = lock(&self.state);
            let SummaryState {
                records,
                counters,
                dirty,
                ..
            } = &mut *state;

            let Some(entry) = records.get_mut(uid) else {
                return false;
            };
            let Some(edit) = plan(&**entry) else {
                return false;
            };

            let old_flags = entry.flags;
            let record = Arc::make_mut(entry);
            edit(record);
            counters.update(old_flags, record.flags);
            dirty.insert(uid.to_string());
        }

        let mut changes = ChangeInfo::new();
        changes.change_uid(uid);
        self.notifier.notify(changes);
        true
    }

    /// Recomputes the counters from every record. Returns the result.
    pub fn recompute_counters(&self) -> Counters {
        let mut state = lock(&self.state);
        let counters = Counters::from_flags(state.records.values().map(|r| r.flags));
        if counters != state.counters {
            warn!(
                folder = %self.folder_name,
                ?counters,
                previous = ?state.counters,
                "Counters drifted; recomputed"
            );
        }
        state.counters = counters;
        counters
    }

    /// Backend-specific data saved in the header.
    #[must_use]
    pub fn extra(&self) -> String {
        lock(&self.state).extra.clone()
    }

    /// Replaces the backend-specific header data.
    pub fn set_extra(&self, extra: impl Into<String>) {
        lock(&self.state).extra = extra.into();
    }

    /// Returns true if there are unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let state = lock(&self.state);
        !state.dirty.is_empty() || !state.removed.is_empty()
    }

    /// Defers change events until [`FolderSummary::thaw`].
    pub fn freeze(&self) {
        self.notifier.freeze();
    }

    /// Ends one freeze level.
    pub fn thaw(&self) {
        self.notifier.thaw();
    }

    /// Returns true while change events are deferred.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.notifier.is_frozen()
    }

    /// Registers a change callback.
    pub fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    /// Removes a change callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Replaces the in-memory contents with the persisted summary.
    ///
    /// Nothing in memory changes unless the whole load succeeds. A folder
    /// that was never saved loads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleFormat`] if the summary was written by
    /// a newer version, or a storage error if reading fails.
    pub async fn load(&self, backend: &dyn RecordBackend) -> Result<()> {
        let header = backend.header(&self.folder_name).await?;
        let (records, extra) = match header {
            Some(header) => {
                if header.version > SUMMARY_VERSION {
                    return Err(Error::IncompatibleFormat {
                        found: header.version,
                        supported: SUMMARY_VERSION,
                    });
                }
                let records = backend.get_range(&self.folder_name, &UidRange::All).await?;
                let counters = Counters::from_flags(records.iter().map(|r| r.flags));
                if counters != header.counters {
                    warn!(
                        folder = %self.folder_name,
                        stored = ?header.counters,
                        actual = ?counters,
                        "Stored counters disagree with records"
                    );
                }
                (records, header.extra)
            }
            None => (Vec::new(), String::new()),
        };

        let mut loaded = SummaryState {
            extra,
            ..SummaryState::default()
        };
        for record in records {
            loaded.counters.add(record.flags);
            loaded.records.insert(record.uid.clone(), Arc::new(record));
        }

        debug!(folder = %self.folder_name, count = loaded.records.len(), "Loaded summary");
        *lock(&self.state) = loaded;
        Ok(())
    }

    /// Writes dirty records, deletions and the header.
    ///
    /// Dirty tracking is cleared only for what was written, and only once
    /// the backend reports success. Returns the number of records written
    /// or deleted.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the in-memory summary stays dirty.
    pub async fn save(&self, backend: &dyn RecordBackend) -> Result<usize> {
        let batch = {
            let state = lock(&self.state);
            SaveBatch {
                header: SummaryHeader {
                    version: SUMMARY_VERSION,
                    saved_at: Utc::now(),
                    counters: state.counters,
                    extra: state.extra.clone(),
                },
                put: state
                    .dirty
                    .iter()
                    .filter_map(|uid| state.records.get(uid))
                    .map(|record| MessageRecord::clone(record))
                    .collect(),
                delete: state.removed.iter().cloned().collect(),
            }
        };

        backend.commit(&self.folder_name, &batch).await?;

        {
            let mut state = lock(&self.state);
            for record in &batch.put {
                let unchanged = state
                    .records
                    .get(&record.uid)
                    .is_some_and(|current| **current == *record);
                if unchanged {
                    state.dirty.remove(&record.uid);
                }
            }
            for uid in &batch.delete {
                if !state.records.contains_key(uid) {
                    state.removed.remove(uid);
                }
            }
        }

        debug!(
            folder = %self.folder_name,
            written = batch.put.len(),
            deleted = batch.delete.len(),
            "Saved summary"
        );
        Ok(batch.put.len() + batch.delete.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;

    fn summary_with(uids: &[&str]) -> FolderSummary {
        let summary = FolderSummary::new("INBOX");
        for uid in uids {
            summary.insert(MessageRecord::new(*uid));
        }
        summary
    }

    fn capture(summary: &FolderSummary) -> Arc<Mutex<Vec<ChangeInfo>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        summary.subscribe(Arc::new(move |c: &ChangeInfo| {
            sink.lock().unwrap().push(c.clone());
        }));
        events
    }

    #[test]
    fn test_insert_is_idempotent() {
        let summary = FolderSummary::new("INBOX");
        let events = capture(&summary);

        assert!(summary.insert(MessageRecord::new("1")));
        assert!(!summary.insert(MessageRecord::new("1")));
        assert!(summary.insert(MessageRecord::new("1").with_flags(SystemFlags::SEEN)));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].added.contains("1"));
        assert!(events[1].changed.contains("1"));
        assert_eq!(summary.counters().unread, 0);
    }

    #[test]
    fn test_insert_without_notify() {
        let summary = FolderSummary::new("INBOX");
        let events = capture(&summary);

        assert!(summary.insert_with(MessageRecord::new("1"), false));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(summary.counters().total, 1);
        assert!(summary.is_dirty());
    }

    #[test]
    fn test_set_flags() {
        let summary = summary_with(&["1"]);
        let events = capture(&summary);

        assert!(summary.set_flags("1", SystemFlags::SEEN, SystemFlags::SEEN));
        assert!(!summary.set_flags("1", SystemFlags::SEEN, SystemFlags::SEEN));
        assert!(!summary.set_flags("missing", SystemFlags::SEEN, SystemFlags::SEEN));

        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(summary.counters().unread, 0);
        assert!(summary.get("1").unwrap().flags.contains(SystemFlags::SEEN));
    }

    #[test]
    fn test_snapshots_are_stable() {
        let summary = summary_with(&["1"]);
        let before = summary.get("1").unwrap();
        summary.set_flags("1", SystemFlags::FLAGGED, SystemFlags::FLAGGED);
        assert!(before.flags.is_empty());
        assert!(summary.get("1").unwrap().flags.contains(SystemFlags::FLAGGED));
    }

    #[test]
    fn test_user_flags_and_tags() {
        let summary = summary_with(&["1"]);
        assert!(summary.set_user_flag("1", "work", true));
        assert!(!summary.set_user_flag("1", "work", true));
        assert!(summary.set_user_tag("1", "color", Some("red")));
        assert!(!summary.set_user_tag("1", "color", Some("red")));

        let record = summary.get("1").unwrap();
        assert!(record.user_flags.contains("work"));
        assert_eq!(record.user_tags.get("color").unwrap(), "red");

        assert!(summary.set_user_tag("1", "color", Some("")));
        assert!(summary.get("1").unwrap().user_tags.is_empty());
    }

    #[test]
    fn test_remove_updates_counters() {
        let summary = summary_with(&["1", "2"]);
        let events = capture(&summary);
        assert!(summary.remove("1"));
        assert!(!summary.remove("1"));
        assert_eq!(summary.counters().total, 1);
        assert_eq!(summary.uids(), vec!["2"]);
        assert!(events.lock().unwrap()[0].removed.contains("1"));
    }

    #[test]
    fn test_frozen_changes_merge() {
        let summary = summary_with(&["1", "2"]);
        let events = capture(&summary);

        summary.freeze();
        summary.set_flags("1", SystemFlags::SEEN, SystemFlags::SEEN);
        summary.insert(MessageRecord::new("3"));
        summary.remove("3");
        summary.set_flags("2", SystemFlags::SEEN, SystemFlags::SEEN);
        assert!(events.lock().unwrap().is_empty());
        summary.thaw();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].changed.len(), 2);
        assert!(events[0].added.is_empty());
        assert!(events[0].removed.is_empty());
    }

    #[test]
    fn test_recompute_counters() {
        let summary = summary_with(&["1", "2"]);
        summary.set_flags("2", SystemFlags::DELETED, SystemFlags::DELETED);
        let counters = summary.recompute_counters();
        assert_eq!(counters, summary.counters());
        assert_eq!(counters.deleted, 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let summary = summary_with(&["1", "2", "3"]);
        summary.set_flags("2", SystemFlags::SEEN, SystemFlags::SEEN);
        summary.set_extra("uidvalidity=7");
        assert!(summary.is_dirty());

        assert_eq!(summary.save(&backend).await.unwrap(), 3);
        assert!(!summary.is_dirty());

        summary.remove("3");
        assert_eq!(summary.save(&backend).await.unwrap(), 1);

        let reloaded = FolderSummary::new("INBOX");
        reloaded.load(&backend).await.unwrap();
        assert_eq!(reloaded.uids(), vec!["1", "2"]);
        assert_eq!(reloaded.counters(), summary.counters());
        assert_eq!(reloaded.extra(), "uidvalidity=7");
        assert!(!reloaded.is_dirty());
    }

    #[tokio::test]
    async fn test_load_rejects_newer_format() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend
            .set_header(
                "INBOX",
                &SummaryHeader {
                    version: SUMMARY_VERSION + 1,
                    saved_at: Utc::now(),
                    counters: Counters::default(),
                    extra: String::new(),
                },
            )
            .await
            .unwrap();

        let summary = summary_with(&["1"]);
        let err = summary.load(&backend).await.unwrap_err();
        assert!(matches!(err, Error::IncompatibleFormat { found, .. } if found == SUMMARY_VERSION + 1));
        assert_eq!(summary.uids(), vec!["1"]);
    }
}
