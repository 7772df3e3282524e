//! Virtual folders.
//!
//! A [`VeeFolder`] presents every message of its source folders that
//! matches one expression. Members are addressed by virtual UIDs: the
//! 8-character hash of the source followed by the source UID. Message data
//! always comes from the source; the virtual folder only remembers which
//! messages belong to it and the flags it saw last, which feed its
//! counters.
//!
//! Each source is subscribed to. Change events are re-evaluated for the
//! touched UIDs only. Writes made through the virtual folder mask the
//! source's own event for that UID and are re-evaluated directly.
//!
//! Re-evaluation runs under a settle lock, so results computed from an
//! older view of a source are applied before newer ones, never after.
//! Lock order is settle, virtual folder state, then source summary.
//! Source writes, which emit events, are never made under the virtual
//! folder's locks.

mod hash;
mod record;
mod unread;

use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub use hash::{HASH_LEN, make_vuid, source_hash, split_vuid};
pub use record::VirtualRecord;
pub use unread::DEFAULT_UNREAD_EXPRESSIONS;

use record::virtual_view;

use crate::config::IndexConfig;
use crate::folder::{Folder, MailFolder};
use crate::record::{MessageRecord, SystemFlags, Uid};
use crate::search::{FolderSearch, MessageSource};
use crate::summary::{ChangeCallback, ChangeInfo, ChangeNotifier, Counters, SubscriptionId};
use crate::sync::{lock, read, write};
use crate::{Error, Result};

/// Salted rehashes tried before giving up on a source name.
const MAX_HASH_ATTEMPTS: u32 = 16;

/// Composition state of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Not part of the virtual folder.
    NotComposed,
    /// Initial scan in progress; change events are queued.
    Composing,
    /// Steady state; change events are applied as they arrive.
    Composed,
}

/// A folder computed from other folders by an expression.
///
/// Cloning yields a handle to the same virtual folder.
#[derive(Clone)]
pub struct VeeFolder {
    inner: Arc<VeeInner>,
}

struct VeeInner {
    full_name: String,
    expression: RwLock<String>,
    configured_unread: Option<String>,
    forced_unread: Option<bool>,
    unread_mode: AtomicBool,
    search: FolderSearch,
    settle: Mutex<()>,
    state: Mutex<VeeState>,
    masks: Mutex<HashMap<String, HashMap<Uid, u32>>>,
    notifier: ChangeNotifier,
}

#[derive(Default)]
struct VeeState {
    sources: IndexMap<String, SourceEntry>,
    records: IndexMap<Uid, VirtualRecord>,
    counters: Counters,
    approx_visible: u32,
}

struct SourceEntry {
    folder: Folder,
    state: SourceState,
    subscription: Option<SubscriptionId>,
    pending: ChangeInfo,
}

impl VeeFolder {
    /// Creates an empty virtual folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Syntax`] if `expression` is malformed.
    pub fn new(name: impl Into<String>, expression: &str, config: &IndexConfig) -> Result<Self> {
        let search = FolderSearch::new(&config.search);
        search.parse(expression)?;

        let configured_unread = config.vfolder.unread_expression.clone();
        let forced_unread = config.vfolder.unread_mode;
        let unread_mode = forced_unread.unwrap_or_else(|| {
            unread::is_unread_expression(&search, expression, configured_unread.as_deref())
        });

        let full_name = name.into();
        debug!(vfolder = %full_name, unread_mode, "Created virtual folder");

        Ok(Self {
            inner: Arc::new(VeeInner {
                full_name,
                expression: RwLock::new(expression.to_string()),
                configured_unread,
                forced_unread,
                unread_mode: AtomicBool::new(unread_mode),
                search,
                settle: Mutex::new(()),
                state: Mutex::new(VeeState::default()),
                masks: Mutex::new(HashMap::new()),
                notifier: ChangeNotifier::new(),
            }),
        })
    }

    /// Current expression.
    #[must_use]
    pub fn expression(&self) -> String {
        self.inner.expression()
    }

    /// Returns true if members are kept after they stop matching until
    /// the next [`VeeFolder::resync`].
    #[must_use]
    pub fn is_unread_mode(&self) -> bool {
        self.inner.unread_mode()
    }

    /// Composes `folder` into this virtual folder and returns its hash.
    ///
    /// Adding a folder that is already composed returns its existing hash.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial search, in which case the source
    /// is left out entirely, or [`Error::Config`] if no free hash exists.
    pub fn add_source(&self, folder: &Folder) -> Result<String> {
        let hash = {
            let mut state = lock(&self.inner.state);
            if let Some(hash) = state.hash_of(folder) {
                return Ok(hash);
            }
            let hash = allocate_hash(&state.sources, folder.full_name())?;
            state.sources.insert(
                hash.clone(),
                SourceEntry {
                    folder: folder.clone(),
                    state: SourceState::Composing,
                    subscription: None,
                    pending: ChangeInfo::new(),
                },
            );
            hash
        };
        debug!(vfolder = %self.inner.full_name, source = %folder.full_name(), hash, "Composing source");

        let weak = Arc::downgrade(&self.inner);
        let source_key = hash.clone();
        let id = folder.on_change(Arc::new(move |changes: &ChangeInfo| {
            if let Some(inner) = weak.upgrade() {
                inner.source_changed(&source_key, changes);
            }
        }));
        let registered = match lock(&self.inner.state).sources.get_mut(&hash) {
            Some(entry) => {
                entry.subscription = Some(id);
                true
            }
            None => false,
        };
        if !registered {
            folder.remove_listener(id);
            return Ok(hash);
        }

        let expr = self.inner.expression();
        let found = match self
            .inner
            .search
            .search(folder.source(), &expr, None, &CancellationToken::new())
        {
            Ok(found) => found,
            Err(err) => {
                warn!(vfolder = %self.inner.full_name, source = %folder.full_name(), error = %err, "Initial scan failed");
                self.remove_source(folder);
                return Err(err);
            }
        };

        let mut out = ChangeInfo::new();
        let pending = {
            let mut state = lock(&self.inner.state);
            let Some(entry) = state.sources.get_mut(&hash) else {
                return Ok(hash);
            };
            entry.state = SourceState::Composed;
            let pending = std::mem::take(&mut entry.pending);
            for uid in &found {
                if let Some(real) = folder.get(uid) {
                    state.add_member(&hash, uid, real.flags, &mut out);
                }
            }
            pending
        };
        debug!(
            vfolder = %self.inner.full_name,
            source = %folder.full_name(),
            members = found.len(),
            "Source composed"
        );

        self.inner.notifier.notify(out);
        if !pending.is_empty() {
            self.inner.apply_source_changes(&hash, folder, &pending);
        }
        Ok(hash)
    }

    /// Removes `folder` and all of its members. Returns false if it was
    /// not a source.
    pub fn remove_source(&self, folder: &Folder) -> bool {
        let (hash, entry, out) = {
            let mut state = lock(&self.inner.state);
            let Some(hash) = state.hash_of(folder) else {
                return false;
            };
            let Some(entry) = state.sources.shift_remove(&hash) else {
                return false;
            };
            let mut out = ChangeInfo::new();
            for vuid in state.members_of(&hash) {
                state.remove_member(&vuid, &mut out);
            }
            (hash, entry, out)
        };

        if let Some(id) = entry.subscription {
            entry.folder.remove_listener(id);
        }
        lock(&self.inner.masks).remove(&hash);
        debug!(
            vfolder = %self.inner.full_name,
            source = %folder.full_name(),
            removed = out.removed.len(),
            "Source removed"
        );
        self.inner.notifier.notify(out);
        true
    }

    /// Composition state of `folder`.
    #[must_use]
    pub fn source_state(&self, folder: &Folder) -> SourceState {
        let state = lock(&self.inner.state);
        state
            .sources
            .values()
            .find(|entry| entry.folder.same(folder))
            .map_or(SourceState::NotComposed, |entry| entry.state)
    }

    /// Hash assigned to `folder`, if it is a source.
    #[must_use]
    pub fn source_hash_of(&self, folder: &Folder) -> Option<String> {
        lock(&self.inner.state).hash_of(folder)
    }

    /// Number of sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        lock(&self.inner.state).sources.len()
    }

    /// Membership entry for `vuid`.
    #[must_use]
    pub fn virtual_record(&self, vuid: &str) -> Option<VirtualRecord> {
        lock(&self.inner.state).records.get(vuid).cloned()
    }

    /// Approximate number of visible members still matching.
    ///
    /// In unread mode members that stop matching stay until the next
    /// resync, and this counter is adjusted incrementally from the flags
    /// last seen, so it can drift. [`VeeFolder::resync`] resets it to the
    /// exact value. Never use it where an exact count is required.
    #[must_use]
    pub fn approximate_visible_count(&self) -> u32 {
        lock(&self.inner.state).approx_visible
    }

    /// Replaces the expression and rebuilds membership.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Syntax`] if `expression` is malformed; the old
    /// expression stays in effect.
    pub fn set_expression(&self, expression: &str) -> Result<()> {
        self.inner.search.parse(expression)?;
        *write(&self.inner.expression) = expression.to_string();

        let unread_mode = self.inner.forced_unread.unwrap_or_else(|| {
            unread::is_unread_expression(
                &self.inner.search,
                expression,
                self.inner.configured_unread.as_deref(),
            )
        });
        self.inner.unread_mode.store(unread_mode, Ordering::Relaxed);
        debug!(vfolder = %self.inner.full_name, expression, unread_mode, "Expression changed");

        self.resync()
    }

    /// Re-evaluates every composed source from scratch.
    ///
    /// Drops stale members and resets the approximate visible count.
    ///
    /// # Errors
    ///
    /// Returns the first search error; membership is left untouched.
    pub fn resync(&self) -> Result<()> {
        let settle = lock(&self.inner.settle);
        let expr = self.inner.expression();
        let sources: Vec<(String, Folder)> = {
            let state = lock(&self.inner.state);
            state
                .sources
                .iter()
                .filter(|(_, entry)| entry.state == SourceState::Composed)
                .map(|(hash, entry)| (hash.clone(), entry.folder.clone()))
                .collect()
        };

        let mut results = Vec::with_capacity(sources.len());
        for (hash, folder) in sources {
            let found = self
                .inner
                .search
                .search(folder.source(), &expr, None, &CancellationToken::new())?;
            results.push((hash, folder, found));
        }

        let mut out = ChangeInfo::new();
        {
            let mut state = lock(&self.inner.state);
            for (hash, folder, found) in &results {
                if !state.sources.contains_key(hash) {
                    continue;
                }
                let wanted: HashSet<Uid> = found.iter().map(|uid| make_vuid(hash, uid)).collect();
                for vuid in state.members_of(hash) {
                    if !wanted.contains(&vuid) {
                        state.remove_member(&vuid, &mut out);
                    }
                }
                for uid in found {
                    let Some(real) = folder.get(uid) else {
                        continue;
                    };
                    let vuid = make_vuid(hash, uid);
                    if state.records.contains_key(&vuid) {
                        state.set_stale(&vuid, false);
                        if state.refresh(&vuid, real.flags) {
                            out.change_uid(&vuid);
                        }
                    } else {
                        state.add_member(hash, uid, real.flags, &mut out);
                    }
                }
            }
            state.approx_visible = state.exact_visible();
        }
        drop(settle);

        debug!(
            vfolder = %self.inner.full_name,
            added = out.added.len(),
            removed = out.removed.len(),
            "Resynced"
        );
        self.inner.notifier.notify(out);
        Ok(())
    }
}

impl MailFolder for VeeFolder {
    fn full_name(&self) -> &str {
        &self.inner.full_name
    }

    fn uids(&self) -> Vec<Uid> {
        lock(&self.inner.state).records.keys().cloned().collect()
    }

    fn get(&self, vuid: &str) -> Option<Arc<MessageRecord>> {
        self.inner
            .member_record(vuid)
            .or_else(|| self.inner.materialize(vuid))
    }

    fn counters(&self) -> Counters {
        lock(&self.inner.state).counters
    }

    fn search(&self, expr: &str, uids: Option<&[Uid]>, cancel: &CancellationToken) -> Result<Vec<Uid>> {
        self.inner.search.search(self.source(), expr, uids, cancel)
    }

    fn count(&self, expr: &str, cancel: &CancellationToken) -> Result<u32> {
        self.inner.search.count(self.source(), expr, cancel)
    }

    fn set_flags(&self, vuid: &str, mask: SystemFlags, bits: SystemFlags) -> bool {
        self.inner
            .write_through(vuid, |folder, uid| folder.set_flags(uid, mask, bits))
    }

    fn set_user_flag(&self, vuid: &str, name: &str, value: bool) -> bool {
        self.inner
            .write_through(vuid, |folder, uid| folder.set_user_flag(uid, name, value))
    }

    fn set_user_tag(&self, vuid: &str, name: &str, value: Option<&str>) -> bool {
        self.inner
            .write_through(vuid, |folder, uid| folder.set_user_tag(uid, name, value))
    }

    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId {
        self.inner.notifier.subscribe(callback)
    }

    fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    fn freeze(&self) {
        self.inner.notifier.freeze();
    }

    fn thaw(&self) {
        self.inner.notifier.thaw();
    }
}

impl VeeFolder {
    fn source(&self) -> Arc<dyn MessageSource> {
        Arc::clone(&self.inner) as Arc<dyn MessageSource>
    }
}

impl VeeInner {
    fn expression(&self) -> String {
        read(&self.expression).clone()
    }

    fn unread_mode(&self) -> bool {
        self.unread_mode.load(Ordering::Relaxed)
    }

    fn source_folder(&self, hash: &str) -> Option<Folder> {
        lock(&self.state)
            .sources
            .get(hash)
            .map(|entry| entry.folder.clone())
    }

    /// Real record behind a member, refreshing the flag snapshot.
    fn member_record(&self, vuid: &str) -> Option<Arc<MessageRecord>> {
        let (hash, uid) = split_vuid(vuid)?;
        let mut state = lock(&self.state);
        if !state.records.contains_key(vuid) {
            return None;
        }
        let folder = state.sources.get(hash)?.folder.clone();
        let Some(real) = folder.get(uid) else {
            state.warn_missing(&self.full_name, vuid);
            return None;
        };
        state.refresh(vuid, real.flags);
        Some(Arc::new(virtual_view(vuid, &real)))
    }

    /// Admits a matching message that has no membership entry yet.
    fn materialize(&self, vuid: &str) -> Option<Arc<MessageRecord>> {
        let (hash, uid) = split_vuid(vuid)?;
        let settle = lock(&self.settle);
        let folder = {
            let state = lock(&self.state);
            if state.records.contains_key(vuid) {
                return None;
            }
            let entry = state.sources.get(hash)?;
            if entry.state != SourceState::Composed {
                return None;
            }
            entry.folder.clone()
        };

        if !self.matches_one(&folder, uid) {
            return None;
        }
        let real = folder.get(uid)?;

        let mut out = ChangeInfo::new();
        {
            let mut state = lock(&self.state);
            if !state
                .sources
                .get(hash)
                .is_some_and(|entry| entry.state == SourceState::Composed)
            {
                return None;
            }
            state.add_member(hash, uid, real.flags, &mut out);
        }
        drop(settle);
        trace!(vfolder = %self.full_name, vuid, "Materialized member on lookup");
        self.notifier.notify(out);
        Some(Arc::new(virtual_view(vuid, &real)))
    }

    /// Evaluates the expression for one source UID; errors count as no
    /// match.
    fn matches_one(&self, folder: &Folder, uid: &str) -> bool {
        let subset = [uid.to_string()];
        match self.search.search(
            folder.source(),
            &self.expression(),
            Some(&subset),
            &CancellationToken::new(),
        ) {
            Ok(found) => !found.is_empty(),
            Err(err) => {
                warn!(vfolder = %self.full_name, uid, error = %err, "Re-evaluating message failed");
                false
            }
        }
    }

    fn mask(&self, hash: &str, uid: &str) {
        let mut masks = lock(&self.masks);
        *masks
            .entry(hash.to_string())
            .or_default()
            .entry(uid.to_string())
            .or_insert(0) += 1;
    }

    fn unmask(&self, hash: &str, uid: &str) {
        let mut masks = lock(&self.masks);
        let Some(masked) = masks.get_mut(hash) else {
            return;
        };
        if let Some(depth) = masked.get_mut(uid) {
            *depth -= 1;
            if *depth == 0 {
                masked.remove(uid);
            }
        }
        if masked.is_empty() {
            masks.remove(hash);
        }
    }

    /// Drops masked UIDs from the `changed` part of a source event.
    fn unmasked(&self, hash: &str, changes: &ChangeInfo) -> ChangeInfo {
        let masks = lock(&self.masks);
        let mut changes = changes.clone();
        if let Some(masked) = masks.get(hash) {
            changes.changed.retain(|uid| !masked.contains_key(uid));
        }
        changes
    }

    fn source_changed(&self, hash: &str, changes: &ChangeInfo) {
        let changes = self.unmasked(hash, changes);
        if changes.is_empty() {
            return;
        }

        let folder = {
            let mut state = lock(&self.state);
            let Some(entry) = state.sources.get_mut(hash) else {
                return;
            };
            match entry.state {
                SourceState::Composed => entry.folder.clone(),
                SourceState::Composing => {
                    entry.pending.merge(&changes);
                    trace!(vfolder = %self.full_name, hash, "Queued change during composition");
                    return;
                }
                SourceState::NotComposed => return,
            }
        };
        self.apply_source_changes(hash, &folder, &changes);
    }

    /// Re-evaluates the UIDs touched by a source event.
    fn apply_source_changes(&self, hash: &str, folder: &Folder, changes: &ChangeInfo) {
        let settle = lock(&self.settle);
        let touched: Vec<Uid> = changes.touched().cloned().collect();
        let matched: HashSet<Uid> = if touched.is_empty() {
            HashSet::new()
        } else {
            match self.search.search(
                folder.source(),
                &self.expression(),
                Some(&touched),
                &CancellationToken::new(),
            ) {
                Ok(found) => found.into_iter().collect(),
                Err(err) => {
                    warn!(vfolder = %self.full_name, hash, error = %err, "Re-evaluating changed messages failed");
                    return;
                }
            }
        };

        let unread_mode = self.unread_mode();
        let mut out = ChangeInfo::new();
        {
            let mut state = lock(&self.state);
            if !state
                .sources
                .get(hash)
                .is_some_and(|entry| entry.state == SourceState::Composed)
            {
                return;
            }

            for uid in &changes.removed {
                state.remove_member(&make_vuid(hash, uid), &mut out);
            }
            for uid in &touched {
                let vuid = make_vuid(hash, uid);
                let Some(real) = folder.get(uid) else {
                    state.remove_member(&vuid, &mut out);
                    continue;
                };
                let is_member = state.records.contains_key(&vuid);
                match (is_member, matched.contains(uid)) {
                    (false, true) => state.add_member(hash, uid, real.flags, &mut out),
                    (false, false) => {}
                    (true, true) => {
                        state.refresh(&vuid, real.flags);
                        state.set_stale(&vuid, false);
                        out.change_uid(&vuid);
                    }
                    (true, false) if unread_mode => {
                        state.refresh(&vuid, real.flags);
                        state.set_stale(&vuid, true);
                        out.change_uid(&vuid);
                    }
                    (true, false) => {
                        state.remove_member(&vuid, &mut out);
                    }
                }
            }
        }
        drop(settle);

        trace!(
            vfolder = %self.full_name,
            hash,
            added = out.added.len(),
            removed = out.removed.len(),
            changed = out.changed.len(),
            "Applied source changes"
        );
        self.notifier.notify(out);
    }

    /// Applies `apply` to the real record behind `vuid` with the source
    /// event masked, then re-evaluates the member.
    fn write_through(&self, vuid: &str, apply: impl FnOnce(&Folder, &str) -> bool) -> bool {
        let Some((hash, uid)) = split_vuid(vuid) else {
            return false;
        };
        let folder = {
            let state = lock(&self.state);
            if !state.records.contains_key(vuid) {
                return false;
            }
            match state.sources.get(hash) {
                Some(entry) => entry.folder.clone(),
                None => return false,
            }
        };

        self.mask(hash, uid);
        let changed = apply(&folder, uid);
        self.unmask(hash, uid);

        if !changed {
            if folder.get(uid).is_none() {
                lock(&self.state).warn_missing(&self.full_name, vuid);
            }
            return false;
        }

        let settle = lock(&self.settle);
        let still_matches = self.matches_one(&folder, uid);
        let unread_mode = self.unread_mode();
        let mut out = ChangeInfo::new();
        {
            let mut state = lock(&self.state);
            if state.records.contains_key(vuid) {
                match folder.get(uid) {
                    None => {
                        state.remove_member(vuid, &mut out);
                    }
                    Some(real) => {
                        state.refresh(vuid, real.flags);
                        if still_matches || unread_mode {
                            state.set_stale(vuid, !still_matches);
                            out.change_uid(vuid);
                        } else {
                            state.remove_member(vuid, &mut out);
                        }
                    }
                }
            }
        }
        drop(settle);
        self.notifier.notify(out);
        true
    }
}

impl Drop for VeeInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for entry in state.sources.values() {
            if let Some(id) = entry.subscription {
                entry.folder.remove_listener(id);
            }
        }
    }
}

impl MessageSource for VeeInner {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn uids(&self) -> Vec<Uid> {
        lock(&self.state).records.keys().cloned().collect()
    }

    fn record(&self, vuid: &str) -> Option<Arc<MessageRecord>> {
        self.member_record(vuid)
    }

    fn location(&self, vuid: &str) -> Option<String> {
        let (hash, _) = split_vuid(vuid)?;
        let state = lock(&self.state);
        if !state.records.contains_key(vuid) {
            return None;
        }
        state
            .sources
            .get(hash)
            .map(|entry| entry.folder.full_name().to_string())
    }

    fn body_cached(&self, vuid: &str) -> bool {
        let Some((hash, uid)) = split_vuid(vuid) else {
            return false;
        };
        self.source_folder(hash)
            .is_some_and(|folder| folder.source().body_cached(uid))
    }

    fn fetch_body(
        &self,
        vuid: &str,
        cancel: &CancellationToken,
    ) -> Option<io::Result<Box<dyn Read + Send>>> {
        let (hash, uid) = split_vuid(vuid)?;
        self.source_folder(hash)?.source().fetch_body(uid, cancel)
    }
}

impl VeeState {
    fn hash_of(&self, folder: &Folder) -> Option<String> {
        self.sources
            .iter()
            .find(|(_, entry)| entry.folder.same(folder))
            .map(|(hash, _)| hash.clone())
    }

    fn members_of(&self, hash: &str) -> Vec<Uid> {
        self.records
            .values()
            .filter(|record| record.source_hash() == hash)
            .map(|record| record.vuid().to_string())
            .collect()
    }

    fn add_member(&mut self, hash: &str, uid: &str, flags: SystemFlags, out: &mut ChangeInfo) {
        let vuid = make_vuid(hash, uid);
        if self.records.contains_key(&vuid) {
            return;
        }
        self.counters.add(flags);
        if flags.is_visible() {
            self.approx_visible += 1;
        }
        out.add_uid(&vuid);
        self.records.insert(vuid.clone(), VirtualRecord::new(vuid, flags));
    }

    fn remove_member(&mut self, vuid: &str, out: &mut ChangeInfo) -> bool {
        let Some(record) = self.records.shift_remove(vuid) else {
            return false;
        };
        self.counters.remove(record.old_flags);
        if !record.stale && record.old_flags.is_visible() {
            self.approx_visible = self.approx_visible.saturating_sub(1);
        }
        out.remove_uid(vuid);
        true
    }

    /// Moves the snapshot to `flags`. Returns true if it differed.
    fn refresh(&mut self, vuid: &str, flags: SystemFlags) -> bool {
        let Some(record) = self.records.get_mut(vuid) else {
            return false;
        };
        let old = record.old_flags;
        if old == flags {
            return false;
        }
        self.counters.update(old, flags);
        if !record.stale {
            match (old.is_visible(), flags.is_visible()) {
                (true, false) => self.approx_visible = self.approx_visible.saturating_sub(1),
                (false, true) => self.approx_visible += 1,
                _ => {}
            }
        }
        record.old_flags = flags;
        true
    }

    fn set_stale(&mut self, vuid: &str, stale: bool) {
        let Some(record) = self.records.get_mut(vuid) else {
            return;
        };
        if record.stale == stale {
            return;
        }
        record.stale = stale;
        if record.old_flags.is_visible() {
            if stale {
                self.approx_visible = self.approx_visible.saturating_sub(1);
            } else {
                self.approx_visible += 1;
            }
        }
    }

    fn exact_visible(&self) -> u32 {
        let visible = self
            .records
            .values()
            .filter(|record| !record.stale && record.old_flags.is_visible())
            .count();
        u32::try_from(visible).unwrap_or(u32::MAX)
    }

    fn warn_missing(&mut self, vfolder: &str, vuid: &str) {
        if let Some(record) = self.records.get_mut(vuid) {
            if !record.warned {
                record.warned = true;
                warn!(vfolder, vuid, "Real record behind virtual record is gone");
            }
        }
    }
}

fn allocate_hash(sources: &IndexMap<String, SourceEntry>, name: &str) -> Result<String> {
    for salt in 0..MAX_HASH_ATTEMPTS {
        let hash = source_hash(name, salt);
        if !sources.contains_key(&hash) {
            return Ok(hash);
        }
        warn!(source = name, hash, salt, "Source hash collision, rehashing");
    }
    Err(Error::Config(format!("No free source hash for {name}")))
}
