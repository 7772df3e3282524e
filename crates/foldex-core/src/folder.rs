//! Searchable folders.

use std::io::{self, Read};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::body::{BodyIndex, BodySource};
use crate::config::SearchConfig;
use crate::record::{MessageRecord, SystemFlags, Uid};
use crate::search::{FolderSearch, MessageSource};
use crate::storage::RecordBackend;
use crate::summary::{ChangeCallback, Counters, FolderSummary, SubscriptionId};

/// Operations shared by real and virtual folders.
pub trait MailFolder: Send + Sync {
    /// Full folder name.
    fn full_name(&self) -> &str;

    /// UIDs in folder order.
    fn uids(&self) -> Vec<Uid>;

    /// Snapshot of one message record.
    fn get(&self, uid: &str) -> Option<Arc<MessageRecord>>;

    /// Current counters.
    fn counters(&self) -> Counters;

    /// Returns the UIDs matching `expr`, optionally within `uids`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Syntax`] for bad expressions and
    /// [`crate::Error::Cancelled`] when `cancel` fires.
    fn search(&self, expr: &str, uids: Option<&[Uid]>, cancel: &CancellationToken) -> Result<Vec<Uid>>;

    /// Counts the messages matching `expr`.
    ///
    /// # Errors
    ///
    /// Same as [`MailFolder::search`].
    fn count(&self, expr: &str, cancel: &CancellationToken) -> Result<u32>;

    /// Replaces the flags selected by `mask` with `bits`. Returns whether
    /// anything changed.
    fn set_flags(&self, uid: &str, mask: SystemFlags, bits: SystemFlags) -> bool;

    /// Sets or clears a user flag.
    fn set_user_flag(&self, uid: &str, name: &str, value: bool) -> bool;

    /// Sets or removes a user tag.
    fn set_user_tag(&self, uid: &str, name: &str, value: Option<&str>) -> bool;

    /// Subscribes to change events.
    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId;

    /// Cancels a subscription.
    fn remove_listener(&self, id: SubscriptionId) -> bool;

    /// Starts batching change events.
    fn freeze(&self);

    /// Ends one batching level.
    fn thaw(&self);
}

/// A real folder: a summary plus optional body access.
///
/// Cloning is cheap and yields a handle to the same folder.
#[derive(Clone)]
pub struct Folder {
    inner: Arc<FolderInner>,
}

struct FolderInner {
    summary: FolderSummary,
    body: Option<Arc<dyn BodySource>>,
    index: Option<Arc<dyn BodyIndex>>,
    search: Arc<FolderSearch>,
}

/// Builder for [`Folder`].
pub struct FolderBuilder {
    name: String,
    config: SearchConfig,
    body: Option<Arc<dyn BodySource>>,
    index: Option<Arc<dyn BodyIndex>>,
    search: Option<Arc<FolderSearch>>,
}

impl FolderBuilder {
    /// Search settings used when no shared searcher is given.
    #[must_use]
    pub fn config(mut self, config: &SearchConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Backend supplying message bodies.
    #[must_use]
    pub fn body_source(mut self, body: Arc<dyn BodySource>) -> Self {
        self.body = Some(body);
        self
    }

    /// Full-text index consulted by `body-contains`.
    #[must_use]
    pub fn body_index(mut self, index: Arc<dyn BodyIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Searcher shared with other folders.
    #[must_use]
    pub fn searcher(mut self, search: Arc<FolderSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Builds the folder.
    #[must_use]
    pub fn build(self) -> Folder {
        let search = self
            .search
            .unwrap_or_else(|| Arc::new(FolderSearch::new(&self.config)));
        Folder {
            inner: Arc::new(FolderInner {
                summary: FolderSummary::new(self.name),
                body: self.body,
                index: self.index,
                search,
            }),
        }
    }
}

impl Folder {
    /// Creates an empty folder with default settings and no bodies.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Starts building a folder.
    pub fn builder(name: impl Into<String>) -> FolderBuilder {
        FolderBuilder {
            name: name.into(),
            config: SearchConfig::default(),
            body: None,
            index: None,
            search: None,
        }
    }

    /// The folder's summary.
    #[must_use]
    pub fn summary(&self) -> &FolderSummary {
        &self.inner.summary
    }

    /// Returns true if both handles refer to the same folder.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Adds or replaces a record, emitting a change event if it differs.
    pub fn insert(&self, record: MessageRecord) -> bool {
        self.inner.summary.insert(record)
    }

    /// Removes a record. Returns false if it was not there.
    pub fn remove(&self, uid: &str) -> bool {
        self.inner.summary.remove(uid)
    }

    /// Returns true while change events are batched.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.summary.is_frozen()
    }

    /// Evaluates `expr` against one message.
    ///
    /// # Errors
    ///
    /// Same as [`MailFolder::search`].
    pub fn matches(&self, expr: &str, uid: &str, cancel: &CancellationToken) -> Result<bool> {
        self.inner.search.matches(self.source(), expr, uid, cancel)
    }

    /// Loads the summary from `backend`.
    ///
    /// # Errors
    ///
    /// See [`FolderSummary::load`].
    pub async fn load(&self, backend: &dyn RecordBackend) -> Result<()> {
        self.inner.summary.load(backend).await
    }

    /// Saves the summary to `backend`.
    ///
    /// # Errors
    ///
    /// See [`FolderSummary::save`].
    pub async fn save(&self, backend: &dyn RecordBackend) -> Result<usize> {
        self.inner.summary.save(backend).await
    }

    pub(crate) fn source(&self) -> Arc<dyn MessageSource> {
        Arc::clone(&self.inner) as Arc<dyn MessageSource>
    }
}

impl MailFolder for Folder {
    fn full_name(&self) -> &str {
        self.inner.summary.folder_name()
    }

    fn uids(&self) -> Vec<Uid> {
        self.inner.summary.uids()
    }

    fn get(&self, uid: &str) -> Option<Arc<MessageRecord>> {
        self.inner.summary.get(uid)
    }

    fn counters(&self) -> Counters {
        self.inner.summary.counters()
    }

    fn search(&self, expr: &str, uids: Option<&[Uid]>, cancel: &CancellationToken) -> Result<Vec<Uid>> {
        self.inner.search.search(self.source(), expr, uids, cancel)
    }

    fn count(&self, expr: &str, cancel: &CancellationToken) -> Result<u32> {
        self.inner.search.count(self.source(), expr, cancel)
    }

    fn set_flags(&self, uid: &str, mask: SystemFlags, bits: SystemFlags) -> bool {
        self.inner.summary.set_flags(uid, mask, bits)
    }

    fn set_user_flag(&self, uid: &str, name: &str, value: bool) -> bool {
        self.inner.summary.set_user_flag(uid, name, value)
    }

    fn set_user_tag(&self, uid: &str, name: &str, value: Option<&str>) -> bool {
        self.inner.summary.set_user_tag(uid, name, value)
    }

    fn on_change(&self, callback: ChangeCallback) -> SubscriptionId {
        self.inner.summary.subscribe(callback)
    }

    fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.inner.summary.unsubscribe(id)
    }

    fn freeze(&self) {
        self.inner.summary.freeze();
    }

    fn thaw(&self) {
        self.inner.summary.thaw();
    }
}

impl MessageSource for FolderInner {
    fn full_name(&self) -> &str {
        self.summary.folder_name()
    }

    fn uids(&self) -> Vec<Uid> {
        self.summary.uids()
    }

    fn record(&self, uid: &str) -> Option<Arc<MessageRecord>> {
        self.summary.get(uid)
    }

    fn counters(&self) -> Option<Counters> {
        Some(self.summary.counters())
    }

    fn body_cached(&self, uid: &str) -> bool {
        self.body.as_ref().is_some_and(|body| body.is_cached(uid))
    }

    fn fetch_body(
        &self,
        uid: &str,
        cancel: &CancellationToken,
    ) -> Option<io::Result<Box<dyn Read + Send>>> {
        self.body.as_ref().map(|body| body.fetch_body(uid, cancel))
    }

    fn index_find(&self, word: &str) -> Option<Vec<Uid>> {
        self.index.as_ref().map(|index| index.find(word))
    }
}
