//! Persistent record storage.
//!
//! A [`RecordBackend`] stores per-folder message records and a small
//! header describing the saved summary. [`SqliteBackend`] is the stock
//! implementation.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteBackend;

use crate::Result;
use crate::record::{MessageRecord, Uid, uid_cmp};
use crate::summary::Counters;

/// Header stored alongside a folder's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryHeader {
    /// Format version the summary was written with.
    pub version: u32,
    /// When the summary was last saved.
    pub saved_at: DateTime<Utc>,
    /// Counters at save time.
    pub counters: Counters,
    /// Backend-specific opaque data.
    pub extra: String,
}

/// Range of UIDs to load, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidRange {
    /// Every stored record.
    All,
    /// Records ordered between `first` and `last` by [`uid_cmp`].
    Between {
        /// Lower bound.
        first: Uid,
        /// Upper bound.
        last: Uid,
    },
}

impl UidRange {
    /// Returns true if `uid` falls inside the range.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        match self {
            Self::All => true,
            Self::Between { first, last } => {
                uid_cmp(uid, first).is_ge() && uid_cmp(uid, last).is_le()
            }
        }
    }
}

/// Everything one save writes.
#[derive(Debug, Clone)]
pub struct SaveBatch {
    /// New header.
    pub header: SummaryHeader,
    /// Records to insert or replace.
    pub put: Vec<MessageRecord>,
    /// UIDs to delete.
    pub delete: Vec<Uid>,
}

/// Storage for folder summaries.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn put(&self, folder: &str, record: &MessageRecord) -> Result<()>;

    /// Loads the records of a folder inside `range`, ordered by UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or a row is corrupt.
    async fn get_range(&self, folder: &str, range: &UidRange) -> Result<Vec<MessageRecord>>;

    /// Deletes records.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn delete(&self, folder: &str, uids: &[Uid]) -> Result<()>;

    /// Reads the folder header, if one was ever saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn header(&self, folder: &str) -> Result<Option<SummaryHeader>>;

    /// Writes the folder header.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_header(&self, folder: &str, header: &SummaryHeader) -> Result<()>;

    /// Applies a whole save. Backends that support transactions should
    /// make this atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    async fn commit(&self, folder: &str, batch: &SaveBatch) -> Result<()> {
        for record in &batch.put {
            self.put(folder, record).await?;
        }
        if !batch.delete.is_empty() {
            self.delete(folder, &batch.delete).await?;
        }
        self.set_header(folder, &batch.header).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_range() {
        let range = UidRange::Between {
            first: "5".to_string(),
            last: "20".to_string(),
        };
        assert!(range.contains("5"));
        assert!(range.contains("10"));
        assert!(range.contains("20"));
        assert!(!range.contains("4"));
        assert!(!range.contains("100"));
        assert!(UidRange::All.contains("anything"));
    }
}
