//! Message body access for content predicates.
//!
//! Bodies come from the folder backend through [`BodySource`]; an
//! optional [`BodyIndex`] answers word lookups without fetching bodies.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexSet;
use tokio_util::sync::CancellationToken;

use crate::record::Uid;
use crate::sync::{read, write};

/// Supplies raw message bodies.
pub trait BodySource: Send + Sync {
    /// Returns true if the body is available without network access.
    fn is_cached(&self, uid: &str) -> bool;

    /// Opens the body of a message.
    ///
    /// Implementations doing slow I/O should watch `cancel` and give up
    /// with an error once it fires.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the body cannot be read.
    fn fetch_body(&self, uid: &str, cancel: &CancellationToken) -> io::Result<Box<dyn Read + Send>>;
}

/// Full-text index over message bodies.
pub trait BodyIndex: Send + Sync {
    /// Returns the UIDs whose body contains `word`, ignoring case.
    fn find(&self, word: &str) -> Vec<Uid>;
}

/// In-memory body store.
#[derive(Default)]
pub struct MemoryBodySource {
    bodies: RwLock<HashMap<Uid, String>>,
    uncached: RwLock<HashSet<Uid>>,
    fetches: AtomicUsize,
}

impl MemoryBodySource {
    /// Creates an empty body store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a body.
    pub fn insert(&self, uid: impl Into<Uid>, body: impl Into<String>) {
        write(&self.bodies).insert(uid.into(), body.into());
    }

    /// Marks a body as not available locally.
    pub fn mark_uncached(&self, uid: impl Into<Uid>) {
        write(&self.uncached).insert(uid.into());
    }

    /// Number of bodies opened so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl BodySource for MemoryBodySource {
    fn is_cached(&self, uid: &str) -> bool {
        read(&self.bodies).contains_key(uid) && !read(&self.uncached).contains(uid)
    }

    fn fetch_body(&self, uid: &str, cancel: &CancellationToken) -> io::Result<Box<dyn Read + Send>> {
        if cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
        }
        self.fetches.fetch_add(1, Ordering::Relaxed);
        read(&self.bodies)
            .get(uid)
            .map(|body| Box::new(Cursor::new(body.clone().into_bytes())) as Box<dyn Read + Send>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no body for {uid}")))
    }
}

/// Word index kept in memory.
#[derive(Default)]
pub struct MemoryBodyIndex {
    words: RwLock<HashMap<String, IndexSet<Uid>>>,
}

impl MemoryBodyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the words of a message body.
    pub fn add(&self, uid: &str, text: &str) {
        let mut words = write(&self.words);
        for word in tokenize(text) {
            words.entry(word).or_default().insert(uid.to_string());
        }
    }

    /// Drops a message from the index.
    pub fn remove(&self, uid: &str) {
        let mut words = write(&self.words);
        words.retain(|_, uids| {
            uids.shift_remove(uid);
            !uids.is_empty()
        });
    }
}

impl BodyIndex for MemoryBodyIndex {
    fn find(&self, word: &str) -> Vec<Uid> {
        let needle = word.to_lowercase();
        let words = read(&self.words);
        let mut out = IndexSet::new();
        for (indexed, uids) in words.iter() {
            if indexed.contains(&needle) {
                out.extend(uids.iter().cloned());
            }
        }
        out.into_iter().collect()
    }
}

/// Returns true if `needle` can be answered by a [`BodyIndex`] lookup.
///
/// Indexes store alphanumeric runs, so only needles that fit inside one
/// run give the same answer as a substring test on the whole body.
pub(crate) fn is_index_word(needle: &str) -> bool {
    !needle.is_empty() && needle.chars().all(char::is_alphanumeric)
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_body_source() {
        let source = MemoryBodySource::new();
        source.insert("1", "hello world");
        source.mark_uncached("1");
        assert!(!source.is_cached("1"));

        let mut body = String::new();
        source
            .fetch_body("1", &CancellationToken::new())
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "hello world");
        assert_eq!(source.fetch_count(), 1);
        assert!(source.fetch_body("2", &CancellationToken::new()).is_err());
    }

    #[test]
    fn test_memory_index() {
        let index = MemoryBodyIndex::new();
        index.add("1", "Quarterly REPORT attached");
        index.add("2", "lunch?");
        assert_eq!(index.find("report"), vec!["1"]);
        assert_eq!(index.find("lunch"), vec!["2"]);
        index.remove("1");
        assert!(index.find("report").is_empty());
    }

    #[test]
    fn test_is_index_word() {
        assert!(is_index_word("report"));
        assert!(is_index_word("Q3"));
        assert!(!is_index_word("see attached"));
        assert!(!is_index_word("good,"));
        assert!(!is_index_word(""));
    }
}
