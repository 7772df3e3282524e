//! Thread expansion for `match-threads`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::record::{MessageRecord, Uid};

/// How far `match-threads` widens a match list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    /// Matches only.
    None,
    /// Every message in a matched thread.
    All,
    /// Matches and their replies.
    Replies,
    /// Matches, their replies and their ancestors.
    RepliesParents,
    /// Matches that are not part of any thread.
    Single,
}

impl ThreadMode {
    /// Parses a `match-threads` mode name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "all" => Some(Self::All),
            "replies" => Some(Self::Replies),
            "replies_parents" => Some(Self::RepliesParents),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

/// Parent/child links between the messages of one folder.
///
/// A message's parent is the nearest entry of its references that is
/// present in the folder.
#[derive(Debug, Default)]
pub struct ThreadIndex {
    order: Vec<Uid>,
    parent: HashMap<Uid, Uid>,
    children: HashMap<Uid, Vec<Uid>>,
}

impl ThreadIndex {
    /// Builds the index over `records`, in the given order.
    #[must_use]
    pub fn build(records: &[Arc<MessageRecord>]) -> Self {
        let by_message_id: HashMap<&str, &str> = records
            .iter()
            .filter_map(|r| r.message_id.as_deref().map(|id| (id, r.uid.as_str())))
            .collect();

        let mut index = Self {
            order: records.iter().map(|r| r.uid.clone()).collect(),
            ..Self::default()
        };
        for record in records {
            let parent = record
                .references
                .iter()
                .rev()
                .filter_map(|id| by_message_id.get(id.as_str()))
                .find(|uid| **uid != record.uid);
            if let Some(parent) = parent {
                index
                    .parent
                    .insert(record.uid.clone(), (*parent).to_string());
                index
                    .children
                    .entry((*parent).to_string())
                    .or_default()
                    .push(record.uid.clone());
            }
        }
        index
    }

    /// Widens `matches` according to `mode`, in folder order.
    #[must_use]
    pub fn expand(&self, mode: ThreadMode, matches: &[Uid]) -> Vec<Uid> {
        let mut keep: HashSet<&str> = HashSet::new();
        for uid in matches {
            match mode {
                ThreadMode::None => {
                    keep.insert(uid.as_str());
                }
                ThreadMode::All => {
                    let root = self.root(uid);
                    self.descendants(root, &mut keep);
                }
                ThreadMode::Replies => self.descendants(uid, &mut keep),
                ThreadMode::RepliesParents => {
                    self.descendants(uid, &mut keep);
                    self.ancestors(uid, &mut keep);
                }
                ThreadMode::Single => {
                    if !self.parent.contains_key(uid.as_str())
                        && !self.children.contains_key(uid.as_str())
                    {
                        keep.insert(uid.as_str());
                    }
                }
            }
        }

        self.order
            .iter()
            .filter(|uid| keep.contains(uid.as_str()))
            .cloned()
            .collect()
    }

    fn root<'a>(&'a self, uid: &'a str) -> &'a str {
        let mut seen = HashSet::new();
        let mut current = uid;
        while let Some(parent) = self.parent.get(current) {
            if !seen.insert(current) {
                break;
            }
            current = parent;
        }
        current
    }

    fn descendants<'a>(&'a self, uid: &'a str, keep: &mut HashSet<&'a str>) {
        let mut stack = vec![uid];
        while let Some(uid) = stack.pop() {
            if keep.insert(uid) {
                if let Some(children) = self.children.get(uid) {
                    stack.extend(children.iter().map(String::as_str));
                }
            }
        }
    }

    fn ancestors<'a>(&'a self, uid: &'a str, keep: &mut HashSet<&'a str>) {
        let mut seen = HashSet::new();
        let mut current = uid;
        while let Some(parent) = self.parent.get(current) {
            if !seen.insert(parent.as_str()) {
                break;
            }
            keep.insert(parent);
            current = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(uid: &str, id: &str, refs: &[&str]) -> Arc<MessageRecord> {
        Arc::new(
            MessageRecord::new(uid)
                .with_thread(id, refs.iter().map(ToString::to_string).collect()),
        )
    }

    fn folder() -> ThreadIndex {
        // 1 <- 2 <- 3, 4 alone, 5 replies to a message not in the folder
        ThreadIndex::build(&[
            message("1", "<a>", &[]),
            message("2", "<b>", &["<a>"]),
            message("3", "<c>", &["<a>", "<b>"]),
            message("4", "<d>", &[]),
            message("5", "<e>", &["<gone>"]),
        ])
    }

    fn uids(list: &[&str]) -> Vec<Uid> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_expand_modes() {
        let index = folder();
        let hit = uids(&["2"]);
        assert_eq!(index.expand(ThreadMode::None, &hit), uids(&["2"]));
        assert_eq!(index.expand(ThreadMode::All, &hit), uids(&["1", "2", "3"]));
        assert_eq!(index.expand(ThreadMode::Replies, &hit), uids(&["2", "3"]));
        assert_eq!(
            index.expand(ThreadMode::RepliesParents, &hit),
            uids(&["1", "2", "3"])
        );
    }

    #[test]
    fn test_single() {
        let index = folder();
        let all = uids(&["1", "2", "3", "4", "5"]);
        assert_eq!(index.expand(ThreadMode::Single, &all), uids(&["4", "5"]));
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let index = ThreadIndex::build(&[message("1", "<a>", &["<b>"]), message("2", "<b>", &["<a>"])]);
        let hit = uids(&["1"]);
        assert_eq!(index.expand(ThreadMode::All, &hit).len(), 2);
        assert_eq!(index.expand(ThreadMode::RepliesParents, &hit).len(), 2);
    }
}
