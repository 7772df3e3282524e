//! Aggregate folder counters.

use serde::{Deserialize, Serialize};

use crate::record::SystemFlags;

/// Message counters maintained incrementally by a folder summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// All messages.
    pub total: u32,
    /// Messages without the seen flag.
    pub unread: u32,
    /// Messages marked deleted.
    pub deleted: u32,
    /// Messages marked junk.
    pub junk: u32,
    /// Messages marked junk but not deleted.
    pub junk_not_deleted: u32,
    /// Messages neither deleted nor junk.
    pub visible: u32,
}

impl Counters {
    /// Computes counters from scratch.
    pub fn from_flags(flags: impl IntoIterator<Item = SystemFlags>) -> Self {
        let mut counters = Self::default();
        for f in flags {
            counters.add(f);
        }
        counters
    }

    /// Accounts for a message with `flags` entering the folder.
    pub const fn add(&mut self, flags: SystemFlags) {
        self.total += 1;
        self.apply(flags, 1);
    }

    /// Accounts for a message with `flags` leaving the folder.
    pub const fn remove(&mut self, flags: SystemFlags) {
        self.total = self.total.saturating_sub(1);
        self.apply(flags, -1);
    }

    /// Accounts for a flag change on a message already counted.
    pub const fn update(&mut self, old: SystemFlags, new: SystemFlags) {
        self.apply(old, -1);
        self.apply(new, 1);
    }

    const fn apply(&mut self, flags: SystemFlags, sign: i32) {
        let deleted = flags.contains(SystemFlags::DELETED);
        let junk = flags.contains(SystemFlags::JUNK);

        if !flags.contains(SystemFlags::SEEN) {
            self.unread = step(self.unread, sign);
        }
        if deleted {
            self.deleted = step(self.deleted, sign);
        }
        if junk {
            self.junk = step(self.junk, sign);
            if !deleted {
                self.junk_not_deleted = step(self.junk_not_deleted, sign);
            }
        }
        if !deleted && !junk {
            self.visible = step(self.visible, sign);
        }
    }

    /// Number of messages with the seen flag.
    #[must_use]
    pub const fn seen(&self) -> u32 {
        self.total.saturating_sub(self.unread)
    }
}

const fn step(value: u32, sign: i32) -> u32 {
    if sign >= 0 {
        value + 1
    } else {
        value.saturating_sub(1)
    }
}
