//! System message flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// System flags stored on every message record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SystemFlags: u32 {
        /// Message has been answered.
        const ANSWERED     = 1 << 0;
        /// Message is marked for deletion.
        const DELETED      = 1 << 1;
        /// Message is a draft.
        const DRAFT        = 1 << 2;
        /// Message is flagged for special attention.
        const FLAGGED      = 1 << 3;
        /// Message has been read.
        const SEEN         = 1 << 4;
        /// Message has attachments.
        const ATTACHMENTS  = 1 << 5;
        /// Message has been answered to all recipients.
        const ANSWERED_ALL = 1 << 6;
        /// Message is junk.
        const JUNK         = 1 << 7;
        /// Message is signed or encrypted.
        const SECURE       = 1 << 8;
        /// Message was explicitly marked as not junk.
        const NOTJUNK      = 1 << 9;
        /// Message has been forwarded.
        const FORWARDED    = 1 << 10;
    }
}

const NAMES: &[(&str, SystemFlags)] = &[
    ("Answered", SystemFlags::ANSWERED),
    ("Deleted", SystemFlags::DELETED),
    ("Draft", SystemFlags::DRAFT),
    ("Flagged", SystemFlags::FLAGGED),
    ("Seen", SystemFlags::SEEN),
    ("Attachments", SystemFlags::ATTACHMENTS),
    ("AnsweredAll", SystemFlags::ANSWERED_ALL),
    ("Junk", SystemFlags::JUNK),
    ("Secure", SystemFlags::SECURE),
    ("NotJunk", SystemFlags::NOTJUNK),
    ("Forwarded", SystemFlags::FORWARDED),
];

impl SystemFlags {
    /// Resolves a flag name such as `"Seen"`, ignoring case.
    #[must_use]
    pub fn from_flag_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, flag)| *flag)
    }

    /// Parses a comma separated list of flag names.
    ///
    /// Returns `None` if any name is unknown. An empty string is the
    /// empty set.
    #[must_use]
    pub fn parse_list(list: &str) -> Option<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Self::empty(), |acc, name| Some(acc | Self::from_flag_name(name)?))
    }

    /// Returns the names of the flags set.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Applies `bits` under `mask`: `(self & !mask) | (bits & mask)`.
    #[must_use]
    pub fn apply(self, mask: Self, bits: Self) -> Self {
        (self & !mask) | (bits & mask)
    }

    /// Neither deleted nor junk.
    #[must_use]
    pub const fn is_visible(self) -> bool {
        !self.intersects(Self::DELETED.union(Self::JUNK))
    }
}
