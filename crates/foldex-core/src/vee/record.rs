//! Virtual message records.

use super::hash::split_vuid;
use crate::record::{MessageRecord, SystemFlags, Uid};

/// Membership entry of a virtual folder.
///
/// Holds no message data of its own: the real record is looked up in
/// the source folder on every access. Only the flags last seen are kept,
/// to turn later reads into counter deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRecord {
    vuid: Uid,
    pub(crate) old_flags: SystemFlags,
    pub(crate) stale: bool,
    pub(crate) warned: bool,
}

impl VirtualRecord {
    pub(crate) const fn new(vuid: Uid, flags: SystemFlags) -> Self {
        Self {
            vuid,
            old_flags: flags,
            stale: false,
            warned: false,
        }
    }

    /// Virtual UID.
    #[must_use]
    pub fn vuid(&self) -> &str {
        &self.vuid
    }

    /// Hash of the owning source folder.
    #[must_use]
    pub fn source_hash(&self) -> &str {
        split_vuid(&self.vuid).map_or("", |(hash, _)| hash)
    }

    /// UID in the owning source folder.
    #[must_use]
    pub fn source_uid(&self) -> &str {
        split_vuid(&self.vuid).map_or("", |(_, uid)| uid)
    }

    /// Flags seen on the real record at the last read.
    #[must_use]
    pub const fn old_flags(&self) -> SystemFlags {
        self.old_flags
    }

    /// True for a member kept in unread mode after it stopped matching.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Presents a real record under its virtual UID.
pub(crate) fn virtual_view(vuid: &str, real: &MessageRecord) -> MessageRecord {
    MessageRecord {
        uid: vuid.to_string(),
        ..real.clone()
    }
}
