//! Message record model.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SystemFlags;

/// Opaque message identifier, unique within one folder.
pub type Uid = String;

/// Per-message metadata kept in a folder's index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message UID.
    pub uid: Uid,
    /// System flags.
    pub flags: SystemFlags,
    /// Free-form labels.
    pub user_flags: BTreeSet<String>,
    /// Key/value tags such as `follow-up`.
    pub user_tags: BTreeMap<String, String>,
    /// Approximate raw message size in bytes.
    pub size: u64,
    /// Date the message was sent.
    pub sent_date: Option<DateTime<Utc>>,
    /// Date the message was received.
    pub received_date: Option<DateTime<Utc>>,
    /// `Message-ID` header value.
    pub message_id: Option<String>,
    /// Message-IDs from `References`/`In-Reply-To`, oldest first.
    pub references: Vec<String>,
    /// `Subject` header.
    pub subject: String,
    /// `From` header.
    pub from: String,
    /// `To` header.
    pub to: String,
    /// `Cc` header.
    pub cc: String,
    /// Mailing list identifier.
    pub mlist: String,
    /// Any other headers kept for searching, keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
}

impl MessageRecord {
    /// Creates an empty record with the given UID.
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    /// Sets the system flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: SystemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Sets the size in bytes.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the sent and received dates.
    #[must_use]
    pub const fn with_dates(mut self, sent: DateTime<Utc>, received: DateTime<Utc>) -> Self {
        self.sent_date = Some(sent);
        self.received_date = Some(received);
        self
    }

    /// Sets threading identifiers.
    #[must_use]
    pub fn with_thread(mut self, message_id: impl Into<String>, references: Vec<String>) -> Self {
        self.message_id = Some(message_id.into());
        self.references = references;
        self
    }

    /// Returns a header value by name, ignoring case.
    ///
    /// Summary headers are served from their dedicated fields; anything
    /// else comes from [`MessageRecord::headers`].
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "subject" => Some(self.subject.as_str()),
            "from" => Some(self.from.as_str()),
            "to" => Some(self.to.as_str()),
            "cc" => Some(self.cc.as_str()),
            "x-camel-mlist" | "mlist" => Some(self.mlist.as_str()),
            "message-id" => self.message_id.as_deref(),
            _ => self.headers.get(&lower).map(String::as_str),
        }
        .filter(|value| !value.is_empty())
    }

    /// Renders all known headers as `Name: value` lines.
    #[must_use]
    pub fn header_block(&self) -> String {
        let mut out = String::new();
        let fixed = [
            ("Subject", self.subject.as_str()),
            ("From", self.from.as_str()),
            ("To", self.to.as_str()),
            ("Cc", self.cc.as_str()),
            ("X-Camel-MList", self.mlist.as_str()),
            ("Message-ID", self.message_id.as_deref().unwrap_or_default()),
        ];
        for (name, value) in fixed {
            if !value.is_empty() {
                out.push_str(name);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        }
        if !self.references.is_empty() {
            out.push_str("References: ");
            out.push_str(&self.references.join(" "));
            out.push('\n');
        }
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Orders UIDs numerically when both are numbers, lexically otherwise.
#[must_use]
pub fn uid_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sorts UIDs with [`uid_cmp`].
pub fn sort_uids(uids: &mut [Uid]) {
    uids.sort_by(|a, b| uid_cmp(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup() {
        let mut record = MessageRecord::new("1").with_subject("Hello");
        record
            .headers
            .insert("x-spam-score".to_string(), "3".to_string());

        assert_eq!(record.header("SUBJECT"), Some("Hello"));
        assert_eq!(record.header("X-Spam-Score"), Some("3"));
        assert_eq!(record.header("from"), None);
    }

    #[test]
    fn test_uid_order() {
        let mut uids: Vec<Uid> = ["10", "9", "abc", "100", "ab"]
            .iter()
            .map(ToString::to_string)
            .collect();
        sort_uids(&mut uids);
        assert_eq!(uids, vec!["9", "10", "100", "ab", "abc"]);
    }
}
