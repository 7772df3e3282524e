//! Source folder hashes and virtual UIDs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::record::Uid;

/// Length of a source hash, and of the prefix of every virtual UID.
pub const HASH_LEN: usize = 8;

/// Hash identifying a source folder inside a virtual folder.
///
/// A non-zero `salt` yields an alternative hash for the same name, used
/// when the plain one is already taken.
#[must_use]
pub fn source_hash(full_name: &str, salt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_name.as_bytes());
    if salt > 0 {
        hasher.update(salt.to_le_bytes());
    }
    let digest = hasher.finalize();
    // 6 bytes encode to exactly 8 characters.
    URL_SAFE_NO_PAD.encode(&digest[..6])
}

/// Builds a virtual UID from a source hash and a source UID.
#[must_use]
pub fn make_vuid(hash: &str, uid: &str) -> Uid {
    let mut vuid = String::with_capacity(hash.len() + uid.len());
    vuid.push_str(hash);
    vuid.push_str(uid);
    vuid
}

/// Splits a virtual UID into source hash and source UID.
#[must_use]
pub fn split_vuid(vuid: &str) -> Option<(&str, &str)> {
    if vuid.len() > HASH_LEN && vuid.is_char_boundary(HASH_LEN) {
        Some(vuid.split_at(HASH_LEN))
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_shape() {
        let hash = source_hash("INBOX", 0);
        assert_eq!(hash.len(), HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(hash, source_hash("INBOX", 0));
        assert_ne!(hash, source_hash("INBOX", 1));
        assert_ne!(hash, source_hash("Sent", 0));
    }

    #[test]
    fn test_vuid_roundtrip() {
        let hash = source_hash("INBOX", 0);
        let vuid = make_vuid(&hash, "42");
        assert_eq!(split_vuid(&vuid), Some((hash.as_str(), "42")));
        assert_eq!(split_vuid("short"), None);
        assert_eq!(split_vuid(&hash), None);
    }
}
