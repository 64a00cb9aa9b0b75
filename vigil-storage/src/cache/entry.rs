//! Stored cache entry envelope.

use serde::{Deserialize, Serialize};
use vigil_core::Timestamp;

/// What a [`super::CacheStore`] actually writes for each key.
///
/// The payload is opaque to the store; the envelope carries everything the
/// store needs to decide whether a read is a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub payload: T,
    /// `None` means the entry lives as long as its scope
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    pub version: String,
    pub written_at: Timestamp,
}

impl<T> CacheEntry<T> {
    /// An entry is served until strictly after its expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    pub fn matches_version(&self, version: &str) -> bool {
        self.version == version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry {
            payload: 1u32,
            expires_at: Some(now),
            version: "1".into(),
            written_at: now - Duration::seconds(10),
        };
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let now = Utc::now();
        let entry = CacheEntry {
            payload: "x".to_string(),
            expires_at: None,
            version: "1".into(),
            written_at: now,
        };
        assert!(!entry.is_expired(now + Duration::days(3650)));
        assert!(entry.matches_version("1"));
        assert!(!entry.matches_version("2"));
    }

    #[test]
    fn test_envelope_parses_without_payload_type() {
        let entry = CacheEntry {
            payload: vec![1, 2, 3],
            expires_at: None,
            version: "1".into(),
            written_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry).expect("serialize should succeed");
        let opaque: CacheEntry<serde::de::IgnoredAny> =
            serde_json::from_slice(&bytes).expect("opaque parse should succeed");
        assert_eq!(opaque.version, "1");
    }
}
