//! Cache read results carrying age metadata.

use std::time::Duration;
use vigil_core::Timestamp;

/// Result of a cache hit, carrying when the value was written.
///
/// Callers that only want the value use [`super::CacheStore::get`]; callers
/// that show "last updated" information use [`super::CacheStore::read`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When this value was written to the cache.
    written_at: Timestamp,
    /// When the entry stops being served, if ever.
    expires_at: Option<Timestamp>,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, written_at: Timestamp, expires_at: Option<Timestamp>) -> Self {
        Self {
            value,
            written_at,
            expires_at,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn written_at(&self) -> Timestamp {
        self.written_at
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Check if the data was written at or after the given timestamp.
    pub fn is_fresh_as_of(&self, timestamp: Timestamp) -> bool {
        self.written_at >= timestamp
    }

    /// How old the value is at `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.written_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Map the value while keeping the metadata.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            written_at: self.written_at,
            expires_at: self.expires_at,
        }
    }
}
