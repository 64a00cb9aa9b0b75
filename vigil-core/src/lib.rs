//! Vigil Core - Entity Types
//!
//! Data structures, error taxonomy and configuration shared by every Vigil
//! crate. This crate holds no I/O: storage lives in `vigil-storage` and the
//! resilience services live in `vigil-service`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

pub mod clock;
pub mod config;
pub mod error;
pub mod record;
pub mod retry;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, JobsConfig, RetryConfig, SessionConfig, VigilConfig};
pub use error::{
    CacheError, ConfigError, ModerationError, SessionError, StoreError, SubmissionError,
    ValidationError, VigilError, VigilResult,
};
pub use record::{
    Partition, Record, RecordDraft, RecordFields, RecordFilter, RecordPatch, RecordState,
    RecordStateParseError, SubmissionKey,
};
pub use retry::{AttemptOutcome, RetryAttempt};
pub use session::{Session, SessionStatus};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for deduplication and integrity verification.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Identifier assigned to a record by the remote durable store.
///
/// Immutable once assigned: there is no setter, and every partition stores a
/// record under the id it was first inserted with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier handed back by a store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh timestamp-sortable identifier (UUIDv7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
