//! Error types for Vigil operations

use crate::record::{Partition, RecordState};
use crate::retry::RetryAttempt;
use crate::RecordId;
use std::time::Duration;
use thiserror::Error;

/// Remote durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Remote store did not answer within {after:?}")]
    Timeout { after: Duration },

    #[error("Remote store rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("Record {id} not found in {partition} partition")]
    NotFound { partition: Partition, id: RecordId },
}

impl StoreError {
    /// Network and timeout failures are worth another attempt; everything
    /// else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Local cache medium errors. Always absorbed by callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Local storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Field-level validation errors reported by the validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: String, max: usize },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. }
            | ValidationError::TooLong { field, .. } => field,
        }
    }
}

/// Outcome of a submission that did not reach the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Submission rejected by validation ({} field error(s))", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("Submission failed after {} attempt(s): {last_error}", attempts.len())]
    PermanentFailure {
        attempts: Vec<RetryAttempt>,
        last_error: StoreError,
    },
}

/// Administrator session errors. Every variant forces re-authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No administrator session")]
    Absent,

    #[error("Session for {username} has expired")]
    Expired { username: String },

    #[error("Session copies diverged; session invalidated")]
    Tampered,
}

/// Moderation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModerationError {
    #[error("Record {id} is no longer pending")]
    NotFound { id: RecordId },

    #[error("Record {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RecordId,
        from: RecordState,
        to: RecordState,
    },

    #[error("Moderation refused: {0}")]
    Unauthorized(#[from] SessionError),

    #[error("Remote store error during moderation: {0}")]
    Remote(#[from] StoreError),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Vigil errors.
#[derive(Debug, Clone, Error)]
pub enum VigilError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Vigil operations.
pub type VigilResult<T> = Result<T, VigilError>;

// =============================================================================
// TESTS
// =============================================================================
