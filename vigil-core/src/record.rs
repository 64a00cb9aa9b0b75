//! Memorial record lifecycle.
//!
//! # State Transition Diagram
//!
//! ```text
//! insert() → Pending ──┬── approve() ──→ Approved (terminal)
//!                      └── reject()  ──→ Rejected (terminal, deleted)
//! ```
//!
//! Transitions are monotonic: nothing leaves a terminal state.

use crate::error::ModerationError;
use crate::{compute_content_hash, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RECORD STATE
// ============================================================================

/// Lifecycle state of a memorial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Submitted, waiting for moderation
    Pending,
    /// Published in the gallery
    Approved,
    /// Refused by a moderator; never stored durably
    Rejected,
}

impl RecordState {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecordState::Pending => "pending",
            RecordState::Approved => "approved",
            RecordState::Rejected => "rejected",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, RecordStateParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RecordState::Pending),
            "approved" => Ok(RecordState::Approved),
            "rejected" => Ok(RecordState::Rejected),
            _ => Err(RecordStateParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordState::Approved | RecordState::Rejected)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for RecordState {
    type Err = RecordStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid record state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStateParseError(pub String);

impl fmt::Display for RecordStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid record state: {}", self.0)
    }
}

impl std::error::Error for RecordStateParseError {}

// ============================================================================
// PARTITIONS
// ============================================================================

/// Collection of the remote store a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Pending,
    Approved,
}

impl Partition {
    /// Collection name in the remote store.
    pub fn as_collection_str(&self) -> &'static str {
        match self {
            Partition::Pending => "pending_martyrs",
            Partition::Approved => "martyrs",
        }
    }

    /// The state every record in this partition is expected to carry.
    pub fn state(&self) -> RecordState {
        match self {
            Partition::Pending => RecordState::Pending,
            Partition::Approved => RecordState::Approved,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state().as_db_str())
    }
}

// ============================================================================
// RECORD FIELDS
// ============================================================================

/// Descriptive fields of a memorial entry, as cleaned by the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub martyrdom_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub martyrdom_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biography: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_contact: Option<String>,
}

impl RecordFields {
    /// Fields in a fixed order, for hashing.
    fn canonical_parts(&self) -> [&str; 8] {
        [
            self.full_name.as_str(),
            self.birth_date.as_deref().unwrap_or(""),
            self.martyrdom_date.as_deref().unwrap_or(""),
            self.birth_place.as_deref().unwrap_or(""),
            self.martyrdom_place.as_deref().unwrap_or(""),
            self.biography.as_deref().unwrap_or(""),
            self.submitter_name.as_deref().unwrap_or(""),
            self.submitter_contact.as_deref().unwrap_or(""),
        ]
    }
}

// ============================================================================
// SUBMISSION KEY
// ============================================================================

/// Content-derived key identifying one submission across retries.
///
/// Hex-encoded SHA-256 over the trimmed fields and the creation instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionKey(String);

impl SubmissionKey {
    pub fn derive(fields: &RecordFields, created_at: Timestamp) -> Self {
        let mut material = Vec::new();
        for part in fields.canonical_parts() {
            material.extend_from_slice(part.trim().as_bytes());
            material.push(0x1f);
        }
        material.extend_from_slice(created_at.to_rfc3339().as_bytes());
        Self(hex::encode(compute_content_hash(&material)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// DRAFTS AND RECORDS
// ============================================================================

/// A validated submission that has not reached the remote store yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub fields: RecordFields,
    pub created_at: Timestamp,
    pub submission_key: SubmissionKey,
}

impl RecordDraft {
    pub fn new(fields: RecordFields, created_at: Timestamp) -> Self {
        let submission_key = SubmissionKey::derive(&fields, created_at);
        Self {
            fields,
            created_at,
            submission_key,
        }
    }
}

/// A memorial entry owned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    id: RecordId,
    pub fields: RecordFields,
    pub state: RecordState,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<Timestamp>,
    pub submission_key: SubmissionKey,
}

impl Record {
    /// Materialize a draft under the id the store assigned to it.
    pub fn from_draft(id: RecordId, draft: RecordDraft) -> Self {
        Self {
            id,
            fields: draft.fields,
            state: RecordState::Pending,
            created_at: draft.created_at,
            approved_at: None,
            submission_key: draft.submission_key,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Pending → Approved, stamping the approval time.
    pub fn approve(mut self, at: Timestamp) -> Result<Self, ModerationError> {
        self.ensure_pending(RecordState::Approved)?;
        self.state = RecordState::Approved;
        self.approved_at = Some(at);
        Ok(self)
    }

    /// Pending → Rejected.
    pub fn reject(mut self) -> Result<Self, ModerationError> {
        self.ensure_pending(RecordState::Rejected)?;
        self.state = RecordState::Rejected;
        Ok(self)
    }

    /// Apply a partial update without ever leaving a terminal state.
    pub fn apply_patch(&mut self, patch: &RecordPatch) -> Result<(), ModerationError> {
        if let Some(state) = patch.state {
            if state != self.state {
                self.ensure_pending(state)?;
                self.state = state;
            }
        }
        if let Some(approved_at) = patch.approved_at {
            self.approved_at = Some(approved_at);
        }
        if let Some(fields) = &patch.fields {
            self.fields = fields.clone();
        }
        Ok(())
    }

    fn ensure_pending(&self, to: RecordState) -> Result<(), ModerationError> {
        if self.state != RecordState::Pending {
            return Err(ModerationError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        Ok(())
    }
}

/// Partial update payload for records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// New lifecycle state
    pub state: Option<RecordState>,
    /// Approval timestamp
    pub approved_at: Option<Timestamp>,
    /// Replacement descriptive fields
    pub fields: Option<RecordFields>,
}

/// Selection applied to a partition query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    ById(RecordId),
    BySubmissionKey(SubmissionKey),
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::ById(id) => record.id() == id,
            RecordFilter::BySubmissionKey(key) => &record.submission_key == key,
        }
    }
}
