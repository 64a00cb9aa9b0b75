//! Progress notifications.
//!
//! The pipeline announces upcoming retries and the moderation machine
//! announces verdicts through a [`ProgressSink`]. Notification is
//! fire-and-forget: nothing a sink does can change an outcome.

use std::time::Duration;

use tracing::{info, warn};
use vigil_core::{ModerationError, RecordId, StoreError, SubmissionKey};

use crate::moderation::{ModerationAction, TransitionOutcome};

/// Something worth telling the person waiting on an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A submission attempt failed and another one is coming.
    RetryScheduled {
        submission_key: SubmissionKey,
        /// 1-based number of the attempt about to run
        next_attempt: u32,
        max_attempts: u32,
        delay: Duration,
        cause: StoreError,
    },
    /// The remote store accepted a submission.
    SubmissionAccepted { id: RecordId, attempts: u32 },
    /// Every attempt failed; the draft was preserved locally.
    SubmissionFailed {
        submission_key: SubmissionKey,
        attempts: u32,
        cause: StoreError,
    },
    /// A moderation action settled.
    Verdict {
        action: ModerationAction,
        id: RecordId,
        moderator: String,
        outcome: Result<TransitionOutcome, ModerationError>,
    },
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Sink that writes every event to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RetryScheduled {
                submission_key,
                next_attempt,
                max_attempts,
                delay,
                cause,
            } => info!(
                submission_key = %submission_key,
                next_attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                cause = %cause,
                "Retrying submission"
            ),
            ProgressEvent::SubmissionAccepted { id, attempts } => {
                info!(id = %id, attempts, "Submission accepted")
            }
            ProgressEvent::SubmissionFailed {
                submission_key,
                attempts,
                cause,
            } => warn!(
                submission_key = %submission_key,
                attempts,
                cause = %cause,
                "Submission failed; draft kept for another try"
            ),
            ProgressEvent::Verdict {
                action,
                id,
                moderator,
                outcome: Ok(outcome),
            } => info!(
                action = action.as_str(),
                id = %id,
                moderator = %moderator,
                outcome = outcome.as_str(),
                "Moderation applied"
            ),
            ProgressEvent::Verdict {
                action,
                id,
                moderator,
                outcome: Err(err),
            } => warn!(
                action = action.as_str(),
                id = %id,
                moderator = %moderator,
                error = %err,
                "Moderation refused"
            ),
        }
    }
}
