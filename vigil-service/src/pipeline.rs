//! Retrying, timeout-bounded submission of new records.
//!
//! Each attempt races the remote insert against a budget that grows with
//! the attempt number. Transient failures back off exponentially and are
//! announced to the progress sink; anything else ends the loop at once.
//! A submission that never reaches the remote store is reported as a
//! failure and its draft is kept in the session cache. It is never written
//! to the local mirror as if it were durable.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};
use vigil_core::{
    AttemptOutcome, Clock, Partition, Record, RecordDraft, RecordId, RetryAttempt, RetryConfig,
    StoreError, SubmissionError, SubmissionKey,
};
use vigil_storage::{CacheStore, LocalMirror, RemoteStore};

use crate::notify::{ProgressEvent, ProgressSink};
use crate::validation::{RawSubmission, Validator};

/// What a successful submission hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Identifier assigned by the remote store
    pub id: RecordId,
    /// Every attempt made, the last one successful
    pub attempts: Vec<RetryAttempt>,
}

fn draft_key(key: &SubmissionKey) -> String {
    format!("draft:{}", key)
}

/// Submits records to the remote store's pending partition.
#[derive(Clone)]
pub struct PersistencePipeline {
    remote: Arc<dyn RemoteStore>,
    retry: RetryConfig,
    mirror: LocalMirror,
    drafts: CacheStore,
    sink: Arc<dyn ProgressSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PersistencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistencePipeline")
            .field("retry", &self.retry)
            .finish()
    }
}

impl PersistencePipeline {
    /// `drafts` should be a session-scoped store; failed drafts land there.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        retry: RetryConfig,
        mirror: LocalMirror,
        drafts: CacheStore,
        sink: Arc<dyn ProgressSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            retry,
            mirror,
            drafts,
            sink,
            clock,
        }
    }

    /// Validate raw input, then submit it.
    ///
    /// Field errors come back as [`SubmissionError::Validation`] without a
    /// single remote attempt.
    pub async fn submit_raw(
        &self,
        validator: &dyn Validator,
        raw: &RawSubmission,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let fields = validator.validate(raw).map_err(|errors| {
            debug!(error_count = errors.len(), "Submission failed validation");
            SubmissionError::Validation(errors)
        })?;
        self.submit(RecordDraft::new(fields, self.clock.now())).await
    }

    /// Insert `draft` into the pending partition, retrying transient
    /// failures.
    #[instrument(skip(self, draft), fields(submission_key = %draft.submission_key))]
    pub async fn submit(&self, draft: RecordDraft) -> Result<SubmissionReceipt, SubmissionError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut ordinal = 1;

        loop {
            let budget = self.retry.timeout_for_attempt(ordinal);
            let settled = timeout(budget, self.remote.insert(Partition::Pending, &draft)).await;
            let outcome = match settled {
                Ok(Ok(id)) => {
                    attempts.push(RetryAttempt {
                        ordinal,
                        timeout: budget,
                        outcome: AttemptOutcome::Success,
                        backoff: None,
                    });
                    return Ok(self.accepted(draft, id, attempts));
                }
                Ok(Err(err)) => AttemptOutcome::Error(err),
                Err(_) => AttemptOutcome::TimedOut,
            };

            let cause = match &outcome {
                AttemptOutcome::Error(err) => err.clone(),
                _ => StoreError::Timeout { after: budget },
            };
            let backoff = (cause.is_transient() && ordinal < max_attempts)
                .then(|| self.retry.backoff_for_attempt(ordinal));

            attempts.push(RetryAttempt {
                ordinal,
                timeout: budget,
                outcome,
                backoff,
            });

            let Some(delay) = backoff else {
                return Err(self.failed(draft, attempts, cause));
            };

            warn!(
                attempt = ordinal,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %cause,
                "Submission attempt failed; backing off"
            );
            self.sink.notify(&ProgressEvent::RetryScheduled {
                submission_key: draft.submission_key.clone(),
                next_attempt: ordinal + 1,
                max_attempts,
                delay,
                cause,
            });
            sleep(delay).await;
            ordinal += 1;
        }
    }

    /// A draft kept after a failed submission, if any.
    pub fn preserved_draft(&self, key: &SubmissionKey) -> Option<RecordDraft> {
        self.drafts.get(&draft_key(key))
    }

    fn accepted(
        &self,
        draft: RecordDraft,
        id: RecordId,
        attempts: Vec<RetryAttempt>,
    ) -> SubmissionReceipt {
        if let Err(err) = self.drafts.remove(&draft_key(&draft.submission_key)) {
            debug!(error = %err, "Could not clear preserved draft");
        }

        let record = Record::from_draft(id.clone(), draft);
        if let Err(err) = self.mirror.upsert(Partition::Pending, &record) {
            warn!(id = %id, error = %err, "Pending mirror write-through failed");
        }

        info!(id = %id, attempts = attempts.len(), "Submission stored");
        self.sink.notify(&ProgressEvent::SubmissionAccepted {
            id: id.clone(),
            attempts: attempts.len() as u32,
        });
        SubmissionReceipt { id, attempts }
    }

    fn failed(
        &self,
        draft: RecordDraft,
        attempts: Vec<RetryAttempt>,
        cause: StoreError,
    ) -> SubmissionError {
        let key = draft.submission_key.clone();
        if let Err(err) = self.drafts.set(&draft_key(&key), &draft, None) {
            warn!(error = %err, "Could not preserve failed draft");
        }

        error!(
            attempts = attempts.len(),
            error = %cause,
            "Submission failed permanently"
        );
        self.sink.notify(&ProgressEvent::SubmissionFailed {
            submission_key: key,
            attempts: attempts.len() as u32,
            cause: cause.clone(),
        });
        SubmissionError::PermanentFailure {
            attempts,
            last_error: cause,
        }
    }
}
