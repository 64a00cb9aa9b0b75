//! Moderation state machine.
//!
//! # State Transition Diagram
//!
//! ```text
//! submit ──→ Pending ─── approve() ──→ Approved   (terminal, approved partition)
//!               │
//!               └────── reject() ───→ Rejected   (terminal, deleted)
//!
//! Acting on an id that is no longer pending ──→ NotFound (no-op)
//! ```
//!
//! Approval writes to the approved partition first and deletes from the
//! pending partition second. A crash between the two duplicates a record;
//! it never loses one. A failed delete after a successful write is reported
//! as [`TransitionOutcome::AppliedPendingCleanup`] and logged for
//! reconciliation. Approving such a record again reuses the approved copy
//! and its original approval time.
//!
//! If the pending copy vanishes between the write and the delete because of
//! a concurrent rejection, the approved copy is withdrawn and the approval
//! reports `NotFound`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use vigil_core::{
    Clock, ModerationError, Partition, Record, RecordFilter, RecordId, StoreError,
};
use vigil_storage::{LocalMirror, RemoteStore};

use crate::notify::{ProgressEvent, ProgressSink};
use crate::reconciliation::ReconciliationLog;
use crate::session::ActionGrant;

/// Moderation actions an administrator can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the remote store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fallback {
    /// Report the store error.
    #[default]
    None,
    /// Apply the transition to the local mirror only.
    LocalMirror,
}

/// How completely a transition was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Remote store and local mirror both updated.
    FullyApplied,
    /// Approved remotely, but the pending copy could not be deleted.
    AppliedPendingCleanup,
    /// Remote store unreachable; only the local mirror changed.
    AppliedLocallyOnly,
}

impl TransitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::FullyApplied => "fully_applied",
            TransitionOutcome::AppliedPendingCleanup => "applied_pending_cleanup",
            TransitionOutcome::AppliedLocallyOnly => "applied_locally_only",
        }
    }

    /// Whether the remote store reflects the transition.
    pub fn is_durable(&self) -> bool {
        !matches!(self, TransitionOutcome::AppliedLocallyOnly)
    }
}

/// Drives records through their lifecycle across the remote store and the
/// local mirror.
#[derive(Clone)]
pub struct ModerationStateMachine {
    remote: Arc<dyn RemoteStore>,
    mirror: LocalMirror,
    reconciliation: Arc<ReconciliationLog>,
    sink: Arc<dyn ProgressSink>,
    clock: Arc<dyn Clock>,
    /// Budget for each remote call
    call_timeout: Duration,
}

impl fmt::Debug for ModerationStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModerationStateMachine")
            .field("call_timeout", &self.call_timeout)
            .field("outstanding_debts", &self.reconciliation.len())
            .finish()
    }
}

impl ModerationStateMachine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        mirror: LocalMirror,
        reconciliation: Arc<ReconciliationLog>,
        sink: Arc<dyn ProgressSink>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            remote,
            mirror,
            reconciliation,
            sink,
            clock,
            call_timeout,
        }
    }

    pub fn reconciliation(&self) -> &Arc<ReconciliationLog> {
        &self.reconciliation
    }

    /// Pending → Approved.
    #[instrument(skip(self, grant), fields(moderator = grant.username()))]
    pub async fn approve(
        &self,
        grant: &ActionGrant,
        id: &RecordId,
        fallback: Fallback,
    ) -> Result<TransitionOutcome, ModerationError> {
        let result = match self.approve_remote(id).await {
            Err(ModerationError::Remote(cause))
                if cause.is_transient() && fallback == Fallback::LocalMirror =>
            {
                self.approve_locally(id, cause)
            }
            other => other,
        };
        self.report(grant, ModerationAction::Approve, id, &result);
        result
    }

    /// Pending → Rejected. Rejected records are deleted, not kept.
    #[instrument(skip(self, grant), fields(moderator = grant.username()))]
    pub async fn reject(
        &self,
        grant: &ActionGrant,
        id: &RecordId,
        fallback: Fallback,
    ) -> Result<TransitionOutcome, ModerationError> {
        let result = match self.reject_remote(id).await {
            Err(ModerationError::Remote(cause))
                if cause.is_transient() && fallback == Fallback::LocalMirror =>
            {
                self.reject_locally(id, cause)
            }
            other => other,
        };
        self.report(grant, ModerationAction::Reject, id, &result);
        result
    }

    /// Approved records for the public gallery.
    ///
    /// Served from the local mirror when it is live, otherwise read from the
    /// remote store and written through.
    pub async fn approved_records(&self) -> Result<Vec<Record>, StoreError> {
        self.read_through(Partition::Approved).await
    }

    /// Pending records for the moderation console.
    pub async fn pending_records(&self) -> Result<Vec<Record>, StoreError> {
        self.read_through(Partition::Pending).await
    }

    async fn read_through(&self, partition: Partition) -> Result<Vec<Record>, StoreError> {
        if let Some(records) = self.mirror.list(partition) {
            return Ok(records);
        }
        let records = self
            .call(self.remote.query(partition, &RecordFilter::All))
            .await?;
        if let Err(err) = self.mirror.replace(partition, &records) {
            warn!(partition = %partition, error = %err, "Mirror write-through failed");
        }
        Ok(records)
    }

    async fn approve_remote(&self, id: &RecordId) -> Result<TransitionOutcome, ModerationError> {
        let record = self
            .call(self.remote.query(Partition::Pending, &RecordFilter::ById(id.clone())))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModerationError::NotFound { id: id.clone() })?;

        // A copy left behind by an earlier partial approval keeps its stamp
        let prior = self.approved_copy(id).await?;
        let resumed = prior.is_some();
        let approved = match prior {
            Some(approved) => approved,
            None => {
                let approved = record.approve(self.clock.now())?;
                self.call(self.remote.put(Partition::Approved, &approved))
                    .await?;
                approved
            }
        };

        let outcome = match self.call(self.remote.delete(Partition::Pending, id)).await {
            Ok(()) => TransitionOutcome::FullyApplied,
            Err(err) if err.is_not_found() && resumed => TransitionOutcome::FullyApplied,
            Err(err) if err.is_not_found() => {
                return self.settle_vanished_pending(&approved).await;
            }
            Err(err) => {
                self.reconciliation
                    .record(id.clone(), err.to_string(), self.clock.now());
                TransitionOutcome::AppliedPendingCleanup
            }
        };

        self.mirror_remove(Partition::Pending, id);
        self.mirror_upsert(Partition::Approved, &approved);
        Ok(outcome)
    }

    async fn approved_copy(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let found = self
            .call(self.remote.query(Partition::Approved, &RecordFilter::ById(id.clone())))
            .await?;
        Ok(found.into_iter().next())
    }

    /// The pending copy disappeared between our put and our delete.
    ///
    /// If another approver's copy now stands in the approved partition the
    /// record is approved either way. Otherwise it was rejected concurrently,
    /// and our approved copy is withdrawn so the rejection wins.
    async fn settle_vanished_pending(
        &self,
        ours: &Record,
    ) -> Result<TransitionOutcome, ModerationError> {
        let id = ours.id();
        let stored = self.approved_copy(id).await?;
        if let Some(theirs) = stored.filter(|copy| copy.approved_at != ours.approved_at) {
            debug!(id = %id, "Pending copy removed by a concurrent approval");
            self.mirror_remove(Partition::Pending, id);
            self.mirror_upsert(Partition::Approved, &theirs);
            return Ok(TransitionOutcome::FullyApplied);
        }

        warn!(id = %id, "Record rejected during approval; withdrawing approved copy");
        match self.call(self.remote.delete(Partition::Approved, id)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(id = %id, error = %err, "Could not withdraw approved copy");
                return Err(ModerationError::Remote(err));
            }
        }

        self.mirror_remove(Partition::Pending, id);
        self.mirror_remove(Partition::Approved, id);
        Err(ModerationError::NotFound { id: id.clone() })
    }

    fn approve_locally(
        &self,
        id: &RecordId,
        cause: StoreError,
    ) -> Result<TransitionOutcome, ModerationError> {
        let Some(pending) = self.mirror.list(Partition::Pending) else {
            return Err(ModerationError::Remote(cause));
        };
        let record = pending
            .into_iter()
            .find(|record| record.id() == id)
            .ok_or_else(|| ModerationError::NotFound { id: id.clone() })?;

        let approved = record.approve(self.clock.now())?;
        self.mirror_remove(Partition::Pending, id);
        self.mirror_upsert(Partition::Approved, &approved);

        warn!(id = %id, cause = %cause, "Remote store unreachable; approval applied locally only");
        Ok(TransitionOutcome::AppliedLocallyOnly)
    }

    async fn reject_remote(&self, id: &RecordId) -> Result<TransitionOutcome, ModerationError> {
        match self.call(self.remote.delete(Partition::Pending, id)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                return Err(ModerationError::NotFound { id: id.clone() })
            }
            Err(err) => return Err(err.into()),
        }
        self.mirror_remove(Partition::Pending, id);
        Ok(TransitionOutcome::FullyApplied)
    }

    fn reject_locally(
        &self,
        id: &RecordId,
        cause: StoreError,
    ) -> Result<TransitionOutcome, ModerationError> {
        if self.mirror.list(Partition::Pending).is_none() {
            return Err(ModerationError::Remote(cause));
        }
        match self.mirror.remove(Partition::Pending, id) {
            Ok(true) => {
                warn!(id = %id, cause = %cause, "Remote store unreachable; rejection applied locally only");
                Ok(TransitionOutcome::AppliedLocallyOnly)
            }
            Ok(false) => Err(ModerationError::NotFound { id: id.clone() }),
            Err(_) => Err(ModerationError::Remote(cause)),
        }
    }

    /// Race a remote call against the per-call budget.
    async fn call<T, F>(&self, request: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.call_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                after: self.call_timeout,
            }),
        }
    }

    fn mirror_remove(&self, partition: Partition, id: &RecordId) {
        if let Err(err) = self.mirror.remove(partition, id) {
            warn!(partition = %partition, id = %id, error = %err, "Mirror update failed");
        }
    }

    fn mirror_upsert(&self, partition: Partition, record: &Record) {
        match self.mirror.upsert(partition, record) {
            Ok(true) => {}
            Ok(false) => debug!(partition = %partition, "Mirror list not cached; skipped"),
            Err(err) => {
                warn!(partition = %partition, id = %record.id(), error = %err, "Mirror update failed")
            }
        }
    }

    fn report(
        &self,
        grant: &ActionGrant,
        action: ModerationAction,
        id: &RecordId,
        result: &Result<TransitionOutcome, ModerationError>,
    ) {
        self.sink.notify(&ProgressEvent::Verdict {
            action,
            id: id.clone(),
            moderator: grant.username().to_string(),
            outcome: result.clone(),
        });
    }
}
