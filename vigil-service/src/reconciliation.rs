//! Reconciliation of partially applied approvals.
//!
//! Approval writes the record to the approved partition before deleting it
//! from the pending one. When the delete fails the record is visible in
//! both, which is survivable but wrong. Each such leftover is a
//! [`ReconciliationDebt`] until a later delete succeeds.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};
use vigil_core::{Partition, RecordId, Timestamp};
use vigil_storage::RemoteStore;

/// A stale pending-partition entry left behind by an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationDebt {
    pub id: RecordId,
    pub reason: String,
    pub recorded_at: Timestamp,
    /// Failed cleanup attempts since the debt was recorded
    pub retries: u32,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub settled: usize,
    pub outstanding: usize,
}

/// Known inconsistencies awaiting cleanup.
#[derive(Debug, Default)]
pub struct ReconciliationLog {
    debts: Mutex<BTreeMap<RecordId, ReconciliationDebt>>,
}

impl ReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` is still in the pending partition.
    ///
    /// Recording the same id twice keeps the original entry.
    pub fn record(&self, id: RecordId, reason: impl Into<String>, at: Timestamp) {
        let reason = reason.into();
        warn!(id = %id, reason = %reason, "Reconciliation debt recorded");
        let mut debts = self.debts.lock().unwrap_or_else(|e| e.into_inner());
        debts.entry(id.clone()).or_insert(ReconciliationDebt {
            id,
            reason,
            recorded_at: at,
            retries: 0,
        });
    }

    /// Outstanding debts, ordered by record id.
    pub fn debts(&self) -> Vec<ReconciliationDebt> {
        let debts = self.debts.lock().unwrap_or_else(|e| e.into_inner());
        debts.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.debts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retry the pending delete behind every debt.
    ///
    /// A successful delete, or one that finds the record already gone,
    /// settles the debt. Any other failure, including a delete that outlives
    /// `call_timeout`, bumps its retry count.
    pub async fn reconcile(
        &self,
        store: &dyn RemoteStore,
        call_timeout: Duration,
    ) -> ReconcileReport {
        let ids: Vec<RecordId> = self.debts().into_iter().map(|debt| debt.id).collect();
        let mut report = ReconcileReport::default();

        for id in ids {
            let settled = match timeout(call_timeout, store.delete(Partition::Pending, &id)).await {
                Ok(Ok(())) => true,
                Ok(Err(err)) if err.is_not_found() => true,
                Ok(Err(err)) => {
                    debug!(id = %id, error = %err, "Reconciliation delete failed");
                    false
                }
                Err(_) => {
                    debug!(
                        id = %id,
                        timeout_ms = call_timeout.as_millis() as u64,
                        "Reconciliation delete timed out"
                    );
                    false
                }
            };

            let mut debts = self.debts.lock().unwrap_or_else(|e| e.into_inner());
            if settled {
                debts.remove(&id);
                report.settled += 1;
            } else if let Some(debt) = debts.get_mut(&id) {
                debt.retries += 1;
            }
        }

        report.outstanding = self.len();
        if report.settled > 0 {
            info!(
                settled = report.settled,
                outstanding = report.outstanding,
                "Reconciliation pass settled debts"
            );
        }
        report
    }
}
