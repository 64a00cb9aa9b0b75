//! Reconciliation Background Task
//!
//! Drains the [`ReconciliationLog`] on `JobsConfig::reconciliation_interval`
//! by retrying the pending-partition delete behind each debt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vigil_core::JobsConfig;
use vigil_storage::RemoteStore;

use crate::reconciliation::ReconciliationLog;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for reconciliation activity.
#[derive(Debug, Default)]
pub struct ReconciliationMetrics {
    /// Passes completed since startup
    pub cycles: AtomicU64,

    /// Debts settled since startup
    pub debts_settled: AtomicU64,

    /// Debts still owed after the latest pass
    pub debts_outstanding: AtomicU64,
}

impl ReconciliationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ReconciliationSnapshot {
        ReconciliationSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            debts_settled: self.debts_settled.load(Ordering::Relaxed),
            debts_outstanding: self.debts_outstanding.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reconciliation metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationSnapshot {
    pub cycles: u64,
    pub debts_settled: u64,
    pub debts_outstanding: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Reconcile `log` against `remote` periodically until shutdown.
///
/// Each remote delete is bounded by `call_timeout`, so a stalled store
/// cannot keep the task from observing shutdown.
pub async fn reconciliation_task(
    log: Arc<ReconciliationLog>,
    remote: Arc<dyn RemoteStore>,
    config: JobsConfig,
    call_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReconciliationMetrics> {
    let metrics = Arc::new(ReconciliationMetrics::new());

    let mut reconcile_interval = interval(config.reconciliation_interval);
    reconcile_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.reconciliation_interval.as_secs(),
        "Reconciliation task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Reconciliation task shutting down");
                    break;
                }
            }

            _ = reconcile_interval.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                if log.is_empty() {
                    metrics.debts_outstanding.store(0, Ordering::Relaxed);
                    continue;
                }
                let report = log.reconcile(&*remote, call_timeout).await;
                metrics
                    .debts_settled
                    .fetch_add(report.settled as u64, Ordering::Relaxed);
                metrics
                    .debts_outstanding
                    .store(report.outstanding as u64, Ordering::Relaxed);
                if report.outstanding > 0 {
                    tracing::warn!(
                        outstanding = report.outstanding,
                        "Reconciliation debts remain"
                    );
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        debts_settled = snapshot.debts_settled,
        debts_outstanding = snapshot.debts_outstanding,
        "Reconciliation task completed"
    );

    metrics
}
