//! Cache Sweep Background Task
//!
//! Expired entries are already misses on read; the sweep reclaims the space
//! they occupy. It runs on `JobsConfig::cache_sweep_interval` and once more
//! when the shutdown signal arrives, so a clean exit leaves no expired
//! entries behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vigil_core::JobsConfig;
use vigil_storage::CacheStore;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct CacheSweepMetrics {
    /// Sweeps completed since startup, including the final one
    pub sweeps: AtomicU64,

    /// Entries removed since startup
    pub entries_removed: AtomicU64,

    /// Sweeps that failed because the medium was unavailable
    pub sweep_errors: AtomicU64,
}

impl CacheSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CacheSweepSnapshot {
        CacheSweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSweepSnapshot {
    pub sweeps: u64,
    pub entries_removed: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep `cache` periodically until shutdown, then sweep once more.
///
/// Returns the metrics collected during the task's lifetime. A dropped
/// shutdown sender counts as a shutdown signal.
pub async fn cache_sweep_task(
    cache: CacheStore,
    config: JobsConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweepMetrics> {
    let metrics = Arc::new(CacheSweepMetrics::new());

    let mut sweep_interval = interval(config.cache_sweep_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        namespace = cache.namespace(),
        interval_secs = config.cache_sweep_interval.as_secs(),
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&cache, &metrics);
            }
        }
    }

    sweep_once(&cache, &metrics);

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        entries_removed = snapshot.entries_removed,
        sweep_errors = snapshot.sweep_errors,
        "Cache sweep task completed"
    );

    metrics
}

fn sweep_once(cache: &CacheStore, metrics: &CacheSweepMetrics) {
    metrics.sweeps.fetch_add(1, Ordering::Relaxed);
    match cache.sweep() {
        Ok(0) => tracing::trace!("Cache sweep found nothing to remove"),
        Ok(removed) => {
            tracing::debug!(removed, "Cache sweep removed entries");
            metrics
                .entries_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cache sweep failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
