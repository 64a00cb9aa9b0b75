//! Background Jobs
//!
//! Periodic maintenance tasks:
//!
//! - `cache_sweep`: removes expired and unreadable cache entries
//! - `reconciliation`: retries pending-partition deletes left behind by
//!   partially applied approvals
//!
//! # Usage
//!
//! ```ignore
//! use tokio::sync::watch;
//! use vigil_service::jobs::{cache_sweep_task, reconciliation_task};
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(cache_sweep_task(cache, config.jobs.clone(), shutdown_rx.clone()));
//! tokio::spawn(reconciliation_task(
//!     log,
//!     remote,
//!     config.jobs.clone(),
//!     config.retry.attempt_timeout,
//!     shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_sweep;
pub mod reconciliation;

pub use cache_sweep::{cache_sweep_task, CacheSweepMetrics, CacheSweepSnapshot};
pub use reconciliation::{reconciliation_task, ReconciliationMetrics, ReconciliationSnapshot};
