//! Service wiring.
//!
//! [`VigilServices`] owns one instance of every component, built from a
//! [`VigilConfig`] and sharing a clock, a progress sink and the local
//! mirror.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use vigil_core::{Clock, SystemClock, VigilConfig, VigilResult};
use vigil_storage::{CacheStore, LmdbScope, LocalMirror, LocalScope, MemoryScope, RemoteStore};

use crate::jobs::{cache_sweep_task, reconciliation_task, CacheSweepMetrics, ReconciliationMetrics};
use crate::moderation::ModerationStateMachine;
use crate::notify::{ProgressSink, TracingSink};
use crate::pipeline::PersistencePipeline;
use crate::reconciliation::ReconciliationLog;
use crate::session::SessionGuard;

/// Join handles of the spawned background jobs.
#[derive(Debug)]
pub struct JobHandles {
    pub cache_sweep: JoinHandle<Arc<CacheSweepMetrics>>,
    pub reconciliation: JoinHandle<Arc<ReconciliationMetrics>>,
}

/// Every component of the integrity layer, wired together.
#[derive(Clone)]
pub struct VigilServices {
    pub config: VigilConfig,
    /// Persistent cache backing the local mirror
    pub cache: CacheStore,
    /// Ephemeral cache holding preserved drafts
    pub session_cache: CacheStore,
    pub mirror: LocalMirror,
    pub guard: SessionGuard,
    pub pipeline: PersistencePipeline,
    pub moderation: ModerationStateMachine,
    pub reconciliation: Arc<ReconciliationLog>,
    pub remote: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for VigilServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VigilServices")
            .field("cache", &self.cache)
            .field("guard", &self.guard)
            .field("pipeline", &self.pipeline)
            .field("moderation", &self.moderation)
            .finish()
    }
}

impl VigilServices {
    /// Production wiring: LMDB persistent scope at `config.cache.lmdb_path`,
    /// in-process ephemeral scope, system clock, tracing sink.
    pub fn open(config: VigilConfig, remote: Arc<dyn RemoteStore>) -> VigilResult<Self> {
        config.validate()?;
        let persistent: Arc<dyn LocalScope> = Arc::new(LmdbScope::open(
            &config.cache.lmdb_path,
            config.cache.lmdb_max_size_mb,
        )?);
        Self::with_parts(
            config,
            remote,
            persistent,
            Arc::new(MemoryScope::new()),
            Arc::new(SystemClock),
            Arc::new(TracingSink),
        )
    }

    /// Wire the components over explicit media, clock and sink.
    pub fn with_parts(
        config: VigilConfig,
        remote: Arc<dyn RemoteStore>,
        persistent: Arc<dyn LocalScope>,
        ephemeral: Arc<dyn LocalScope>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ProgressSink>,
    ) -> VigilResult<Self> {
        config.validate()?;

        let cache = CacheStore::open(persistent.clone(), &config.cache, clock.clone());
        let session_cache = CacheStore::session_scoped(
            ephemeral.clone(),
            format!("{}.session", config.cache.namespace),
            config.cache.schema_version.clone(),
            clock.clone(),
        );
        let mirror = LocalMirror::new(cache.clone(), config.cache.mirror_ttl);
        let reconciliation = Arc::new(ReconciliationLog::new());

        let guard = SessionGuard::new(persistent, ephemeral, config.session.clone(), clock.clone());
        let pipeline = PersistencePipeline::new(
            remote.clone(),
            config.retry.clone(),
            mirror.clone(),
            session_cache.clone(),
            sink.clone(),
            clock.clone(),
        );
        let moderation = ModerationStateMachine::new(
            remote.clone(),
            mirror.clone(),
            reconciliation.clone(),
            sink,
            clock,
            config.retry.attempt_timeout,
        );

        info!(
            namespace = %config.cache.namespace,
            schema_version = %config.cache.schema_version,
            "Vigil services ready"
        );

        Ok(Self {
            config,
            cache,
            session_cache,
            mirror,
            guard,
            pipeline,
            moderation,
            reconciliation,
            remote,
        })
    }

    /// Spawn the cache sweep and reconciliation jobs.
    pub fn spawn_jobs(&self, shutdown_rx: watch::Receiver<bool>) -> JobHandles {
        JobHandles {
            cache_sweep: tokio::spawn(cache_sweep_task(
                self.cache.clone(),
                self.config.jobs.clone(),
                shutdown_rx.clone(),
            )),
            reconciliation: tokio::spawn(reconciliation_task(
                self.reconciliation.clone(),
                self.remote.clone(),
                self.config.jobs.clone(),
                self.config.retry.attempt_timeout,
                shutdown_rx,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_core::{CacheConfig, VigilError};
    use vigil_storage::InMemoryRemoteStore;

    #[test]
    fn test_open_builds_lmdb_backed_services() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = VigilConfig {
            cache: CacheConfig::default().with_lmdb_path(temp_dir.path().join("cache")),
            ..Default::default()
        };
        let services = VigilServices::open(config, Arc::new(InMemoryRemoteStore::new()))
            .expect("services should open");

        services
            .cache
            .set("warmup", &1u32, None)
            .expect("set should succeed");
        assert_eq!(services.cache.get::<u32>("warmup"), Some(1));
        assert_eq!(services.session_cache.namespace(), "vigil.session");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = VigilConfig {
            cache: CacheConfig::default().with_namespace(""),
            ..Default::default()
        };
        let result = VigilServices::open(config, Arc::new(InMemoryRemoteStore::new()));
        assert!(matches!(result, Err(VigilError::Config(_))));
    }

    #[tokio::test]
    async fn test_jobs_stop_on_shutdown() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = VigilConfig {
            cache: CacheConfig::default().with_lmdb_path(temp_dir.path()),
            ..Default::default()
        };
        let services = VigilServices::open(config, Arc::new(InMemoryRemoteStore::new()))
            .expect("services should open");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = services.spawn_jobs(shutdown_rx);
        shutdown_tx.send(true).expect("jobs should be listening");

        let sweep = handles.cache_sweep.await.expect("sweep task should not panic");
        let reconcile = handles
            .reconciliation
            .await
            .expect("reconciliation task should not panic");
        assert!(sweep.snapshot().sweeps >= 1);
        assert_eq!(reconcile.snapshot().debts_settled, 0);
    }
}
