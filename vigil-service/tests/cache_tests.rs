//! Integration tests for expiry and version invalidation of the local cache,
//! as wired into the service layer.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tempfile::TempDir;
use tokio::sync::watch;
use vigil_core::{CacheConfig, Partition, VigilConfig};
use vigil_service::jobs::cache_sweep_task;
use vigil_service::{TracingSink, VigilServices};
use vigil_test_utils::{Harness, InMemoryRemoteStore};

/// Services over the harness media, as if restarted with `schema_version`.
fn restart_with_version(harness: &Harness, schema_version: &str) -> VigilServices {
    let config = VigilConfig {
        cache: CacheConfig::default().with_schema_version(schema_version),
        ..Default::default()
    };
    VigilServices::with_parts(
        config,
        harness.store.clone(),
        harness.persistent.clone(),
        harness.ephemeral.clone(),
        Arc::new(harness.clock.clone()),
        Arc::new(TracingSink),
    )
    .expect("restart should succeed")
}

// ============================================================================
// EXPIRY
// ============================================================================

#[test]
fn test_entry_lives_exactly_until_its_expiry() {
    let harness = Harness::new();
    let cache = &harness.services.cache;
    cache
        .set("gallery.count", &12u32, Some(Duration::from_secs(60)))
        .expect("set should succeed");

    harness.clock.advance(Duration::from_secs(60));
    assert_eq!(cache.get::<u32>("gallery.count"), Some(12));

    harness.clock.advance(Duration::from_millis(1));
    assert_eq!(cache.get::<u32>("gallery.count"), None);

    let stats = cache.stats().expect("stats should succeed");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    // The stale entry was evicted on read
    assert_eq!(stats.entry_count, 0);
}

#[test]
fn test_mirror_list_expires_with_mirror_ttl() {
    let harness = Harness::new();
    let mirror = &harness.services.mirror;
    mirror
        .replace(Partition::Approved, &[])
        .expect("replace should succeed");
    assert_eq!(mirror.list(Partition::Approved), Some(Vec::new()));

    harness
        .clock
        .advance(harness.services.config.cache.mirror_ttl + Duration::from_secs(1));
    assert_eq!(mirror.list(Partition::Approved), None);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_job_removes_expired_entries_on_shutdown() {
    let harness = Harness::new();
    let cache = harness.services.cache.clone();
    cache
        .set("short", &"gone soon", Some(Duration::from_secs(1)))
        .expect("set should succeed");
    cache
        .set("long", &"stays", Some(Duration::from_secs(3600)))
        .expect("set should succeed");
    harness.clock.advance(Duration::from_secs(2));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(cache_sweep_task(
        cache.clone(),
        harness.services.config.jobs.clone(),
        shutdown_rx,
    ));
    shutdown_tx.send(true).expect("job should be listening");
    let metrics = handle.await.expect("sweep task should not panic");

    assert!(metrics.snapshot().entries_removed >= 1);
    let stats = cache.stats().expect("stats should succeed");
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.expired_unswept, 0);
    assert_eq!(cache.get::<String>("long").as_deref(), Some("stays"));
}

// ============================================================================
// VERSION INVALIDATION
// ============================================================================

#[test]
fn test_schema_bump_invalidates_cache_and_mirror() {
    let harness = Harness::new();
    harness
        .services
        .cache
        .set("gallery.count", &12u32, None)
        .expect("set should succeed");
    harness
        .services
        .mirror
        .replace(Partition::Pending, &[])
        .expect("replace should succeed");

    let same = restart_with_version(&harness, "1");
    assert_eq!(same.cache.get::<u32>("gallery.count"), Some(12));

    let bumped = restart_with_version(&harness, "2");
    assert_eq!(bumped.cache.get::<u32>("gallery.count"), None);
    assert_eq!(bumped.mirror.list(Partition::Pending), None);
}

#[test]
fn test_schema_bump_survives_lmdb_restart() {
    let temp_dir = TempDir::new().expect("TempDir creation should succeed");
    let config_for = |version: &str| VigilConfig {
        cache: CacheConfig::default()
            .with_lmdb_path(temp_dir.path())
            .with_schema_version(version),
        ..Default::default()
    };

    {
        let services =
            VigilServices::open(config_for("1"), Arc::new(InMemoryRemoteStore::new()))
                .expect("services should open");
        services
            .cache
            .set("memorial.total", &40u32, None)
            .expect("set should succeed");
    }

    {
        let services =
            VigilServices::open(config_for("1"), Arc::new(InMemoryRemoteStore::new()))
                .expect("services should reopen");
        assert_eq!(services.cache.get::<u32>("memorial.total"), Some(40));
    }

    let services = VigilServices::open(config_for("2"), Arc::new(InMemoryRemoteStore::new()))
        .expect("services should reopen");
    assert_eq!(services.cache.get::<u32>("memorial.total"), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After a version change no earlier entry is ever served, whatever its
    /// remaining TTL.
    #[test]
    fn prop_version_change_misses_everything(
        ttls in proptest::collection::vec(1u64..86_400, 1..8),
    ) {
        let harness = Harness::new();
        for (i, ttl) in ttls.iter().enumerate() {
            harness
                .services
                .cache
                .set(&format!("entry.{}", i), &i, Some(Duration::from_secs(*ttl)))
                .expect("set should succeed");
        }

        let bumped = restart_with_version(&harness, "next");
        for i in 0..ttls.len() {
            prop_assert_eq!(bumped.cache.get::<usize>(&format!("entry.{}", i)), None);
        }
    }
}
