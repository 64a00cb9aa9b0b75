//! Versioned TTL cache over a [`LocalScope`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, info, warn};
use vigil_core::{CacheConfig, CacheError, Clock, Timestamp};

use super::entry::CacheEntry;
use super::key::NamespacedKey;
use super::read::CacheRead;
use super::stats::{CacheCounters, CacheStats};
use crate::scope::LocalScope;

/// Keyed cache with expiration and schema-version invalidation.
///
/// Entries are JSON-encoded [`CacheEntry`] envelopes stored under
/// `"{namespace}:{key}"`. A read is a hit only if the entry exists, parses,
/// carries the running schema version and has not expired; anything else is
/// removed and reported as a miss. Medium failures never escape reads: they
/// are logged and count as misses.
///
/// Clones share the medium and the hit/miss counters.
#[derive(Clone)]
pub struct CacheStore {
    scope: Arc<dyn LocalScope>,
    namespace: String,
    schema_version: String,
    /// `None` for session-scoped stores
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    counters: Arc<CacheCounters>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.namespace)
            .field("schema_version", &self.schema_version)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheStore {
    /// Build a store without touching the version marker.
    pub fn new(scope: Arc<dyn LocalScope>, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            scope,
            namespace: config.namespace.clone(),
            schema_version: config.schema_version.clone(),
            default_ttl: Some(config.default_ttl),
            clock,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Build a store and reconcile the schema version marker.
    ///
    /// A failing medium does not prevent construction; the cache simply
    /// misses until the medium recovers.
    pub fn open(scope: Arc<dyn LocalScope>, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(scope, config, clock);
        if let Err(err) = store.reconcile_version() {
            warn!(
                namespace = %store.namespace,
                error = %err,
                "Cache version reconciliation failed"
            );
        }
        store
    }

    /// Store over an ephemeral medium whose entries carry no expiration
    /// unless one is passed explicitly.
    pub fn session_scoped(
        scope: Arc<dyn LocalScope>,
        namespace: impl Into<String>,
        schema_version: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scope,
            namespace: namespace.into(),
            schema_version: schema_version.into(),
            default_ttl: None,
            clock,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Store `value` under `key`, expiring `ttl` from now (the default TTL
    /// when `ttl` is `None`).
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = self.clock.now();
        let expires_at = ttl.or(self.default_ttl).and_then(|ttl| expiry_after(now, ttl));
        self.write_entry(key, value, now, expires_at)
    }

    /// Store `value` under `key` with an absolute expiry.
    ///
    /// Used when rewriting an entry must not extend its lifetime.
    pub fn set_until<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CacheError> {
        self.write_entry(key, value, self.clock.now(), expires_at)
    }

    fn write_entry<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        now: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            payload: value,
            expires_at,
            version: self.schema_version.clone(),
            written_at: now,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.scope
            .write(&NamespacedKey::new(&self.namespace, key).encode(), &bytes)
    }

    /// Payload under `key`, or `None` on a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key).map(CacheRead::into_value)
    }

    /// Payload under `key` together with its write metadata.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let encoded = NamespacedKey::new(&self.namespace, key).encode();

        let bytes = match self.scope.read(&encoded) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.miss();
                return None;
            }
            Err(err) => {
                warn!(key = %encoded, error = %err, "Cache read failed; treating as miss");
                self.counters.miss();
                return None;
            }
        };

        let now = self.clock.now();
        let stale_reason = match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) if !entry.matches_version(&self.schema_version) => "version mismatch",
            Ok(entry) if entry.is_expired(now) => "expired",
            Ok(entry) => {
                self.counters.hit();
                return Some(CacheRead::new(
                    entry.payload,
                    entry.written_at,
                    entry.expires_at,
                ));
            }
            Err(_) => "unparsable",
        };

        debug!(key = %encoded, reason = stale_reason, "Evicting stale cache entry");
        self.evict(&encoded);
        self.counters.miss();
        None
    }

    /// Delete `key`. Deleting a missing key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.scope
            .delete(&NamespacedKey::new(&self.namespace, key).encode())
            .map(|_| ())
    }

    /// Remove every expired or unparsable entry in the namespace.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut removed = 0;

        for key in self.entry_keys()? {
            let stale = match self.scope.read(&key)? {
                Some(bytes) => match serde_json::from_slice::<CacheEntry<IgnoredAny>>(&bytes) {
                    Ok(entry) => entry.is_expired(now),
                    Err(_) => true,
                },
                None => false,
            };
            if stale && self.scope.delete(&key)? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(namespace = %self.namespace, removed, "Cache sweep removed entries");
        }
        Ok(removed)
    }

    /// Compare the persisted version marker with the running schema version.
    ///
    /// On mismatch (or when no marker exists yet) every entry in the
    /// namespace is purged and the marker is rewritten. Returns the number of
    /// entries purged.
    pub fn reconcile_version(&self) -> Result<usize, CacheError> {
        let marker = NamespacedKey::version_marker(&self.namespace);
        let seen = self
            .scope
            .read(&marker)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        if seen.as_deref() == Some(self.schema_version.as_str()) {
            return Ok(0);
        }

        let purged = self.purge()?;
        self.scope.write(&marker, self.schema_version.as_bytes())?;

        info!(
            namespace = %self.namespace,
            previous = seen.as_deref().unwrap_or("none"),
            current = %self.schema_version,
            purged,
            "Cache schema version reconciled"
        );
        Ok(purged)
    }

    /// Delete every entry in the namespace. The version marker is kept.
    pub fn purge(&self) -> Result<usize, CacheError> {
        let mut purged = 0;
        for key in self.entry_keys()? {
            if self.scope.delete(&key)? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Diagnostics for the namespace.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let (hits, misses) = self.counters.snapshot();
        let mut stats = CacheStats {
            hits,
            misses,
            ..Default::default()
        };

        for key in self.entry_keys()? {
            let Some(bytes) = self.scope.read(&key)? else {
                continue;
            };
            stats.entry_count += 1;
            stats.total_bytes += bytes.len() as u64;
            match serde_json::from_slice::<CacheEntry<IgnoredAny>>(&bytes) {
                Ok(entry) if !entry.is_expired(now) => {}
                _ => stats.expired_unswept += 1,
            }
        }

        Ok(stats)
    }

    fn entry_keys(&self) -> Result<Vec<String>, CacheError> {
        self.scope
            .keys_with_prefix(&NamespacedKey::namespace_prefix(&self.namespace))
    }

    fn evict(&self, encoded: &str) {
        if let Err(err) = self.scope.delete(encoded) {
            warn!(key = %encoded, error = %err, "Failed to evict stale cache entry");
        }
    }
}

/// `now + ttl`, or `None` when the sum is not representable.
fn expiry_after(now: Timestamp, ttl: Duration) -> Option<Timestamp> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}
