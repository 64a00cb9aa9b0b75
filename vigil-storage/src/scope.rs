//! Local key/value scopes.
//!
//! A [`LocalScope`] is the medium underneath the cache and the session guard:
//! a flat map from string keys to opaque bytes. The persistent scope is backed
//! by LMDB ([`crate::LmdbScope`]); the ephemeral scope lives in process memory
//! ([`MemoryScope`]) and disappears with it.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use vigil_core::CacheError;

/// Key/value medium shared by the cache and the session guard.
///
/// Implementations must be thread-safe. Access to a single key is assumed to
/// be serialized by the medium.
pub trait LocalScope: Send + Sync {
    /// Read the bytes stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Delete `key`. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Every key starting with `prefix`, in lexicographic order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

impl<T: LocalScope + ?Sized> LocalScope for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        (**self).write(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        (**self).keys_with_prefix(prefix)
    }
}

/// In-process scope. Used as the ephemeral session scope and in tests.
#[derive(Debug, Default)]
pub struct MemoryScope {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

fn poisoned() -> CacheError {
    CacheError::StorageUnavailable {
        reason: "memory scope lock poisoned".to_string(),
    }
}

impl LocalScope for MemoryScope {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
