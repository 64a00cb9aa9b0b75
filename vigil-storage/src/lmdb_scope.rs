//! LMDB-backed local scope.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the persistent medium for
//! the cache and the persistent half of the session guard.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The scope uses:
//! - Read transactions for `read` and prefix scans
//! - Write transactions for `write` and `delete`
//!
//! Every heed failure is reported as [`CacheError::StorageUnavailable`]; the
//! callers treat that as a cache miss or a skipped write.

use std::fmt;
use std::path::Path;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use vigil_core::CacheError;

use crate::scope::LocalScope;

fn unavailable(context: &str, err: impl fmt::Display) -> CacheError {
    CacheError::StorageUnavailable {
        reason: format!("{}: {}", context, err),
    }
}

/// Persistent scope stored in an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use vigil_storage::{LmdbScope, LocalScope};
///
/// let scope = LmdbScope::open("/var/lib/vigil/cache", 64)?;
/// scope.write("vigil:gallery", b"[]")?;
/// ```
pub struct LmdbScope {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Bytes>,
}

impl fmt::Debug for LmdbScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbScope")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbScope {
    /// Open (or create) an LMDB scope.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&path).map_err(|e| unavailable("create cache directory", e))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| unavailable("open LMDB environment", e))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| unavailable("begin write transaction", e))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| unavailable("open database", e))?;

        wtxn.commit()
            .map_err(|e| unavailable("commit transaction", e))?;

        Ok(Self { env, db })
    }
}

impl LocalScope for LmdbScope {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| unavailable("begin read transaction", e))?;

        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| unavailable("read", e))?;

        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| unavailable("begin write transaction", e))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| unavailable("write", e))?;

        wtxn.commit()
            .map_err(|e| unavailable("commit transaction", e))
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| unavailable("begin write transaction", e))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| unavailable("delete", e))?;

        wtxn.commit()
            .map_err(|e| unavailable("commit transaction", e))?;

        Ok(deleted)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| unavailable("begin read transaction", e))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| unavailable("iterate", e))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => {
                    if key.starts_with(prefix) {
                        keys.push(key.to_string());
                    }
                }
                Err(_) => continue,
            }
        }

        Ok(keys)
    }
}
