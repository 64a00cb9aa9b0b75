//! Vigil Storage - Local Media, Cache and Remote Store
//!
//! Everything that persists bytes:
//! - [`LocalScope`] media: [`MemoryScope`] (ephemeral) and [`LmdbScope`]
//!   (persistent, LMDB through heed)
//! - [`CacheStore`]: TTL and schema-version aware cache over a scope
//! - [`LocalMirror`]: cached per-partition record lists
//! - [`RemoteStore`]: the authoritative document store, with an in-memory
//!   implementation for development and tests

pub mod cache;
pub mod lmdb_scope;
pub mod mirror;
pub mod remote;
pub mod scope;

pub use cache::{CacheEntry, CacheRead, CacheStats, CacheStore, NamespacedKey};
pub use lmdb_scope::LmdbScope;
pub use mirror::LocalMirror;
pub use remote::{InMemoryRemoteStore, RemoteStore};
pub use scope::{LocalScope, MemoryScope};
