//! Versioned TTL cache over local key/value media.
//!
//! Every locally mirrored value goes through a [`CacheStore`]. Reads are
//! hits only when the stored [`CacheEntry`] is unexpired and carries the
//! running schema version; everything else is a miss, and a miss is never an
//! error. Reads that need "last updated" information get a [`CacheRead`].
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::open(scope, &config.cache, clock);
//! store.set("gallery", &records, None)?;
//!
//! match store.read::<Vec<Record>>("gallery") {
//!     Some(read) if read.age(now) < Duration::from_secs(60) => render(read.value()),
//!     _ => refresh_from_remote().await,
//! }
//! ```

pub mod entry;
pub mod key;
pub mod read;
pub mod stats;
pub mod store;

pub use entry::CacheEntry;
pub use key::NamespacedKey;
pub use read::CacheRead;
pub use stats::CacheStats;
pub use store::CacheStore;
