//! Local mirror of the remote partitions.
//!
//! The mirror keeps one cached list per partition so the gallery and the
//! moderation console can render without a round trip. It is never
//! authoritative: a missing list means "unknown", and callers fall back to
//! the remote store. Single-record edits only touch a list that is already
//! cached, and they keep that list's original expiry.

use std::time::Duration;

use vigil_core::{CacheError, Partition, Record, RecordId};

use crate::cache::CacheStore;

fn list_key(partition: Partition) -> &'static str {
    match partition {
        Partition::Pending => "records.pending",
        Partition::Approved => "records.approved",
    }
}

/// Cached per-partition record lists.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    cache: CacheStore,
    ttl: Duration,
}

impl LocalMirror {
    pub fn new(cache: CacheStore, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The cached list for `partition`, if one is live.
    pub fn list(&self, partition: Partition) -> Option<Vec<Record>> {
        self.cache.get(list_key(partition))
    }

    /// Replace the list for `partition` with a fresh snapshot.
    pub fn replace(&self, partition: Partition, records: &[Record]) -> Result<(), CacheError> {
        self.cache.set(list_key(partition), records, Some(self.ttl))
    }

    /// Find a record in the cached list for `partition`.
    pub fn find(&self, partition: Partition, id: &RecordId) -> Option<Record> {
        self.list(partition)?
            .into_iter()
            .find(|record| record.id() == id)
    }

    /// Insert or replace `record` in the cached list.
    ///
    /// Returns `false` when no list is cached for the partition.
    pub fn upsert(&self, partition: Partition, record: &Record) -> Result<bool, CacheError> {
        self.edit(partition, |records| {
            match records.iter_mut().find(|r| r.id() == record.id()) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            true
        })
    }

    /// Drop `id` from the cached list.
    ///
    /// Returns whether a record was removed.
    pub fn remove(&self, partition: Partition, id: &RecordId) -> Result<bool, CacheError> {
        self.edit(partition, |records| {
            let before = records.len();
            records.retain(|record| record.id() != id);
            records.len() != before
        })
    }

    /// Forget the cached list so the next read goes to the remote store.
    pub fn invalidate(&self, partition: Partition) -> Result<(), CacheError> {
        self.cache.remove(list_key(partition))
    }

    fn edit<F>(&self, partition: Partition, apply: F) -> Result<bool, CacheError>
    where
        F: FnOnce(&mut Vec<Record>) -> bool,
    {
        let key = list_key(partition);
        let Some(read) = self.cache.read::<Vec<Record>>(key) else {
            return Ok(false);
        };
        let expires_at = read.expires_at();
        let mut records = read.into_value();
        if !apply(&mut records) {
            return Ok(false);
        }
        self.cache.set_until(key, &records, expires_at)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::MemoryScope;
    use chrono::Utc;
    use std::sync::Arc;
    use vigil_core::{CacheConfig, ManualClock, RecordDraft, RecordFields};

    fn record(name: &str) -> Record {
        let fields = RecordFields {
            full_name: name.to_string(),
            ..Default::default()
        };
        Record::from_draft(RecordId::generate(), RecordDraft::new(fields, Utc::now()))
    }

    fn mirror() -> (LocalMirror, ManualClock) {
        let clock = ManualClock::starting_now();
        let cache = CacheStore::open(
            Arc::new(MemoryScope::new()),
            &CacheConfig::default().with_namespace("mirror-test"),
            Arc::new(clock.clone()),
        );
        (LocalMirror::new(cache, Duration::from_secs(300)), clock)
    }

    #[test]
    fn test_replace_and_find() {
        let (mirror, _clock) = mirror();
        let a = record("A");
        let b = record("B");
        mirror
            .replace(Partition::Pending, &[a.clone(), b.clone()])
            .expect("replace should succeed");

        assert_eq!(mirror.find(Partition::Pending, b.id()), Some(b));
        assert!(mirror.find(Partition::Approved, a.id()).is_none());
    }

    #[test]
    fn test_edits_need_a_cached_list() {
        let (mirror, _clock) = mirror();
        let a = record("A");
        assert!(!mirror.upsert(Partition::Approved, &a).expect("upsert should succeed"));
        assert!(mirror.list(Partition::Approved).is_none());
    }

    #[test]
    fn test_upsert_and_remove() {
        let (mirror, _clock) = mirror();
        let a = record("A");
        mirror
            .replace(Partition::Pending, std::slice::from_ref(&a))
            .expect("replace should succeed");

        let b = record("B");
        assert!(mirror.upsert(Partition::Pending, &b).expect("upsert should succeed"));
        assert_eq!(mirror.list(Partition::Pending).map(|l| l.len()), Some(2));

        assert!(mirror.remove(Partition::Pending, a.id()).expect("remove should succeed"));
        assert!(!mirror.remove(Partition::Pending, a.id()).expect("remove should succeed"));
        assert_eq!(mirror.list(Partition::Pending), Some(vec![b]));
    }

    #[test]
    fn test_edit_keeps_original_expiry() {
        let (mirror, clock) = mirror();
        mirror
            .replace(Partition::Pending, &[])
            .expect("replace should succeed");

        clock.advance(Duration::from_secs(200));
        assert!(mirror
            .upsert(Partition::Pending, &record("A"))
            .expect("upsert should succeed"));

        clock.advance(Duration::from_secs(101));
        assert!(mirror.list(Partition::Pending).is_none());
    }

    #[test]
    fn test_invalidate() {
        let (mirror, _clock) = mirror();
        mirror
            .replace(Partition::Approved, &[record("A")])
            .expect("replace should succeed");
        mirror
            .invalidate(Partition::Approved)
            .expect("invalidate should succeed");
        assert!(mirror.list(Partition::Approved).is_none());
    }
}
