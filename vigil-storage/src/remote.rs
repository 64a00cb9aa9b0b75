//! Remote durable store abstraction.
//!
//! The remote store owns every record. It is reached over the network, so
//! every operation is async and may be slow or fail; retry and timeout
//! policy live in the callers, never here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;
use vigil_core::{
    Partition, Record, RecordDraft, RecordFilter, RecordId, RecordPatch, StoreError,
};

/// Document store holding the `pending` and `approved` partitions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a new record built from `draft`; the store assigns the id.
    async fn insert(&self, partition: Partition, draft: &RecordDraft)
        -> Result<RecordId, StoreError>;

    /// Write `record` under its own id, replacing any previous document.
    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError>;

    /// Apply a partial update. `NotFound` if the id is absent.
    async fn update(
        &self,
        partition: Partition,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError>;

    /// Delete a record. `NotFound` if the id is absent.
    async fn delete(&self, partition: Partition, id: &RecordId) -> Result<(), StoreError>;

    /// Records of `partition` matching `filter`, oldest first.
    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn insert(
        &self,
        partition: Partition,
        draft: &RecordDraft,
    ) -> Result<RecordId, StoreError> {
        (**self).insert(partition, draft).await
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError> {
        (**self).put(partition, record).await
    }

    async fn update(
        &self,
        partition: Partition,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        (**self).update(partition, id, patch).await
    }

    async fn delete(&self, partition: Partition, id: &RecordId) -> Result<(), StoreError> {
        (**self).delete(partition, id).await
    }

    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).query(partition, filter).await
    }
}

/// In-memory remote store for development and tests.
///
/// A second insert carrying the same submission key into the same partition
/// is treated as the same document and returns the existing id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemoteStore {
    partitions: Arc<RwLock<HashMap<Partition, BTreeMap<RecordId, Record>>>>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        reason: "in-memory store lock poisoned".to_string(),
    }
}

impl InMemoryRemoteStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a partition, oldest first.
    pub fn records(&self, partition: Partition) -> Vec<Record> {
        let partitions = match self.partitions.read() {
            Ok(partitions) => partitions,
            Err(_) => return Vec::new(),
        };
        let mut records: Vec<Record> = partitions
            .get(&partition)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|record| record.created_at);
        records
    }

    /// Number of records in a partition.
    pub fn count(&self, partition: Partition) -> usize {
        self.partitions
            .read()
            .map(|p| p.get(&partition).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut partitions) = self.partitions.write() {
            partitions.clear();
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn insert(
        &self,
        partition: Partition,
        draft: &RecordDraft,
    ) -> Result<RecordId, StoreError> {
        if partition != Partition::Pending {
            return Err(StoreError::Rejected {
                reason: format!("new records enter the pending partition, not {}", partition),
            });
        }

        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let records = partitions.entry(partition).or_default();

        if let Some(existing) = records
            .values()
            .find(|record| record.submission_key == draft.submission_key)
        {
            debug!(
                id = %existing.id(),
                submission_key = %draft.submission_key,
                "Duplicate submission collapsed onto existing record"
            );
            return Ok(existing.id().clone());
        }

        let id = RecordId::generate();
        records.insert(id.clone(), Record::from_draft(id.clone(), draft.clone()));
        Ok(id)
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError> {
        if record.state != partition.state() {
            return Err(StoreError::Rejected {
                reason: format!(
                    "{} record cannot be stored in the {} partition",
                    record.state, partition
                ),
            });
        }

        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        partitions
            .entry(partition)
            .or_default()
            .insert(record.id().clone(), record.clone());
        Ok(())
    }

    async fn update(
        &self,
        partition: Partition,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let record = partitions
            .get_mut(&partition)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                partition,
                id: id.clone(),
            })?;

        record.apply_patch(patch).map_err(|e| StoreError::Rejected {
            reason: e.to_string(),
        })
    }

    async fn delete(&self, partition: Partition, id: &RecordId) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        partitions
            .get_mut(&partition)
            .and_then(|records| records.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                partition,
                id: id.clone(),
            })
    }

    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        let mut records: Vec<Record> = partitions
            .get(&partition)
            .map(|records| {
                records
                    .values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
