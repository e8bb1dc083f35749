/*!
 * In-Memory Batch Store
 * Map-backed store living for the lifetime of the process
 */

use super::traits::{BatchStore, StoreResult};
use super::types::{ChunkRecord, ExecuteBatchRecord, Status, WorkItemRecord};
use crate::core::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Default)]
struct Records {
    batches: HashMap<String, ExecuteBatchRecord>,
    chunks: HashMap<String, ChunkRecord>,
    items: HashMap<String, WorkItemRecord>,
}

/// In-memory batch store
#[derive(Clone, Default)]
pub struct MemoryBatchStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored work items across all batches
    pub fn work_item_count(&self) -> usize {
        self.records.read().items.len()
    }
}

fn matches(statuses: &[Status], status: Status) -> bool {
    statuses.is_empty() || statuses.contains(&status)
}

// Fails before touching anything if one of the IDs is unknown
fn ensure_known<V>(
    map: &HashMap<String, V>,
    ids: &[String],
    missing: fn(String) -> StoreError,
) -> StoreResult<()> {
    match ids.iter().find(|id| !map.contains_key(*id)) {
        Some(id) => Err(missing(id.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn create_batch(&self, record: &ExecuteBatchRecord) -> StoreResult<()> {
        self.records
            .write()
            .batches
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> StoreResult<ExecuteBatchRecord> {
        self.records
            .read()
            .batches
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::BatchNotFound(id.to_string()))
    }

    async fn update_batch_status(&self, id: &str, status: Status) -> StoreResult<()> {
        let mut records = self.records.write();
        let batch = records
            .batches
            .get_mut(id)
            .ok_or_else(|| StoreError::BatchNotFound(id.to_string()))?;
        batch.status = status;
        batch.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn find_batches(&self, statuses: &[Status]) -> StoreResult<Vec<ExecuteBatchRecord>> {
        let mut batches: Vec<_> = self
            .records
            .read()
            .batches
            .values()
            .filter(|batch| matches(statuses, batch.status))
            .cloned()
            .collect();
        batches.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(batches)
    }

    async fn delete_batch(&self, id: &str) -> StoreResult<()> {
        let mut records = self.records.write();
        if records.batches.remove(id).is_none() {
            return Err(StoreError::BatchNotFound(id.to_string()));
        }
        records.chunks.retain(|_, chunk| chunk.batch_id != id);
        records.items.retain(|_, item| item.batch_id != id);
        Ok(())
    }

    async fn create_chunks(&self, records: &[ChunkRecord]) -> StoreResult<()> {
        let mut store = self.records.write();
        for chunk in records {
            store.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> StoreResult<ChunkRecord> {
        self.records
            .read()
            .chunks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ChunkNotFound(id.to_string()))
    }

    async fn update_chunk_status(&self, status: Status, ids: &[String]) -> StoreResult<()> {
        let mut records = self.records.write();
        ensure_known(&records.chunks, ids, StoreError::ChunkNotFound)?;

        let now = OffsetDateTime::now_utc();
        for id in ids {
            if let Some(chunk) = records.chunks.get_mut(id) {
                chunk.status = status;
                chunk.updated_at = now;
            }
        }
        Ok(())
    }

    async fn create_work_items(&self, records: &[WorkItemRecord]) -> StoreResult<()> {
        let mut store = self.records.write();
        for item in records {
            store
                .items
                .entry(item.id.clone())
                .or_insert_with(|| item.clone());
        }
        Ok(())
    }

    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItemRecord> {
        self.records
            .read()
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::WorkItemNotFound(id.to_string()))
    }

    async fn update_work_item_status(&self, status: Status, ids: &[String]) -> StoreResult<()> {
        let mut records = self.records.write();
        ensure_known(&records.items, ids, StoreError::WorkItemNotFound)?;

        let now = OffsetDateTime::now_utc();
        for id in ids {
            if let Some(item) = records.items.get_mut(id) {
                item.status = status;
                item.updated_at = now;
            }
        }
        Ok(())
    }

    async fn increment_work_item_attempts(&self, ids: &[String]) -> StoreResult<()> {
        let mut records = self.records.write();
        ensure_known(&records.items, ids, StoreError::WorkItemNotFound)?;

        let now = OffsetDateTime::now_utc();
        for id in ids {
            if let Some(item) = records.items.get_mut(id) {
                item.attempts += 1;
                item.updated_at = now;
            }
        }
        Ok(())
    }

    async fn assign_work_items(&self, chunk_id: &str, ids: &[String]) -> StoreResult<()> {
        let mut records = self.records.write();
        ensure_known(&records.items, ids, StoreError::WorkItemNotFound)?;

        let now = OffsetDateTime::now_utc();
        for id in ids {
            if let Some(item) = records.items.get_mut(id) {
                item.chunk_id = chunk_id.to_string();
                item.updated_at = now;
            }
        }
        Ok(())
    }

    async fn find_work_items(
        &self,
        batch_id: &str,
        chunk_id: Option<&str>,
        statuses: &[Status],
    ) -> StoreResult<Vec<WorkItemRecord>> {
        let mut items: Vec<_> = self
            .records
            .read()
            .items
            .values()
            .filter(|item| item.batch_id == batch_id)
            .filter(|item| chunk_id.map_or(true, |chunk| item.chunk_id == chunk))
            .filter(|item| matches(statuses, item.status))
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(items)
    }
}
