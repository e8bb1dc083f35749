/*!
 * Batch Store Interface
 */

use super::types::{ChunkRecord, ExecuteBatchRecord, Status, WorkItemRecord};
use crate::core::StoreError;
use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for batches, their chunks and work items
///
/// Status updates are idempotent upserts: the resume loop and a foreground
/// request may touch the same records.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn create_batch(&self, record: &ExecuteBatchRecord) -> StoreResult<()>;
    async fn get_batch(&self, id: &str) -> StoreResult<ExecuteBatchRecord>;
    async fn update_batch_status(&self, id: &str, status: Status) -> StoreResult<()>;
    /// Batches in any of `statuses`; all batches when empty
    async fn find_batches(&self, statuses: &[Status]) -> StoreResult<Vec<ExecuteBatchRecord>>;
    /// Remove a batch along with its chunks and work items
    async fn delete_batch(&self, id: &str) -> StoreResult<()>;

    async fn create_chunks(&self, records: &[ChunkRecord]) -> StoreResult<()>;
    async fn get_chunk(&self, id: &str) -> StoreResult<ChunkRecord>;
    async fn update_chunk_status(&self, status: Status, ids: &[String]) -> StoreResult<()>;

    /// Insert work items, leaving any that already exist untouched
    async fn create_work_items(&self, records: &[WorkItemRecord]) -> StoreResult<()>;
    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItemRecord>;
    async fn update_work_item_status(&self, status: Status, ids: &[String]) -> StoreResult<()>;
    async fn increment_work_item_attempts(&self, ids: &[String]) -> StoreResult<()>;
    async fn assign_work_items(&self, chunk_id: &str, ids: &[String]) -> StoreResult<()>;
    /// Work items of a batch, optionally narrowed to one chunk and to `statuses`
    async fn find_work_items(
        &self,
        batch_id: &str,
        chunk_id: Option<&str>,
        statuses: &[Status],
    ) -> StoreResult<Vec<WorkItemRecord>>;
}
