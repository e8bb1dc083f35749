/*!
 * Batch Store
 *
 * Persistence for batch executions: one record per batch, one per chunk
 * assigned to a peer and one per argument tuple (work item).
 *
 * # Lifecycle
 *
 * Batches and items move `Created -> InProgress -> Done | Failed`. Failed work
 * items are retried until they reach their attempt limit, at which point they
 * become `PermanentlyFailed`.
 */

mod memory;
#[cfg(feature = "mongodb")]
mod mongo;
mod traits;
mod types;

pub use memory::MemoryBatchStore;
#[cfg(feature = "mongodb")]
pub use mongo::{MongoBatchStore, BATCH_COLLECTION, CHUNK_COLLECTION, WORK_ITEM_COLLECTION};
pub use traits::{BatchStore, StoreResult};
pub use types::{work_item_id, ChunkRecord, ExecuteBatchRecord, Status, WorkItemRecord};
