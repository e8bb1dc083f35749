/*!
 * MongoDB Batch Store
 * Durable store backing batch resumption across restarts
 */

use super::traits::{BatchStore, StoreResult};
use super::types::{ChunkRecord, ExecuteBatchRecord, Status, WorkItemRecord};
use crate::core::StoreError;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_document, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

pub const BATCH_COLLECTION: &str = "b7s-batches";
pub const CHUNK_COLLECTION: &str = "b7s-batch-chunks";
pub const WORK_ITEM_COLLECTION: &str = "b7s-batch-work-items";

/// Batch store backed by three MongoDB collections
#[derive(Clone)]
pub struct MongoBatchStore {
    batches: Collection<ExecuteBatchRecord>,
    chunks: Collection<ChunkRecord>,
    items: Collection<WorkItemRecord>,
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn statuses_filter(statuses: &[Status]) -> Bson {
    let codes: Vec<Bson> = statuses.iter().map(|s| Bson::Int32(s.code())).collect();
    Bson::Document(doc! { "$in": codes })
}

fn ids_filter(ids: &[String]) -> Document {
    doc! { "id": { "$in": ids.to_vec() } }
}

// Records carry RFC 3339 timestamps, matching their serde representation
fn now() -> StoreResult<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(backend)
}

impl MongoBatchStore {
    /// Connect and prepare the collections in `database`
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(backend)?;
        let store = Self::with_database(&client.database(database));
        store.ensure_indexes().await?;
        info!(database, "connected to batch store");
        Ok(store)
    }

    pub fn with_database(db: &Database) -> Self {
        Self {
            batches: db.collection(BATCH_COLLECTION),
            chunks: db.collection(CHUNK_COLLECTION),
            items: db.collection(WORK_ITEM_COLLECTION),
        }
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_id = || {
            IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.batches
            .create_index(unique_id())
            .await
            .map_err(backend)?;
        self.chunks.create_index(unique_id()).await.map_err(backend)?;
        self.items.create_index(unique_id()).await.map_err(backend)?;
        self.items
            .create_index(IndexModel::builder().keys(doc! { "batch_id": 1 }).build())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_status<T>(
        collection: &Collection<T>,
        status: Status,
        ids: &[String],
    ) -> StoreResult<()>
    where
        T: Send + Sync,
    {
        if ids.is_empty() {
            return Ok(());
        }
        collection
            .update_many(
                ids_filter(ids),
                doc! { "$set": { "status": status.code(), "updated_at": now()? } },
            )
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl BatchStore for MongoBatchStore {
    async fn create_batch(&self, record: &ExecuteBatchRecord) -> StoreResult<()> {
        let document = to_document(record).map_err(backend)?;
        self.batches
            .update_one(doc! { "id": record.id.as_str() }, doc! { "$set": document })
            .upsert(true)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> StoreResult<ExecuteBatchRecord> {
        self.batches
            .find_one(doc! { "id": id })
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::BatchNotFound(id.to_string()))
    }

    async fn update_batch_status(&self, id: &str, status: Status) -> StoreResult<()> {
        let result = self
            .batches
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "status": status.code(), "updated_at": now()? } },
            )
            .await
            .map_err(backend)?;
        if result.matched_count == 0 {
            return Err(StoreError::BatchNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find_batches(&self, statuses: &[Status]) -> StoreResult<Vec<ExecuteBatchRecord>> {
        let filter = if statuses.is_empty() {
            doc! {}
        } else {
            doc! { "status": statuses_filter(statuses) }
        };
        self.batches
            .find(filter)
            .sort(doc! { "created_at": 1, "id": 1 })
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)
    }

    async fn delete_batch(&self, id: &str) -> StoreResult<()> {
        let result = self
            .batches
            .delete_one(doc! { "id": id })
            .await
            .map_err(backend)?;
        if result.deleted_count == 0 {
            return Err(StoreError::BatchNotFound(id.to_string()));
        }
        self.chunks
            .delete_many(doc! { "batch_id": id })
            .await
            .map_err(backend)?;
        self.items
            .delete_many(doc! { "batch_id": id })
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn create_chunks(&self, records: &[ChunkRecord]) -> StoreResult<()> {
        for chunk in records {
            let document = to_document(chunk).map_err(backend)?;
            self.chunks
                .update_one(doc! { "id": chunk.id.as_str() }, doc! { "$set": document })
                .upsert(true)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> StoreResult<ChunkRecord> {
        self.chunks
            .find_one(doc! { "id": id })
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::ChunkNotFound(id.to_string()))
    }

    async fn update_chunk_status(&self, status: Status, ids: &[String]) -> StoreResult<()> {
        Self::set_status(&self.chunks, status, ids).await
    }

    async fn create_work_items(&self, records: &[WorkItemRecord]) -> StoreResult<()> {
        for item in records {
            let document = to_document(item).map_err(backend)?;
            // Existing items keep their status and attempt count
            self.items
                .update_one(doc! { "id": item.id.as_str() }, doc! { "$setOnInsert": document })
                .upsert(true)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn get_work_item(&self, id: &str) -> StoreResult<WorkItemRecord> {
        self.items
            .find_one(doc! { "id": id })
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::WorkItemNotFound(id.to_string()))
    }

    async fn update_work_item_status(&self, status: Status, ids: &[String]) -> StoreResult<()> {
        Self::set_status(&self.items, status, ids).await
    }

    async fn increment_work_item_attempts(&self, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.items
            .update_many(
                ids_filter(ids),
                doc! { "$inc": { "attempts": 1 }, "$set": { "updated_at": now()? } },
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn assign_work_items(&self, chunk_id: &str, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.items
            .update_many(
                ids_filter(ids),
                doc! { "$set": { "chunk_id": chunk_id, "updated_at": now()? } },
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn find_work_items(
        &self,
        batch_id: &str,
        chunk_id: Option<&str>,
        statuses: &[Status],
    ) -> StoreResult<Vec<WorkItemRecord>> {
        let mut filter = doc! { "batch_id": batch_id };
        if let Some(chunk_id) = chunk_id {
            filter.insert("chunk_id", chunk_id);
        }
        if !statuses.is_empty() {
            filter.insert("status", statuses_filter(statuses));
        }

        self.items
            .find(filter)
            .sort(doc! { "created_at": 1, "id": 1 })
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)
    }
}
