/*!
 * Batch Lifecycle
 *
 * Status bookkeeping for batches, chunks and work items, and the resume path
 * that picks unfinished batches back up.
 *
 * # Transitions
 *
 * - accept: batch `InProgress`, items `Created`
 * - dispatch: delivered chunks and their items `InProgress`, attempts +1
 * - gather: items `Done` or `Failed`, chunks `Done` once every item reported
 * - resume: `Failed` items at their attempt limit become `PermanentlyFailed`
 */

use super::partition::BatchAssignments;
use super::HeadNode;
use crate::core::{PeerId, Result};
use crate::models::messages::{ExecuteBatch, ExecuteBatchResponse, WorkOrderBatch, WorkOrderBatchResponse};
use crate::monitoring::span_batch;
use crate::store::{
    work_item_id, ChunkRecord, ExecuteBatchRecord, Status, StoreResult, WorkItemRecord,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Attempt limit for a batch's items, 0 on the batch meaning the configured limit
pub fn effective_max_attempts(configured: u32, batch: u32) -> u32 {
    match batch {
        0 => configured,
        batch => configured.min(batch),
    }
}

/// Split retryable items into those to run again and those out of attempts
pub fn filter_work_items(
    items: Vec<WorkItemRecord>,
    max_attempts: u32,
) -> (Vec<WorkItemRecord>, Vec<WorkItemRecord>) {
    let mut pending = Vec::new();
    let mut exhausted = Vec::new();

    for item in items {
        match item.status {
            Status::Created => pending.push(item),
            Status::Failed if item.attempts >= max_attempts => exhausted.push(item),
            Status::Failed => pending.push(item),
            _ => {}
        }
    }

    (pending, exhausted)
}

/// Drop repeated argument tuples, keeping the first occurrence
pub(crate) fn dedup_arguments(arguments: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    arguments
        .into_iter()
        .filter(|args| seen.insert(args.clone()))
        .collect()
}

fn item_ids(batch_id: &str, order: &WorkOrderBatch) -> Vec<String> {
    order
        .execution_ids()
        .iter()
        .map(|id| work_item_id(batch_id, id.as_str()))
        .collect()
}

/// How one chunk fared after gathering
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChunkOutcome {
    pub chunk_id: String,
    pub done: Vec<String>,
    pub failed: Vec<String>,
    /// Every expected item reported a result
    pub complete: bool,
}

impl ChunkOutcome {
    pub fn classify(
        batch_id: &str,
        order: &WorkOrderBatch,
        response: Option<&WorkOrderBatchResponse>,
    ) -> Self {
        let mut done = Vec::new();
        let mut failed = Vec::new();
        let mut reported = 0;

        for execution_id in order.execution_ids() {
            let result = response.and_then(|res| res.results.get(&execution_id));
            if result.is_some() {
                reported += 1;
            }

            let id = work_item_id(batch_id, execution_id.as_str());
            match result {
                Some(result) if result.succeeded() => done.push(id),
                _ => failed.push(id),
            }
        }

        Self {
            chunk_id: order.chunk_id.clone(),
            done,
            failed,
            complete: reported == order.arguments.len(),
        }
    }
}

impl HeadNode {
    /// Persist a newly accepted batch and one work item per argument tuple
    pub(crate) async fn save_batch(
        &self,
        batch_id: &str,
        req: &ExecuteBatch,
        max_attempts: u32,
    ) -> StoreResult<()> {
        let mut record = ExecuteBatchRecord::from_request(batch_id, req, max_attempts);
        record.status = Status::InProgress;
        self.store.create_batch(&record).await?;

        let items: Vec<WorkItemRecord> = dedup_arguments(req.arguments.clone())
            .into_iter()
            .map(|args| {
                let execution_id = req.template.execution_id(&args);
                WorkItemRecord::new(work_item_id(batch_id, execution_id.as_str()), batch_id, args)
            })
            .collect();
        self.store.create_work_items(&items).await?;

        debug!(batch = batch_id, items = items.len(), "batch saved");
        Ok(())
    }

    /// Persist the chunks of a partitioned batch and tag their work items
    pub(crate) async fn save_chunk_info(
        &self,
        batch_id: &str,
        assignments: &BatchAssignments,
    ) -> StoreResult<()> {
        let chunks: Vec<ChunkRecord> = assignments
            .iter()
            .map(|a| ChunkRecord::new(a.order.chunk_id.clone(), batch_id))
            .collect();
        self.store.create_chunks(&chunks).await?;

        for assignment in assignments {
            let ids = item_ids(batch_id, &assignment.order);
            self.store
                .assign_work_items(&assignment.order.chunk_id, &ids)
                .await?;
        }
        Ok(())
    }

    /// Mark delivered chunks and their items as started
    ///
    /// Chunks sent to `failed` peers are left as they are for the resume loop.
    pub(crate) async fn mark_started_chunks(
        &self,
        batch_id: &str,
        assignments: &BatchAssignments,
        failed: &[PeerId],
    ) {
        for assignment in assignments.iter().filter(|a| !failed.contains(&a.peer)) {
            let chunk_id = &assignment.order.chunk_id;
            let ids = item_ids(batch_id, &assignment.order);

            if let Err(err) = self
                .store
                .update_chunk_status(Status::InProgress, std::slice::from_ref(chunk_id))
                .await
            {
                warn!(batch = batch_id, chunk = %chunk_id, error = %err, "could not mark chunk started");
            }
            if let Err(err) = self.store.update_work_item_status(Status::InProgress, &ids).await {
                warn!(batch = batch_id, chunk = %chunk_id, error = %err, "could not mark work items started");
            }
            if let Err(err) = self.store.increment_work_item_attempts(&ids).await {
                warn!(batch = batch_id, chunk = %chunk_id, error = %err, "could not count work item attempts");
            }
        }
    }

    /// Persist gather outcomes; every update is attempted, the first error returned
    pub(crate) async fn mark_completed_chunks(&self, outcomes: &[ChunkOutcome]) -> StoreResult<()> {
        let mut done_items = Vec::new();
        let mut failed_items = Vec::new();
        let mut done_chunks = Vec::new();
        let mut failed_chunks = Vec::new();

        for outcome in outcomes {
            done_items.extend(outcome.done.iter().cloned());
            failed_items.extend(outcome.failed.iter().cloned());
            if outcome.complete {
                done_chunks.push(outcome.chunk_id.clone());
            } else {
                failed_chunks.push(outcome.chunk_id.clone());
            }
        }

        let mut results = Vec::new();
        if !done_items.is_empty() {
            results.push(self.store.update_work_item_status(Status::Done, &done_items).await);
        }
        if !failed_items.is_empty() {
            results.push(self.store.update_work_item_status(Status::Failed, &failed_items).await);
        }
        if !done_chunks.is_empty() {
            results.push(self.store.update_chunk_status(Status::Done, &done_chunks).await);
        }
        if !failed_chunks.is_empty() {
            results.push(self.store.update_chunk_status(Status::Failed, &failed_chunks).await);
        }

        results.into_iter().collect::<StoreResult<Vec<()>>>().map(|_| ())
    }

    /// Close out a batch once none of its items can run again
    ///
    /// Returns the batch status after the check.
    pub(crate) async fn finalize_batch(&self, batch_id: &str) -> StoreResult<Status> {
        let items = self.store.find_work_items(batch_id, None, &[]).await?;

        let unfinished = items.iter().any(|item| {
            matches!(item.status, Status::Created | Status::InProgress | Status::Failed)
        });
        if unfinished {
            return Ok(self.store.get_batch(batch_id).await?.status);
        }

        let status = if items.iter().any(|i| i.status == Status::PermanentlyFailed) {
            Status::Failed
        } else {
            Status::Done
        };
        self.store.update_batch_status(batch_id, status).await?;

        info!(batch = batch_id, status = %status, "batch finished");
        Ok(status)
    }

    /// Resume a persisted batch, running whatever work is left
    ///
    /// Returns `None` when nothing was executed.
    pub async fn continue_batch_execution(
        &self,
        batch_id: &str,
    ) -> Result<Option<ExecuteBatchResponse>> {
        let batch = self.store.get_batch(batch_id).await?;
        if batch.status == Status::Done {
            debug!(batch = batch_id, "batch already done");
            return Ok(None);
        }

        let items = self
            .store
            .find_work_items(batch_id, None, &Status::RETRYABLE_ITEM)
            .await?;
        let max_attempts =
            effective_max_attempts(self.config.work_item_max_attempts, batch.max_attempts);
        let (pending, exhausted) = filter_work_items(items, max_attempts);

        let exhausted_update = (!exhausted.is_empty()).then(|| {
            let store = Arc::clone(&self.store);
            let ids: Vec<String> = exhausted.into_iter().map(|item| item.id).collect();
            let batch = batch_id.to_string();
            tokio::spawn(async move {
                match store
                    .update_work_item_status(Status::PermanentlyFailed, &ids)
                    .await
                {
                    Ok(()) => info!(batch = %batch, items = ids.len(), "work items permanently failed"),
                    Err(err) => error!(batch = %batch, error = %err, "could not mark work items permanently failed"),
                }
            })
        });

        if pending.is_empty() {
            if let Some(update) = exhausted_update {
                if let Err(err) = update.await {
                    error!(batch = batch_id, error = %err, "permanent failure update task failed");
                }
            }
            self.finalize_batch(batch_id).await?;
            return Ok(None);
        }

        info!(batch = batch_id, pending = pending.len(), "resuming batch");
        self.store
            .update_batch_status(batch_id, Status::InProgress)
            .await?;

        let req = batch.to_request(&pending);
        let response = self.run_batch(batch_id, &req).await?;
        Ok(Some(response))
    }

    /// One pass over every batch that is not finished yet
    ///
    /// Batches are resumed one at a time; a failing batch does not stop the pass.
    pub async fn resume_unfinished_batches(&self) -> Result<usize> {
        let batches = self.store.find_batches(&Status::INCOMPLETE_BATCH).await?;
        if batches.is_empty() {
            return Ok(0);
        }

        info!(count = batches.len(), "resuming unfinished batches");
        for batch in &batches {
            let span = span_batch(&batch.id, &batch.function_id);
            if let Err(err) = self
                .continue_batch_execution(&batch.id)
                .instrument(span)
                .await
            {
                warn!(batch = %batch.id, error = %err, "batch resume failed");
            }
        }
        Ok(batches.len())
    }
}
