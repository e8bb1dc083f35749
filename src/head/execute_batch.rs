/*!
 * Batch Execution
 *
 * Persist the batch, recruit every volunteer, split the work between them
 * and record how each chunk fared. Errors while accepting the batch are
 * returned to the caller; later bookkeeping failures are logged because the
 * resume loop can recover from them.
 */

use super::batch::send_failures;
use super::lifecycle::{dedup_arguments, ChunkOutcome};
use super::partition::{partition_work_batch, Assignment};
use super::results::gather_peer_messages;
use super::HeadNode;
use crate::core::limits::ALL_REPORTING_NODES;
use crate::core::{deadline_after, new_request_id, peer_chunk_key, Code, HeadError, PeerId, Result};
use crate::models::messages::{ExecuteBatch, ExecuteBatchResponse, RollCall};
use crate::models::{ConsensusType, NodeChunkResults};
use crate::monitoring::metrics::BATCH_DURATION;
use crate::monitoring::{span_batch, Timer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

impl HeadNode {
    /// Execute a batch of invocations of one function
    pub async fn execute_function_batch(&self, req: ExecuteBatch) -> Result<ExecuteBatchResponse> {
        let batch_id = new_request_id();
        self.execute_batch_request(&batch_id, req).await
    }

    pub(crate) async fn execute_batch_request(
        &self,
        batch_id: &str,
        mut req: ExecuteBatch,
    ) -> Result<ExecuteBatchResponse> {
        let _timer = Timer::new(BATCH_DURATION, Arc::clone(&self.metrics));
        let span = span_batch(batch_id, &req.template.function_id);

        async {
            req.template.request(Vec::new()).validate()?;
            req.arguments = dedup_arguments(std::mem::take(&mut req.arguments));
            if req.arguments.is_empty() {
                return Err(HeadError::Configuration("batch has no arguments".into()));
            }
            if req.max_attempts == 0 {
                req.max_attempts = self.config.work_item_max_attempts;
            }

            self.save_batch(batch_id, &req, req.max_attempts).await?;
            info!(items = req.arguments.len(), "batch accepted");

            self.run_batch(batch_id, &req).await
        }
        .instrument(span)
        .await
    }

    /// Roll call, partition, send and gather for the arguments in `req`
    pub(crate) async fn run_batch(
        &self,
        batch_id: &str,
        req: &ExecuteBatch,
    ) -> Result<ExecuteBatchResponse> {
        let cancel = self.shutdown.child_token();

        let roll_call = RollCall {
            function_id: req.template.function_id.clone(),
            request_id: new_request_id(),
            consensus: ConsensusType::None,
            attributes: req.template.config.attributes.clone(),
            batch: true,
        };
        let topic = (!req.topic.is_empty()).then_some(req.topic.as_str());
        let peers = self
            .execute_roll_call(roll_call, topic, ALL_REPORTING_NODES, &cancel)
            .await?;

        let assignments = partition_work_batch(&peers, batch_id, req);
        self.save_chunk_info(batch_id, &assignments).await?;

        let sent = self.send_batch(&assignments).await;
        let failed = send_failures(&sent);
        if let Err(err) = sent {
            if err.len() == assignments.len() {
                return Err(HeadError::PartialDelivery(err));
            }
            warn!(batch = batch_id, failed = err.len(), error = %err, "some chunks were not delivered");
        }

        self.mark_started_chunks(batch_id, &assignments, &failed)
            .await;

        let delivered: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| !failed.contains(&a.peer))
            .collect();
        let delivered_peers: Vec<PeerId> = delivered.iter().map(|a| a.peer).collect();

        let deadline = deadline_after(self.execution_timeout(&req.template.config));
        let mut responses = gather_peer_messages(
            &self.batch_responses,
            &delivered_peers,
            |peer| {
                let chunk_id = assignments
                    .get(peer)
                    .map(|order| order.chunk_id.as_str())
                    .unwrap_or_default();
                peer_chunk_key(batch_id, chunk_id, peer)
            },
            deadline,
            &cancel,
        )
        .await;

        let outcomes: Vec<ChunkOutcome> = delivered
            .iter()
            .map(|a| ChunkOutcome::classify(batch_id, &a.order, responses.get(&a.peer)))
            .collect();

        if let Err(err) = self.mark_completed_chunks(&outcomes).await {
            warn!(batch = batch_id, error = %err, "could not record chunk results");
        }
        if let Err(err) = self.finalize_batch(batch_id).await {
            warn!(batch = batch_id, error = %err, "could not finalize batch");
        }

        let complete = failed.is_empty() && outcomes.iter().all(|o| o.complete);
        let chunks: HashMap<String, NodeChunkResults> = delivered
            .iter()
            .filter_map(|a| {
                responses.remove(&a.peer).map(|res| {
                    (
                        a.order.chunk_id.clone(),
                        NodeChunkResults {
                            peer: a.peer,
                            results: res.results,
                        },
                    )
                })
            })
            .collect();

        info!(
            batch = batch_id,
            chunks = assignments.len(),
            reported = chunks.len(),
            complete,
            "batch run finished"
        );

        Ok(ExecuteBatchResponse {
            request_id: batch_id.to_string(),
            code: if complete { Code::Ok } else { Code::PartialContent },
            chunks,
            message: None,
        })
    }
}
