/*!
 * Head Node
 *
 * Accepts execution requests, recruits workers through roll calls, hands
 * out work and gathers the results.
 *
 * # Architecture
 *
 * - `rollcall`: broadcast for volunteers and collect their replies
 * - `results`: wait for per-peer replies, directly or with a PBFT quorum
 * - `partition`: split batch arguments across volunteers
 * - `lifecycle`: persist batch, chunk and work item state and resume it
 * - `resume`: background task requeueing unfinished batches
 *
 * Replies arrive through [`HeadNode::process`] and are routed into the roll
 * call queue or one of the wait maps, where orchestration tasks pick them up.
 */

mod batch;
mod builder;
mod cluster;
pub mod config;
mod execute;
mod execute_batch;
mod lifecycle;
pub mod partition;
mod resume;
mod results;
pub mod rollcall;

pub use batch::send_failures;
pub use builder::HeadNodeBuilder;
pub use config::HeadConfig;
pub use execute::ExecutionOutcome;
pub use lifecycle::{effective_max_attempts, filter_work_items};
pub use partition::{partition_work_batch, Assignment, BatchAssignments};
pub use resume::{ResumeCommand, ResumeTask};
pub use results::QuorumResult;
pub use rollcall::{RollCallQueue, RollCallReply};

use crate::core::{peer_chunk_key, peer_request_key, HeadError, PeerId, Result, WaitMap};
use crate::host::Host;
use crate::models::messages::{
    ExecuteBatchResponse, ExecuteResponse, FormClusterResponse, WorkOrderBatchResponse,
};
use crate::models::{Message, NodeResult};
use crate::monitoring::metrics::MESSAGES_PROCESSED;
use crate::monitoring::MetricsCollector;
use crate::store::BatchStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Head node orchestrator
pub struct HeadNode {
    host: Arc<dyn Host>,
    store: Arc<dyn BatchStore>,
    config: Arc<HeadConfig>,
    metrics: Arc<MetricsCollector>,
    roll_call: RollCallQueue,
    /// Keyed by `request/peer`
    work_order_responses: WaitMap<String, NodeResult>,
    /// Keyed by `request/chunk/peer`
    batch_responses: WaitMap<String, WorkOrderBatchResponse>,
    /// Keyed by `request/peer`
    cluster_responses: WaitMap<String, FormClusterResponse>,
    shutdown: CancellationToken,
}

impl Clone for HeadNode {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
            roll_call: self.roll_call.clone(),
            work_order_responses: self.work_order_responses.clone(),
            batch_responses: self.batch_responses.clone(),
            cluster_responses: self.cluster_responses.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl HeadNode {
    pub fn builder(host: Arc<dyn Host>) -> HeadNodeBuilder {
        HeadNodeBuilder::new(host)
    }

    pub fn id(&self) -> PeerId {
        self.host.id()
    }

    pub fn config(&self) -> &HeadConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    /// Active roll calls
    pub fn roll_calls(&self) -> &RollCallQueue {
        &self.roll_call
    }

    /// Token cancelled when the node shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every in-flight wait and stop background tasks
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Decode and handle a message received from `from`
    pub async fn process(&self, from: PeerId, payload: &[u8]) -> Result<()> {
        let message = Message::from_bytes(payload)?;
        self.metrics
            .inc_counter_with_labels(MESSAGES_PROCESSED, 1.0, &[("type", message.type_name())]);
        self.handle_message(from, message).await
    }

    pub async fn handle_message(&self, from: PeerId, message: Message) -> Result<()> {
        debug!(peer = %from, kind = message.type_name(), "received message");

        match message {
            Message::RollCallResponse(res) => {
                self.process_roll_call_response(from, res);
                Ok(())
            }
            Message::WorkOrderResponse(res) => {
                let key = peer_request_key(&res.request_id, &from);
                self.work_order_responses.set(key, res.result);
                Ok(())
            }
            Message::WorkOrderBatchResponse(res) => {
                let key = peer_chunk_key(&res.request_id, &res.chunk_id, &from);
                self.batch_responses.set(key, res);
                Ok(())
            }
            Message::FormClusterResponse(res) => {
                let key = peer_request_key(&res.request_id, &from);
                self.cluster_responses.set(key, res);
                Ok(())
            }
            Message::Execute(req) => self.process_execute(from, req).await,
            Message::ExecuteBatch(req) => self.process_execute_batch(from, req).await,
            other @ (Message::RollCall(_)
            | Message::ExecuteResponse(_)
            | Message::WorkOrder(_)
            | Message::ExecuteBatchResponse(_)
            | Message::WorkOrderBatch(_)
            | Message::FormCluster(_)
            | Message::DisbandCluster(_)) => {
                warn!(peer = %from, kind = other.type_name(), "unsupported message");
                Err(HeadError::UnsupportedMessage(other.type_name().to_string()))
            }
        }
    }

    async fn process_execute(
        &self,
        from: PeerId,
        req: crate::models::messages::Execute,
    ) -> Result<()> {
        let topic = req.topic.clone();
        let outcome = self.execute_function(req.request, topic.as_deref()).await;

        let response = ExecuteResponse {
            request_id: outcome.request_id,
            code: outcome.code,
            results: outcome.results,
            cluster: outcome.cluster,
            message: outcome.message,
        };
        self.send(&from, &Message::from(response)).await
    }

    async fn process_execute_batch(
        &self,
        from: PeerId,
        req: crate::models::messages::ExecuteBatch,
    ) -> Result<()> {
        let request_id = crate::core::new_request_id();

        let response = match self.execute_batch_request(&request_id, req).await {
            Ok(response) => response,
            Err(err) => {
                warn!(peer = %from, request = %request_id, error = %err, "batch execution failed");
                ExecuteBatchResponse {
                    request_id,
                    code: err.code(),
                    chunks: Default::default(),
                    message: Some(err.to_string()),
                }
            }
        };
        self.send(&from, &Message::from(response)).await
    }

    async fn send(&self, to: &PeerId, message: &Message) -> Result<()> {
        self.host.send(to, message).await.map_err(HeadError::Send)
    }
}
