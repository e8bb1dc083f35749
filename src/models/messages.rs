/*!
 * Wire Messages
 *
 * Every message exchanged between head and worker nodes. Messages are JSON
 * objects discriminated by their `type` field and decode into the closed
 * [`Message`] enum, so handling is an exhaustive match.
 */

use crate::core::{Code, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

use super::batch::{BatchResults, ExecutionRequestTemplate, NodeChunkResults};
use super::consensus::ConsensusType;
use super::execute::{Attributes, Cluster, ExecutionId, NodeResult, Request, ResultMap};

/// Broadcast asking workers to volunteer for a function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCall {
    pub function_id: String,
    pub request_id: String,
    #[serde(default)]
    pub consensus: ConsensusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    /// Only workers able to execute batches should answer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub batch: bool,
}

impl RollCall {
    pub fn response(&self, code: Code) -> RollCallResponse {
        RollCallResponse {
            function_id: self.function_id.clone(),
            request_id: self.request_id.clone(),
            code,
            batch_support: self.batch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollCallResponse {
    pub function_id: String,
    pub request_id: String,
    pub code: Code,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub batch_support: bool,
}

/// Client request for a single execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execute {
    #[serde(flatten)]
    pub request: Request,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub request_id: String,
    pub code: Code,
    #[serde(default)]
    pub results: ResultMap,
    #[serde(default)]
    pub cluster: Cluster,
    /// Reason for failure, for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Direct assignment of one execution to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    #[serde(flatten)]
    pub request: Request,
    pub request_id: String,
    /// Factors into PBFT result equality
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderResponse {
    pub request_id: String,
    pub result: NodeResult,
}

/// Client request for a batch execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecuteBatch {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    pub template: ExecutionRequestTemplate,
    #[serde(default)]
    pub arguments: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub worker_concurrency_limit: u32,
    /// Attempts per work item before it is given up on, 0 uses the head node default
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_attempts: u32,
}

impl ExecuteBatch {
    pub fn new(template: ExecutionRequestTemplate, arguments: Vec<Vec<String>>) -> Self {
        Self {
            template,
            arguments,
            ..Default::default()
        }
    }

    pub fn work_order(
        &self,
        request_id: &str,
        chunk_id: String,
        arguments: Vec<Vec<String>>,
    ) -> WorkOrderBatch {
        WorkOrderBatch {
            request_id: request_id.to_string(),
            chunk_id,
            template: self.template.clone(),
            arguments,
            concurrency_limit: self.worker_concurrency_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteBatchResponse {
    pub request_id: String,
    pub code: Code,
    /// Results keyed by chunk ID
    #[serde(default)]
    pub chunks: HashMap<String, NodeChunkResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One peer's share of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderBatch {
    pub request_id: String,
    pub chunk_id: String,
    pub template: ExecutionRequestTemplate,
    pub arguments: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub concurrency_limit: u32,
}

impl WorkOrderBatch {
    pub fn execution_ids(&self) -> Vec<ExecutionId> {
        self.arguments
            .iter()
            .map(|args| self.template.execution_id(args))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderBatchResponse {
    pub request_id: String,
    pub chunk_id: String,
    #[serde(default)]
    pub results: BatchResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormCluster {
    pub request_id: String,
    pub peers: Vec<PeerId>,
    pub consensus: ConsensusType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormClusterResponse {
    pub request_id: String,
    pub code: Code,
    #[serde(default)]
    pub consensus: ConsensusType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbandCluster {
    pub request_id: String,
}

/// All protocol messages, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "MsgRollCall")]
    RollCall(RollCall),
    #[serde(rename = "MsgRollCallResponse")]
    RollCallResponse(RollCallResponse),
    #[serde(rename = "MsgExecute")]
    Execute(Execute),
    #[serde(rename = "MsgExecuteResponse")]
    ExecuteResponse(ExecuteResponse),
    #[serde(rename = "MsgWorkOrder")]
    WorkOrder(WorkOrder),
    #[serde(rename = "MsgWorkOrderResponse")]
    WorkOrderResponse(WorkOrderResponse),
    #[serde(rename = "MsgExecuteBatch")]
    ExecuteBatch(ExecuteBatch),
    #[serde(rename = "MsgExecuteBatchResponse")]
    ExecuteBatchResponse(ExecuteBatchResponse),
    #[serde(rename = "MsgWorkOrderBatch")]
    WorkOrderBatch(WorkOrderBatch),
    #[serde(rename = "MsgWorkOrderBatchResponse")]
    WorkOrderBatchResponse(WorkOrderBatchResponse),
    #[serde(rename = "MsgFormCluster")]
    FormCluster(FormCluster),
    #[serde(rename = "MsgFormClusterResponse")]
    FormClusterResponse(FormClusterResponse),
    #[serde(rename = "MsgDisbandCluster")]
    DisbandCluster(DisbandCluster),
}

impl Message {
    /// Wire type tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::RollCall(_) => "MsgRollCall",
            Message::RollCallResponse(_) => "MsgRollCallResponse",
            Message::Execute(_) => "MsgExecute",
            Message::ExecuteResponse(_) => "MsgExecuteResponse",
            Message::WorkOrder(_) => "MsgWorkOrder",
            Message::WorkOrderResponse(_) => "MsgWorkOrderResponse",
            Message::ExecuteBatch(_) => "MsgExecuteBatch",
            Message::ExecuteBatchResponse(_) => "MsgExecuteBatchResponse",
            Message::WorkOrderBatch(_) => "MsgWorkOrderBatch",
            Message::WorkOrderBatchResponse(_) => "MsgWorkOrderBatchResponse",
            Message::FormCluster(_) => "MsgFormCluster",
            Message::FormClusterResponse(_) => "MsgFormClusterResponse",
            Message::DisbandCluster(_) => "MsgDisbandCluster",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

macro_rules! impl_into_message {
    ($($payload:ident),* $(,)?) => {
        $(
            impl From<$payload> for Message {
                fn from(payload: $payload) -> Self {
                    Message::$payload(payload)
                }
            }
        )*
    };
}

impl_into_message!(
    RollCall,
    RollCallResponse,
    Execute,
    ExecuteResponse,
    WorkOrder,
    WorkOrderResponse,
    ExecuteBatch,
    ExecuteBatchResponse,
    WorkOrderBatch,
    WorkOrderBatchResponse,
    FormCluster,
    FormClusterResponse,
    DisbandCluster,
);

fn is_zero(value: &u32) -> bool {
    *value == 0
}
