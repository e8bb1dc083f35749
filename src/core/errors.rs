/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{Code, PeerId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Batch store errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StoreError {
    #[error("Batch {0} not found")]
    #[diagnostic(
        code(store::batch_not_found),
        help("The batch may have been deleted or was never persisted.")
    )]
    BatchNotFound(String),

    #[error("Chunk {0} not found")]
    #[diagnostic(code(store::chunk_not_found))]
    ChunkNotFound(String),

    #[error("Work item {0} not found")]
    #[diagnostic(code(store::work_item_not_found))]
    WorkItemNotFound(String),

    #[error("Store backend failure: {0}")]
    #[diagnostic(
        code(store::backend),
        help("Check connectivity to the batch store. Incomplete batches are retried on resume.")
    )]
    Backend(String),
}

/// Host transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum HostError {
    #[error("Failed to publish to topic {topic}: {reason}")]
    #[diagnostic(code(host::publish))]
    Publish { topic: String, reason: String },

    #[error("Failed to send to peer {peer}: {reason}")]
    #[diagnostic(code(host::send))]
    Send { peer: PeerId, reason: String },

    #[error("Peer {0} is not connected")]
    #[diagnostic(code(host::not_connected))]
    NotConnected(PeerId),
}

/// A single failed delivery within a fan-out send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub target: PeerId,
    pub reason: String,
}

/// Aggregate of per-peer delivery failures
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchSendError {
    failures: Vec<SendFailure>,
}

impl BatchSendError {
    pub fn new(failures: Vec<SendFailure>) -> Self {
        Self { failures }
    }

    pub fn push(&mut self, target: PeerId, reason: impl Into<String>) {
        self.failures.push(SendFailure {
            target,
            reason: reason.into(),
        });
    }

    /// Peers whose work order was not delivered
    pub fn targets(&self) -> Vec<PeerId> {
        self.failures.iter().map(|f| f.target).collect()
    }

    pub fn failures(&self) -> &[SendFailure] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for BatchSendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} send(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.target, failure.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchSendError {}

/// Head node errors
#[derive(Error, Debug, Diagnostic)]
pub enum HeadError {
    #[error("Roll call timed out")]
    #[diagnostic(
        code(head::roll_call_timeout),
        help("Not enough workers volunteered in time. Retry or lower the node count.")
    )]
    RollCallTimeout,

    #[error("Not enough peers for consensus: have {have}, need {need}")]
    #[diagnostic(
        code(head::insufficient_peers),
        help("PBFT needs at least four replicas. Request more nodes or a different algorithm.")
    )]
    InsufficientPeers { have: usize, need: usize },

    #[error("Publish failed: {0}")]
    #[diagnostic(code(head::publish))]
    Publish(#[source] HostError),

    #[error("Send failed: {0}")]
    #[diagnostic(code(head::send))]
    Send(#[source] HostError),

    #[error("Work order delivery failed: {0}")]
    #[diagnostic(
        code(head::delivery),
        help("Undelivered chunks stay pending and are picked up by the resume loop.")
    )]
    PartialDelivery(#[source] BatchSendError),

    #[error("Cluster formation failed: {0}")]
    #[diagnostic(code(head::cluster_formation))]
    ClusterFormation(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    #[diagnostic(code(head::codec))]
    Codec(String),

    #[error("Unsupported message: {0}")]
    #[diagnostic(
        code(head::unsupported_message),
        help("The head node does not handle this message type.")
    )]
    UnsupportedMessage(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(head::configuration))]
    Configuration(String),

    #[error("Signature error: {0}")]
    #[diagnostic(code(head::signature))]
    Signature(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(head::internal))]
    Internal(String),
}

impl HeadError {
    /// Result code reported to the requester for this failure
    pub fn code(&self) -> Code {
        match self {
            HeadError::RollCallTimeout => Code::Timeout,
            HeadError::InsufficientPeers { .. } => Code::Invalid,
            HeadError::Configuration(_) => Code::Invalid,
            HeadError::UnsupportedMessage(_) => Code::Invalid,
            HeadError::Codec(_) => Code::Invalid,
            HeadError::Store(StoreError::BatchNotFound(_)) => Code::NotFound,
            HeadError::Send(HostError::NotConnected(_)) => Code::NotAvailable,
            _ => Code::Error,
        }
    }
}

impl From<serde_json::Error> for HeadError {
    fn from(err: serde_json::Error) -> Self {
        HeadError::Codec(err.to_string())
    }
}

/// Result type for head node operations
pub type Result<T> = std::result::Result<T, HeadError>;
