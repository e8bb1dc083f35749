/*!
 * Batch Model
 * Templates and per-item results for batch executions
 */

use crate::core::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::execute::{Config, ExecutionId, NodeResult, Request};

/// Function and configuration shared by every item of a batch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionRequestTemplate {
    pub function_id: String,
    pub method: String,
    #[serde(default)]
    pub config: Config,
}

impl ExecutionRequestTemplate {
    pub fn new(function_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            method: method.into(),
            config: Config::default(),
        }
    }

    pub fn execution_id(&self, arguments: &[String]) -> ExecutionId {
        ExecutionId::new(&self.function_id, &self.method, arguments)
    }

    /// Single execution request for one argument tuple
    pub fn request(&self, arguments: Vec<String>) -> Request {
        Request {
            function_id: self.function_id.clone(),
            method: self.method.clone(),
            arguments,
            config: self.config.clone(),
            signature: String::new(),
        }
    }
}

/// Result of one batch item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchFunctionResult {
    #[serde(flatten)]
    pub node_result: NodeResult,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_invocation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl BatchFunctionResult {
    pub fn succeeded(&self) -> bool {
        self.node_result.result.succeeded()
    }
}

/// Batch item results keyed by execution ID
pub type BatchResults = HashMap<ExecutionId, BatchFunctionResult>;

/// Results one peer reported for its chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeChunkResults {
    pub peer: PeerId,
    #[serde(default)]
    pub results: BatchResults,
}
