/*!
 * Execution Model
 * Execution requests, their configuration and the results peers report back
 */

use crate::core::limits::MAX_EXECUTION_TIMEOUT;
use crate::core::{Code, HeadError, PeerId};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

use super::consensus::{ConsensusType, UnknownConsensus};

/// Content-derived identity of one function invocation
///
/// md5 over `"<function_id>/<method> <arg1> <arg2> ..."`, hex encoded. Identical
/// invocations always map to the same ID, which makes work item IDs stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(function_id: &str, method: &str, arguments: &[String]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(function_invocation(function_id, method).as_bytes());
        hasher.update(b" ");
        hasher.update(arguments.join(" ").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub fn function_invocation(function_id: &str, method: &str) -> String {
    format!("{}/{}", function_id, method)
}

/// A request to execute one function
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Request {
    pub function_id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub config: Config,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl Request {
    pub fn new(function_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn execution_id(&self) -> ExecutionId {
        ExecutionId::new(&self.function_id, &self.method, &self.arguments)
    }

    /// Check that the request names something to execute
    pub fn validate(&self) -> Result<(), HeadError> {
        let mut problems = Vec::new();
        if self.function_id.is_empty() {
            problems.push("function ID is required");
        }
        if self.method.is_empty() {
            problems.push("method is required");
        }
        if self.config.node_count < -1 {
            problems.push("number of nodes must be -1 or positive");
        }
        if !(0.0..=1.0).contains(&self.config.threshold) {
            problems.push("threshold must be within [0, 1]");
        }
        if Duration::from_secs(self.config.timeout) > MAX_EXECUTION_TIMEOUT {
            problems.push("timeout exceeds the maximum execution timeout");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(HeadError::Configuration(problems.join(", ")))
        }
    }
}

/// Configurable options of an execution request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Runtime settings passed through to workers untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub result_aggregation: ResultAggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    /// Peers that should execute the request; -1 means every peer that reports
    #[serde(default, rename = "number_of_nodes")]
    pub node_count: i32,
    /// Execution timeout in seconds, 0 uses the head node default
    #[serde(default)]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consensus_algorithm: String,
    /// Fraction of peers that must return a result, in (0, 1]
    #[serde(default)]
    pub threshold: f64,
}

impl Config {
    /// Explicitly requested consensus algorithm, if any
    pub fn consensus(&self) -> Result<Option<ConsensusType>, UnknownConsensus> {
        if self.consensus_algorithm.is_empty() {
            return Ok(None);
        }
        self.consensus_algorithm.parse().map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultAggregation {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// Filter restricting which workers may volunteer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Parameter>,
}

/// Output the runtime produced for one execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RuntimeOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Resource usage, durations in nanoseconds
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub wall_clock_time: u64,
    #[serde(default)]
    pub cpu_user_time: u64,
    #[serde(default)]
    pub cpu_sys_time: u64,
    #[serde(default)]
    pub memory_max_kb: i64,
}

/// Result of one execution on one worker
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub code: Code,
    #[serde(default)]
    pub result: RuntimeOutput,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ExecutionResult {
    /// Executed and exited cleanly
    pub fn succeeded(&self) -> bool {
        self.code == Code::Ok && self.result.exit_code == 0
    }
}

/// PBFT bookkeeping attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftResultInfo {
    #[serde(default)]
    pub view: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub request_timestamp: OffsetDateTime,
}

impl Default for PbftResultInfo {
    fn default() -> Self {
        Self {
            view: 0,
            request_timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// Signed result a worker reports for an execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(flatten)]
    pub result: ExecutionResult,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub pbft: PbftResultInfo,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl NodeResult {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    pub fn with_pbft(mut self, view: u64, request_timestamp: OffsetDateTime) -> Self {
        self.pbft = PbftResultInfo {
            view,
            request_timestamp,
        };
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    // Signed bytes are the JSON encoding with the signature blanked
    fn signing_payload(&self) -> Result<Vec<u8>, HeadError> {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        Ok(serde_json::to_vec(&unsigned)?)
    }

    pub fn sign(&mut self, key: &SigningKey) -> Result<(), HeadError> {
        let payload = self.signing_payload()?;
        let signature = key.sign(&payload);
        self.signature = hex::encode(signature.to_bytes());
        Ok(())
    }

    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), HeadError> {
        if self.signature.is_empty() {
            return Err(HeadError::Signature("result is not signed".into()));
        }

        let bytes = hex::decode(&self.signature)
            .map_err(|e| HeadError::Signature(format!("invalid signature encoding: {}", e)))?;
        let signature = Signature::from_slice(&bytes)
            .map_err(|e| HeadError::Signature(format!("malformed signature: {}", e)))?;

        let payload = self.signing_payload()?;
        key.verify(&payload, &signature)
            .map_err(|e| HeadError::Signature(format!("verification failed: {}", e)))
    }
}

/// Results keyed by the peer that produced them
pub type ResultMap = HashMap<PeerId, NodeResult>;

/// Peers that took part in an execution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<PeerId>,
}
