/*!
 * Models
 * Execution requests, results and the wire messages that carry them
 */

pub mod batch;
pub mod consensus;
pub mod execute;
pub mod messages;

pub use batch::{BatchFunctionResult, BatchResults, ExecutionRequestTemplate, NodeChunkResults};
pub use consensus::ConsensusType;
pub use execute::{
    function_invocation, Attributes, Cluster, Config, ExecutionId, ExecutionResult, NodeResult,
    PbftResultInfo, Request, ResultMap, RuntimeOutput, Usage,
};
pub use messages::Message;
