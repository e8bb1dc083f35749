/*!
 * P2P Dispatch Library
 * Head node orchestration for peer-to-peer function execution
 */

pub mod consensus;
pub mod core;
pub mod head;
pub mod host;
pub mod models;
pub mod monitoring;
pub mod store;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::{Code, PeerId, WaitMap};
pub use head::{ExecutionOutcome, HeadConfig, HeadNode, HeadNodeBuilder, ResumeTask};
pub use host::Host;
pub use models::{ConsensusType, Message, NodeResult, Request};
pub use monitoring::{init_tracing, MetricsCollector};
pub use store::{BatchStore, MemoryBatchStore, Status};

#[cfg(feature = "mongodb")]
pub use store::MongoBatchStore;
