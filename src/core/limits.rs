/*!
 * Limits and Defaults
 *
 * Centralized location for protocol constants, timeouts and capacity limits.
 * Grouped by the subsystem that consumes them.
 */

use std::time::Duration;

// =============================================================================
// TOPICS
// =============================================================================

/// Topic used for roll calls when the caller does not name a subgroup
pub const DEFAULT_TOPIC: &str = "blockless/b7s/general";

// =============================================================================
// TIMEOUTS
// =============================================================================

/// How long the head node collects roll call responses
pub const DEFAULT_ROLL_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the head node waits for workers to report execution results
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the head node waits for peers to confirm cluster formation
pub const DEFAULT_CLUSTER_FORMATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest execution timeout a request may ask for
pub const MAX_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Horizon used when a deadline would overflow the clock
pub const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// =============================================================================
// BATCH RESUMPTION
// =============================================================================

/// How often incomplete batches are requeued
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period before the first resume pass, so peers can connect
pub const DEFAULT_BATCH_RESUME_DELAY: Duration = Duration::from_secs(5);

/// Attempts after which a failing work item is given up on
pub const DEFAULT_WORK_ITEM_MAX_ATTEMPTS: u32 = 3;

// =============================================================================
// CAPACITY
// =============================================================================

/// Buffered roll call responses per active roll call
/// Responses beyond this are dropped rather than stalling the receive path
pub const ROLL_CALL_QUEUE_BUFFER_SIZE: usize = 1000;

/// Keys retained by the execution result wait maps
/// Bounds memory held for late or out-of-order replies
pub const EXECUTION_RESULT_CACHE_SIZE: usize = 1000;

// =============================================================================
// CONSENSUS
// =============================================================================

/// Smallest PBFT cluster able to tolerate a single faulty replica (3f+1, f=1)
pub const PBFT_MIN_REPLICA_COUNT: usize = 4;

/// Roll call node count meaning "every peer that reports in time"
pub const ALL_REPORTING_NODES: i32 = -1;
