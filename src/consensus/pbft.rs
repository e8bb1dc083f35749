/*!
 * PBFT Quorum Math
 *
 * A cluster of `n` replicas tolerates `f = floor((n - 1) / 3)` byzantine
 * replicas. A client accepts a result once `f + 1` replicas agree on it,
 * since at least one of them must be honest.
 */

pub use crate::core::limits::PBFT_MIN_REPLICA_COUNT;

/// Byzantine replicas a cluster of `n` can tolerate
pub const fn byzantine_tolerance(n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    (n - 1) / 3
}

/// Identical results a client needs before accepting one
pub const fn min_cluster_results(n: usize) -> usize {
    byzantine_tolerance(n) + 1
}
