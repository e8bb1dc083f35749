/*!
 * Batch Partitioning
 * Round-robin assignment of argument tuples to volunteers
 */

use crate::core::PeerId;
use crate::models::messages::{ExecuteBatch, WorkOrderBatch};
use uuid::Uuid;

/// One peer's chunk of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub peer: PeerId,
    pub order: WorkOrderBatch,
}

/// Chunk assignments in peer order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAssignments {
    assignments: Vec<Assignment>,
}

impl BatchAssignments {
    pub fn get(&self, peer: &PeerId) -> Option<&WorkOrderBatch> {
        self.assignments
            .iter()
            .find(|a| a.peer == *peer)
            .map(|a| &a.order)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.assignments.iter().map(|a| a.peer).collect()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl<'a> IntoIterator for &'a BatchAssignments {
    type Item = &'a Assignment;
    type IntoIter = std::slice::Iter<'a, Assignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}

/// Split a batch across `peers`
///
/// Tuple `i` goes to `peers[i % peers.len()]`. Every chunk gets a fresh
/// `<request id>:<uuid>` ID; peers left without tuples get no chunk.
pub fn partition_work_batch(
    peers: &[PeerId],
    request_id: &str,
    req: &ExecuteBatch,
) -> BatchAssignments {
    if peers.is_empty() {
        return BatchAssignments::default();
    }

    let mut shares: Vec<Vec<Vec<String>>> = vec![Vec::new(); peers.len()];
    for (i, args) in req.arguments.iter().enumerate() {
        shares[i % peers.len()].push(args.clone());
    }

    let assignments = peers
        .iter()
        .zip(shares)
        .filter(|(_, share)| !share.is_empty())
        .map(|(peer, share)| {
            let chunk_id = format!("{}:{}", request_id, Uuid::new_v4());
            Assignment {
                peer: *peer,
                order: req.work_order(request_id, chunk_id, share),
            }
        })
        .collect();

    BatchAssignments { assignments }
}
