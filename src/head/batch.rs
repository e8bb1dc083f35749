/*!
 * Batch Dispatch
 * Concurrent delivery of chunk work orders
 */

use super::partition::BatchAssignments;
use super::HeadNode;
use crate::core::{BatchSendError, PeerId};
use crate::models::Message;
use tracing::debug;

/// Peers whose delivery failed, empty when the send succeeded
pub fn send_failures(outcome: &Result<(), BatchSendError>) -> Vec<PeerId> {
    match outcome {
        Ok(()) => Vec::new(),
        Err(err) => err.targets(),
    }
}

impl HeadNode {
    /// Send every assignment, collecting per-peer failures
    pub(crate) async fn send_batch(
        &self,
        assignments: &BatchAssignments,
    ) -> Result<(), BatchSendError> {
        let sends = assignments.iter().map(|assignment| async move {
            let message = Message::from(assignment.order.clone());
            let outcome = self.host.send(&assignment.peer, &message).await;
            (assignment.peer, outcome)
        });

        let mut failures = BatchSendError::default();
        for (peer, outcome) in futures::future::join_all(sends).await {
            match outcome {
                Ok(()) => debug!(peer = %peer, "work order delivered"),
                Err(err) => failures.push(peer, err.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
