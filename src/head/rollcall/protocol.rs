/*!
 * Roll Call Protocol
 *
 * Publish a roll call, then collect volunteers until the requested number
 * reported or the roll call timeout passes. Peers are returned in the order
 * they reported.
 */

use super::queue::{RollCallQueue, RollCallReply};
use crate::core::limits::{ALL_REPORTING_NODES, PBFT_MIN_REPLICA_COUNT};
use crate::core::{deadline_after, Code, HeadError, PeerId, Result};
use crate::head::HeadNode;
use crate::models::messages::{RollCall, RollCallResponse};
use crate::models::{ConsensusType, Message};
use crate::monitoring::metrics::ROLL_CALLS_PUBLISHED;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Removes the roll call's queue entry however collection ends
struct ActiveRollCall<'a> {
    queue: &'a RollCallQueue,
    request_id: &'a str,
}

impl<'a> ActiveRollCall<'a> {
    fn open(queue: &'a RollCallQueue, request_id: &'a str) -> Self {
        queue.create(request_id);
        Self { queue, request_id }
    }
}

impl Drop for ActiveRollCall<'_> {
    fn drop(&mut self) {
        self.queue.remove(self.request_id);
    }
}

impl HeadNode {
    /// Run a roll call and return the peers that volunteered
    ///
    /// A `node_count` of [`ALL_REPORTING_NODES`] collects every volunteer
    /// until the timeout and succeeds if at least one reported. Zero asks
    /// for a single peer.
    pub async fn execute_roll_call(
        &self,
        roll_call: RollCall,
        topic: Option<&str>,
        node_count: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<PeerId>> {
        let node_count = if node_count == 0 { 1 } else { node_count };
        let request_id = roll_call.request_id.clone();
        let _active = ActiveRollCall::open(&self.roll_call, &request_id);

        let Some(rx) = self.roll_call.responses(&request_id) else {
            return Err(HeadError::Internal(format!(
                "roll call queue missing for {}",
                request_id
            )));
        };

        let topic = topic.unwrap_or(self.config.default_topic.as_str());
        let function_id = roll_call.function_id.clone();
        let batch = roll_call.batch;
        let consensus = roll_call.consensus;

        self.host
            .publish(topic, &Message::from(roll_call))
            .await
            .map_err(HeadError::Publish)?;
        self.metrics.inc_counter_with_labels(
            ROLL_CALLS_PUBLISHED,
            1.0,
            &[("function", function_id.as_str())],
        );

        debug!(request = %request_id, topic, node_count, "roll call published");

        let deadline = deadline_after(self.config.roll_call_timeout);
        let wanted = usize::try_from(node_count).ok().filter(|n| *n > 0);
        let mut peers: Vec<PeerId> = Vec::new();

        loop {
            let reply = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = cancel.cancelled() => break,
                reply = rx.recv_async() => match reply {
                    Ok(reply) => reply,
                    Err(_) => break,
                },
            };

            let RollCallReply { from, response } = reply;
            if response.function_id != function_id || response.batch_support != batch {
                debug!(request = %request_id, peer = %from, "ignoring mismatched roll call response");
                continue;
            }
            if !self.host.is_connected(&from) {
                debug!(request = %request_id, peer = %from, "ignoring roll call response from unconnected peer");
                continue;
            }
            if peers.contains(&from) {
                continue;
            }

            peers.push(from);

            if wanted.is_some_and(|n| peers.len() >= n) {
                break;
            }
        }

        let satisfied = match wanted {
            Some(n) => peers.len() >= n,
            None => node_count == ALL_REPORTING_NODES && !peers.is_empty(),
        };
        if !satisfied {
            warn!(
                request = %request_id,
                function = %function_id,
                reported = peers.len(),
                node_count,
                "roll call timed out"
            );
            return Err(HeadError::RollCallTimeout);
        }

        if consensus == ConsensusType::Pbft && peers.len() < PBFT_MIN_REPLICA_COUNT {
            return Err(HeadError::InsufficientPeers {
                have: peers.len(),
                need: PBFT_MIN_REPLICA_COUNT,
            });
        }

        info!(request = %request_id, function = %function_id, peers = peers.len(), "roll call complete");
        Ok(peers)
    }

    pub(crate) fn process_roll_call_response(&self, from: PeerId, response: RollCallResponse) {
        if response.code != Code::Accepted {
            debug!(peer = %from, request = %response.request_id, code = %response.code, "peer declined roll call");
            return;
        }
        if !self.roll_call.exists(&response.request_id) {
            debug!(peer = %from, request = %response.request_id, "roll call no longer active");
            return;
        }

        let request_id = response.request_id.clone();
        self.roll_call
            .add(&request_id, RollCallReply { from, response });
    }
}
