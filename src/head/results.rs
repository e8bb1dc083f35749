/*!
 * Result Gathering
 *
 * Waits for the replies of a set of peers, bounded by a deadline.
 *
 * - Direct: every reply that arrives before the deadline is kept.
 * - PBFT: signed replies are grouped by output and request timestamp; the
 *   first group reaching `f + 1` members wins and the remaining waits are
 *   cancelled.
 */

use crate::consensus::pbft;
use crate::core::{peer_request_key, PeerId, WaitMap};
use crate::head::HeadNode;
use crate::models::{NodeResult, ResultMap, RuntimeOutput};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a PBFT gather
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuorumResult {
    /// The winning group, or every valid reply if no group reached quorum
    pub results: ResultMap,
    pub quorum_reached: bool,
}

/// Wait for each peer's value under its key, concurrently
pub(crate) async fn gather_peer_messages<V, F>(
    responses: &WaitMap<String, V>,
    peers: &[PeerId],
    key_fn: F,
    deadline: Instant,
    cancel: &CancellationToken,
) -> HashMap<PeerId, V>
where
    V: Clone,
    F: Fn(&PeerId) -> String,
{
    let waits = peers.iter().map(|peer| {
        let key = key_fn(peer);
        let peer = *peer;
        async move {
            responses
                .wait_until(&key, deadline, cancel)
                .await
                .map(|value| (peer, value))
        }
    });

    futures::future::join_all(waits)
        .await
        .into_iter()
        .flatten()
        .collect()
}

impl HeadNode {
    pub(crate) async fn gather_execution_results(
        &self,
        request_id: &str,
        peers: &[PeerId],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ResultMap {
        let results = gather_peer_messages(
            &self.work_order_responses,
            peers,
            |peer| peer_request_key(request_id, peer),
            deadline,
            cancel,
        )
        .await;

        debug!(request = request_id, expected = peers.len(), received = results.len(), "results gathered");
        results
    }

    pub(crate) async fn gather_execution_results_pbft(
        &self,
        request_id: &str,
        peers: &[PeerId],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> QuorumResult {
        let quorum = pbft::min_cluster_results(peers.len());
        let stop = cancel.child_token();

        let mut pending: FuturesUnordered<_> = peers
            .iter()
            .map(|peer| {
                let peer = *peer;
                let key = peer_request_key(request_id, &peer);
                let responses = self.work_order_responses.clone();
                let stop = stop.clone();
                async move {
                    let result = responses.wait_until(&key, deadline, &stop).await?;
                    verified(&peer, &result).then_some((peer, result))
                }
            })
            .collect();

        let mut received = ResultMap::new();
        let mut groups: HashMap<(RuntimeOutput, i128), Vec<PeerId>> = HashMap::new();

        while let Some(reply) = pending.next().await {
            let Some((peer, result)) = reply else {
                continue;
            };

            let group_key = (
                result.result.result.clone(),
                result.pbft.request_timestamp.unix_timestamp_nanos(),
            );
            received.insert(peer, result);

            let members = groups.entry(group_key).or_default();
            members.push(peer);

            if members.len() >= quorum {
                stop.cancel();
                debug!(request = request_id, quorum, "execution results reached quorum");

                let results = members
                    .iter()
                    .filter_map(|member| received.remove_entry(member))
                    .collect();
                return QuorumResult {
                    results,
                    quorum_reached: true,
                };
            }
        }

        warn!(
            request = request_id,
            quorum,
            received = received.len(),
            "execution results did not reach quorum"
        );
        QuorumResult {
            results: received,
            quorum_reached: false,
        }
    }
}

fn verified(peer: &PeerId, result: &NodeResult) -> bool {
    let outcome = peer
        .public_key()
        .map_err(|e| e.to_string())
        .and_then(|key| result.verify_signature(&key).map_err(|e| e.to_string()));

    match outcome {
        Ok(()) => true,
        Err(reason) => {
            warn!(peer = %peer, reason = %reason, "discarding result with invalid signature");
            false
        }
    }
}
