/*!
 * Cluster Formation
 * Consensus clusters for Raft and PBFT executions
 */

use super::results::gather_peer_messages;
use super::HeadNode;
use crate::core::{deadline_after, peer_request_key, Code, HeadError, PeerId, Result};
use crate::models::messages::{DisbandCluster, FormCluster};
use crate::models::{ConsensusType, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

impl HeadNode {
    /// Ask every peer to join a cluster and wait for all of them to confirm
    pub(crate) async fn form_cluster(
        &self,
        request_id: &str,
        peers: &[PeerId],
        consensus: ConsensusType,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let message = Message::from(FormCluster {
            request_id: request_id.to_string(),
            peers: peers.to_vec(),
            consensus,
        });

        let sends = peers.iter().map(|peer| self.host.send(peer, &message));
        for (peer, outcome) in peers.iter().zip(futures::future::join_all(sends).await) {
            if let Err(err) = outcome {
                self.disband_cluster(request_id, peers).await;
                return Err(HeadError::ClusterFormation(format!(
                    "could not reach {}: {}",
                    peer, err
                )));
            }
        }

        let deadline = deadline_after(self.config.cluster_formation_timeout);
        let responses = gather_peer_messages(
            &self.cluster_responses,
            peers,
            |peer| peer_request_key(request_id, peer),
            deadline,
            cancel,
        )
        .await;

        let unconfirmed: Vec<String> = peers
            .iter()
            .filter(|peer| {
                responses
                    .get(peer)
                    .map_or(true, |res| res.code != Code::Ok)
            })
            .map(|peer| peer.to_string())
            .collect();

        if !unconfirmed.is_empty() {
            self.disband_cluster(request_id, peers).await;
            return Err(HeadError::ClusterFormation(format!(
                "{} of {} peers did not confirm: {}",
                unconfirmed.len(),
                peers.len(),
                unconfirmed.join(", ")
            )));
        }

        debug!(request = request_id, consensus = %consensus, peers = peers.len(), "cluster formed");
        Ok(())
    }

    /// Tell every cluster peer to leave; failures are only logged
    pub(crate) async fn disband_cluster(&self, request_id: &str, peers: &[PeerId]) {
        let message = Message::from(DisbandCluster {
            request_id: request_id.to_string(),
        });

        let sends = peers.iter().map(|peer| self.host.send(peer, &message));
        for (peer, outcome) in peers.iter().zip(futures::future::join_all(sends).await) {
            if let Err(err) = outcome {
                warn!(request = request_id, peer = %peer, error = %err, "could not disband cluster");
            }
        }
    }
}
