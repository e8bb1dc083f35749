/*!
 * Function Execution
 *
 * Single execution: roll call, optional consensus cluster, one work order
 * per volunteer, then a direct or PBFT gather. Failures never escape as
 * errors; they become the result code of the outcome.
 */

use super::results::QuorumResult;
use super::HeadNode;
use crate::core::limits::MAX_EXECUTION_TIMEOUT;
use crate::core::{deadline_after, new_request_id, Code, HeadError, PeerId, Result};
use crate::models::messages::{RollCall, WorkOrder};
use crate::models::{Cluster, Config, ConsensusType, Message, Request, ResultMap};
use crate::monitoring::metrics::EXECUTION_DURATION;
use crate::monitoring::{span_execution, Timer};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// What an execution produced, as reported to the requester
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub code: Code,
    pub request_id: String,
    pub results: ResultMap,
    pub cluster: Cluster,
    /// Failure reason, if any
    pub message: Option<String>,
}

/// Code for a direct gather of `received` out of `expected` results
pub(crate) fn direct_result_code(received: usize, expected: usize, threshold: f64) -> Code {
    if received == 0 {
        return Code::Timeout;
    }
    if threshold > 0.0 && threshold <= 1.0 {
        let needed = (threshold * expected as f64).ceil() as usize;
        if received < needed {
            return Code::PartialContent;
        }
    }
    Code::Ok
}

pub(crate) fn quorum_result_code(outcome: &QuorumResult) -> Code {
    match (outcome.quorum_reached, outcome.results.is_empty()) {
        (true, _) => Code::Ok,
        (false, true) => Code::Timeout,
        (false, false) => Code::PartialContent,
    }
}

impl HeadNode {
    /// Execute a function on the network
    ///
    /// `topic` narrows the roll call to a subgroup of workers.
    pub async fn execute_function(&self, request: Request, topic: Option<&str>) -> ExecutionOutcome {
        let request_id = new_request_id();
        let _timer = Timer::new(EXECUTION_DURATION, Arc::clone(&self.metrics));
        let span = span_execution(&request_id, &request.function_id);

        async {
            match self.run_execution(&request_id, &request, topic).await {
                Ok((code, results, cluster)) => {
                    info!(code = %code, results = results.len(), "execution complete");
                    ExecutionOutcome {
                        code,
                        request_id: request_id.clone(),
                        results,
                        cluster,
                        message: None,
                    }
                }
                Err(err) => {
                    warn!(error = %err, "execution failed");
                    ExecutionOutcome {
                        code: err.code(),
                        request_id: request_id.clone(),
                        results: ResultMap::new(),
                        cluster: Cluster::default(),
                        message: Some(err.to_string()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_execution(
        &self,
        request_id: &str,
        request: &Request,
        topic: Option<&str>,
    ) -> Result<(Code, ResultMap, Cluster)> {
        request.validate()?;

        let consensus = match request
            .config
            .consensus()
            .map_err(|e| HeadError::Configuration(e.to_string()))?
        {
            Some(consensus) => consensus,
            None if request.config.node_count > 1 => self.config.default_consensus,
            None => ConsensusType::None,
        };
        let node_count = match request.config.node_count {
            0 => 1,
            n => n,
        };

        let cancel = self.shutdown.child_token();
        let roll_call = RollCall {
            function_id: request.function_id.clone(),
            request_id: request_id.to_string(),
            consensus,
            attributes: request.config.attributes.clone(),
            batch: false,
        };
        let peers = self
            .execute_roll_call(roll_call, topic, node_count, &cancel)
            .await?;

        let cluster = Cluster {
            main: None,
            peers: peers.clone(),
        };

        if !consensus.requires_cluster() {
            let (code, results) = self
                .dispatch_and_gather(request_id, request, &peers, consensus, &cancel)
                .await?;
            return Ok((code, results, cluster));
        }

        self.form_cluster(request_id, &peers, consensus, &cancel)
            .await?;
        let outcome = self
            .dispatch_and_gather(request_id, request, &peers, consensus, &cancel)
            .await;
        self.disband_cluster(request_id, &peers).await;

        let (code, results) = outcome?;
        Ok((code, results, cluster))
    }

    async fn dispatch_and_gather(
        &self,
        request_id: &str,
        request: &Request,
        peers: &[PeerId],
        consensus: ConsensusType,
        cancel: &CancellationToken,
    ) -> Result<(Code, ResultMap)> {
        let message = Message::from(WorkOrder {
            request: request.clone(),
            request_id: request_id.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        });

        let sends = peers.iter().map(|peer| self.host.send(peer, &message));
        for outcome in futures::future::join_all(sends).await {
            outcome.map_err(HeadError::Send)?;
        }

        let deadline = deadline_after(self.execution_timeout(&request.config));

        if consensus == ConsensusType::Pbft {
            let outcome = self
                .gather_execution_results_pbft(request_id, peers, deadline, cancel)
                .await;
            return Ok((quorum_result_code(&outcome), outcome.results));
        }

        let results = self
            .gather_execution_results(request_id, peers, deadline, cancel)
            .await;
        let code = direct_result_code(results.len(), peers.len(), request.config.threshold);
        Ok((code, results))
    }

    /// Request timeout if set, otherwise the head node default
    ///
    /// Request timeouts are capped at [`MAX_EXECUTION_TIMEOUT`].
    pub(crate) fn execution_timeout(&self, config: &Config) -> Duration {
        match config.timeout {
            0 => self.config.execution_timeout,
            secs => Duration::from_secs(secs).min(MAX_EXECUTION_TIMEOUT),
        }
    }
}
