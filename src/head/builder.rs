/*!
 * Head Node Builder
 * Builder pattern for HeadNode construction
 */

use super::config::HeadConfig;
use super::rollcall::RollCallQueue;
use super::HeadNode;
use crate::core::{Result, WaitMap};
use crate::host::Host;
use crate::monitoring::metrics::NODE_INFO;
use crate::monitoring::MetricsCollector;
use crate::store::{BatchStore, MemoryBatchStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for HeadNode
pub struct HeadNodeBuilder {
    host: Arc<dyn Host>,
    store: Option<Arc<dyn BatchStore>>,
    config: Option<HeadConfig>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HeadNodeBuilder {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            store: None,
            config: None,
            metrics: None,
        }
    }

    /// Persist batches in `store` (in-memory store if unset)
    pub fn with_store(mut self, store: Arc<dyn BatchStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: HeadConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a metrics collector with the rest of the process
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate configuration and build the head node
    pub fn build(self) -> Result<HeadNode> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryBatchStore::new()));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new()));

        let id = self.host.id().to_string();
        metrics.set_gauge_with_labels(
            NODE_INFO,
            1.0,
            &[
                ("id", id.as_str()),
                ("role", "head"),
                ("version", env!("CARGO_PKG_VERSION")),
            ],
        );

        info!(
            id = %id,
            roll_call_timeout = ?config.roll_call_timeout,
            execution_timeout = ?config.execution_timeout,
            "head node created"
        );

        Ok(HeadNode {
            host: self.host,
            store,
            metrics,
            roll_call: RollCallQueue::new(config.roll_call_queue_size),
            work_order_responses: WaitMap::new(config.result_cache_size),
            batch_responses: WaitMap::new(config.result_cache_size),
            cluster_responses: WaitMap::new(config.result_cache_size),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        })
    }
}
