/*!
 * Head Node Configuration
 * Timeouts, retry limits and capacities, with environment overrides
 */

use crate::core::limits::*;
use crate::core::{HeadError, Result};
use crate::models::ConsensusType;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadConfig {
    /// Topic roll calls go out on when a request names none
    pub default_topic: String,
    pub roll_call_timeout: Duration,
    pub execution_timeout: Duration,
    pub cluster_formation_timeout: Duration,
    /// Interval between passes of the batch resume loop
    pub requeue_interval: Duration,
    /// Delay before the first resume pass
    pub batch_resume_delay: Duration,
    pub work_item_max_attempts: u32,
    pub roll_call_queue_size: usize,
    pub result_cache_size: usize,
    /// Used for multi-node executions that request no algorithm
    pub default_consensus: ConsensusType,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            default_topic: DEFAULT_TOPIC.to_string(),
            roll_call_timeout: DEFAULT_ROLL_CALL_TIMEOUT,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            cluster_formation_timeout: DEFAULT_CLUSTER_FORMATION_TIMEOUT,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            batch_resume_delay: DEFAULT_BATCH_RESUME_DELAY,
            work_item_max_attempts: DEFAULT_WORK_ITEM_MAX_ATTEMPTS,
            roll_call_queue_size: ROLL_CALL_QUEUE_BUFFER_SIZE,
            result_cache_size: EXECUTION_RESULT_CACHE_SIZE,
            default_consensus: ConsensusType::Raft,
        }
    }
}

impl HeadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `HEAD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64, _>(&lookup, "HEAD_ROLL_CALL_TIMEOUT_MS")? {
            self.roll_call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "HEAD_EXECUTION_TIMEOUT_MS")? {
            self.execution_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "HEAD_CLUSTER_FORMATION_TIMEOUT_MS")? {
            self.cluster_formation_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "HEAD_REQUEUE_INTERVAL_SECS")? {
            self.requeue_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "HEAD_BATCH_RESUME_DELAY_SECS")? {
            self.batch_resume_delay = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "HEAD_WORK_ITEM_MAX_ATTEMPTS")? {
            self.work_item_max_attempts = attempts;
        }
        if let Some(topic) = lookup("HEAD_DEFAULT_TOPIC") {
            self.default_topic = topic;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn with_default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = topic.into();
        self
    }

    pub fn with_roll_call_timeout(mut self, timeout: Duration) -> Self {
        self.roll_call_timeout = timeout;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_cluster_formation_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_formation_timeout = timeout;
        self
    }

    pub fn with_requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    pub fn with_batch_resume_delay(mut self, delay: Duration) -> Self {
        self.batch_resume_delay = delay;
        self
    }

    pub fn with_result_cache_size(mut self, size: usize) -> Self {
        self.result_cache_size = size;
        self
    }

    pub fn with_work_item_max_attempts(mut self, attempts: u32) -> Self {
        self.work_item_max_attempts = attempts;
        self
    }

    pub fn with_default_consensus(mut self, consensus: ConsensusType) -> Self {
        self.default_consensus = consensus;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let zero_timeouts = [
            ("roll call timeout", self.roll_call_timeout),
            ("execution timeout", self.execution_timeout),
            ("cluster formation timeout", self.cluster_formation_timeout),
            ("requeue interval", self.requeue_interval),
        ];
        if let Some((name, _)) = zero_timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(HeadError::Configuration(format!("{} must be non-zero", name)));
        }
        if self.roll_call_queue_size == 0 {
            return Err(HeadError::Configuration(
                "roll call queue size must be non-zero".into(),
            ));
        }
        if self.result_cache_size == 0 {
            return Err(HeadError::Configuration(
                "result cache size must be non-zero".into(),
            ));
        }
        if self.work_item_max_attempts == 0 {
            return Err(HeadError::Configuration(
                "work item max attempts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| HeadError::Configuration(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
