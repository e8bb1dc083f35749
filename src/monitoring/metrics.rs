/*!
 * Metrics Collection
 * Counters, gauges and histograms for head node activity
 */

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ROLL_CALLS_PUBLISHED: &str = "head_roll_calls_published";
pub const MESSAGES_PROCESSED: &str = "head_messages_processed";
pub const EXECUTION_DURATION: &str = "head_execution_duration";
pub const BATCH_DURATION: &str = "head_batch_duration";
pub const NODE_INFO: &str = "head_node_info";

const DURATION_BUCKETS: [f64; 10] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

#[derive(Debug, Clone)]
struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        Self {
            buckets: buckets.to_vec(),
            counts: vec![0; buckets.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;

        for (i, &bucket) in self.buckets.iter().enumerate() {
            if value <= bucket {
                self.counts[i] += 1;
            }
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let target = (self.count as f64 * p).ceil() as u64;
        self.buckets
            .iter()
            .zip(&self.counts)
            .find(|(_, count)| **count >= target)
            .map(|(&bucket, _)| bucket)
            .unwrap_or_else(|| self.buckets.last().copied().unwrap_or(0.0))
    }

    fn stats(&self) -> HistogramStats {
        HistogramStats {
            count: self.count,
            sum: self.sum,
            avg: if self.count > 0 {
                self.sum / self.count as f64
            } else {
                0.0
            },
            p50: self.percentile(0.50),
            p95: self.percentile(0.95),
            p99: self.percentile(0.99),
        }
    }
}

/// Render a metric name with its labels, e.g. `name{function=abc}`
fn metric_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }

    let mut sorted = labels.to_vec();
    sorted.sort_unstable();
    let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}{{{}}}", name, rendered.join(","))
}

/// Metrics collector
pub struct MetricsCollector {
    counters: Arc<DashMap<String, f64, RandomState>>,
    gauges: Arc<DashMap<String, f64, RandomState>>,
    histograms: Arc<DashMap<String, Histogram, RandomState>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::with_hasher(RandomState::new())),
            gauges: Arc::new(DashMap::with_hasher(RandomState::new())),
            histograms: Arc::new(DashMap::with_hasher(RandomState::new())),
            start_time: Instant::now(),
        }
    }

    pub fn inc_counter(&self, name: &str, value: f64) {
        self.inc_counter_with_labels(name, value, &[]);
    }

    pub fn inc_counter_with_labels(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.counters
            .entry(metric_key(name, labels))
            .and_modify(|v| *v += value)
            .or_insert(value);
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.set_gauge_with_labels(name, value, &[]);
    }

    pub fn set_gauge_with_labels(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.gauges.insert(metric_key(name, labels), value);
    }

    pub fn observe_histogram(&self, name: &str, value: f64) {
        self.histograms
            .entry(name.to_string())
            .and_modify(|hist| hist.observe(value))
            .or_insert_with(|| {
                let mut hist = Histogram::new(&DURATION_BUCKETS);
                hist.observe(value);
                hist
            });
    }

    /// Record an operation duration in seconds
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.observe_histogram(name, duration.as_secs_f64());
    }

    /// Counter value, if it was ever incremented
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.counters.get(&metric_key(name, labels)).map(|v| *v)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let gauges = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let histograms = self
            .histograms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();

        MetricsSnapshot {
            counters,
            gauges,
            histograms,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistogramStats {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSnapshot {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub counters: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub gauges: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub histograms: HashMap<String, HistogramStats>,
    pub uptime_secs: u64,
}

/// Records the elapsed time into a histogram when dropped
pub struct Timer {
    start: Instant,
    name: &'static str,
    collector: Arc<MetricsCollector>,
}

impl Timer {
    pub fn new(name: &'static str, collector: Arc<MetricsCollector>) -> Self {
        Self {
            start: Instant::now(),
            name,
            collector,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.collector
            .record_duration(self.name, self.start.elapsed());
    }
}
