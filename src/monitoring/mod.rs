/*!
 * Monitoring
 * Metrics and structured tracing for the head node
 */

pub mod metrics;
mod tracer;

pub use metrics::{HistogramStats, MetricsCollector, MetricsSnapshot, Timer};
pub use tracer::{init_tracing, span_batch, span_execution};
