//! Observability layer
//!
//! - **ServiceMetrics**: atomic counters for requests, cache behaviour,
//!   legacy provider traffic and reconciliation
//! - **PrometheusExporter**: text exposition for `/metrics`

pub mod metrics;
pub mod prometheus_exporter;

pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use prometheus_exporter::{PrometheusConfig, PrometheusExporter};
