//! Prometheus metrics exporter
//!
//! Formats service counters in Prometheus text exposition format, followed
//! by anything registered in the global `prometheus` registry.

use std::fmt::Write;
use std::sync::Arc;

use prometheus::{Encoder, TextEncoder};

use super::metrics::{MetricsSnapshot, ServiceMetrics};

/// Configuration for Prometheus exporter
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Prefix for all metric names (default: "busuanzi")
    pub metric_prefix: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "busuanzi".to_string(),
        }
    }
}

/// Prometheus metrics exporter
pub struct PrometheusExporter {
    config: PrometheusConfig,
    metrics: Arc<ServiceMetrics>,
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter
    pub fn new(config: PrometheusConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self { config, metrics }
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let mut output = String::new();
        let snapshot = self.metrics.snapshot();

        self.export_service_metrics(&mut output, &self.config.metric_prefix, &snapshot);

        if let Ok(global_metrics) = self.export_global_metrics() {
            output.push_str(&global_metrics);
        }

        output
    }

    fn export_service_metrics(&self, output: &mut String, prefix: &str, snapshot: &MetricsSnapshot) {
        let counters = [
            ("requests_total", "Page views counted", snapshot.requests),
            ("lookups_total", "Read-only totals lookups", snapshot.lookups),
            (
                "store_errors_total",
                "Requests failed by counter store errors",
                snapshot.store_errors,
            ),
            (
                "cache_hits_total",
                "Before-counts served from the store cache",
                snapshot.cache_hits,
            ),
            (
                "cache_misses_total",
                "Before-counts resolved from the legacy provider",
                snapshot.cache_misses,
            ),
            (
                "legacy_attempts_total",
                "Requests sent to the legacy provider for lookups",
                snapshot.legacy_attempts,
            ),
            (
                "legacy_failures_total",
                "Failed legacy provider lookups",
                snapshot.legacy_failures,
            ),
            (
                "legacy_fallbacks_total",
                "Lookups that exhausted retries and cached zero",
                snapshot.legacy_fallbacks,
            ),
            (
                "reconcile_queued_total",
                "Hit notifications queued for the legacy provider",
                snapshot.reconcile_queued,
            ),
            (
                "reconcile_sent_total",
                "Hit notifications delivered",
                snapshot.reconcile_sent,
            ),
            (
                "reconcile_failed_total",
                "Hit notifications that failed",
                snapshot.reconcile_failed,
            ),
            (
                "reconcile_dropped_total",
                "Hit notifications discarded",
                snapshot.reconcile_dropped,
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {}_{} {}", prefix, name, help);
            let _ = writeln!(output, "# TYPE {}_{} counter", prefix, name);
            let _ = writeln!(output, "{}_{} {}\n", prefix, name, value);
        }

        let _ = writeln!(
            output,
            "# HELP {}_cache_hit_rate Share of before-counts served from cache (0.0-1.0)",
            prefix
        );
        let _ = writeln!(output, "# TYPE {}_cache_hit_rate gauge", prefix);
        let _ = writeln!(
            output,
            "{}_cache_hit_rate {:.4}\n",
            prefix,
            snapshot.cache_hit_rate()
        );

        let _ = writeln!(output, "# HELP {}_uptime_seconds Service uptime in seconds", prefix);
        let _ = writeln!(output, "# TYPE {}_uptime_seconds gauge", prefix);
        let _ = writeln!(
            output,
            "{}_uptime_seconds {}\n",
            prefix,
            snapshot.uptime.as_secs()
        );
    }

    /// Export global metrics from prometheus crate registry
    fn export_global_metrics(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("Failed to encode metrics: {}", e))?;

        String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
    }

    /// Export metrics as HTTP response body with correct content type
    pub fn export_http(&self) -> (String, &'static str) {
        let body = self.export();
        let content_type = "text/plain; version=0.0.4; charset=utf-8";
        (body, content_type)
    }
}
