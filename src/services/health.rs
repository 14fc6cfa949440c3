//! Health Check Service
//!
//! Checks run on demand from `/health`:
//! - Store connectivity (PING round trip)
//! - Reconciler liveness (queue still accepting hits)

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::services::ReconcilerHandle;
use crate::store::SharedStore;

// ============================================================================
// Health Status
// ============================================================================

/// Overall health status of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is fully healthy
    Healthy,

    /// Service is degraded but operational
    Degraded,

    /// Service is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if the status indicates the service is operational
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Check if the status indicates the service is fully healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

// ============================================================================
// Individual Check Results
// ============================================================================

/// Result of a single health check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Optional message with details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Duration of the check in milliseconds
    pub duration_ms: u64,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a failing check result
    pub fn fail(name: impl Into<String>, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

// ============================================================================
// Health Report
// ============================================================================

/// Complete health report with all check results
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall health status
    pub status: HealthStatus,

    /// Individual check results
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    /// Create a new health report from check results
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let failed_count = checks.iter().filter(|c| !c.passed).count();

        // 0 failures: Healthy; fewer than half: Degraded; otherwise Unhealthy
        let status = if failed_count == 0 {
            HealthStatus::Healthy
        } else if failed_count * 2 < checks.len() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        Self { status, checks }
    }

    /// Get all failed checks
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

// ============================================================================
// Health Checker
// ============================================================================

/// Runs health checks against the live collaborators
pub struct HealthChecker {
    store: SharedStore,
    reconciler: Option<ReconcilerHandle>,
    timeout: Duration,
}

impl HealthChecker {
    /// Create a checker for `store`
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            reconciler: None,
            timeout: Duration::from_secs(2),
        }
    }

    /// Also report on the reconciler queue
    pub fn with_reconciler(mut self, reconciler: Option<ReconcilerHandle>) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Bound on the store round trip
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run all checks and build a report
    pub async fn check(&self) -> HealthReport {
        let mut checks = vec![self.check_store().await];
        if let Some(reconciler) = &self.reconciler {
            checks.push(Self::check_reconciler(reconciler));
        }

        let report = HealthReport::from_checks(checks);
        if !report.status.is_healthy() {
            tracing::warn!(
                status = ?report.status,
                failed = report.failed_checks().len(),
                "Service health degraded"
            );
        }
        report
    }

    async fn check_store(&self) -> CheckResult {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => CheckResult::pass("store", start.elapsed()),
            Ok(Err(e)) => CheckResult::fail("store", e.to_string(), start.elapsed()),
            Err(_) => CheckResult::fail("store", "ping timed out", start.elapsed()),
        }
    }

    fn check_reconciler(reconciler: &ReconcilerHandle) -> CheckResult {
        let start = Instant::now();
        if reconciler.is_closed() {
            CheckResult::fail("reconciler", "worker stopped", start.elapsed())
        } else {
            CheckResult::pass("reconciler", start.elapsed())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcilerConfig;
    use crate::legacy::testing::ScriptedProvider;
    use crate::observability::ServiceMetrics;
    use crate::services::Reconciler;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Healthy.is_operational());

        assert!(!HealthStatus::Degraded.is_healthy());
        assert!(HealthStatus::Degraded.is_operational());

        assert!(!HealthStatus::Unhealthy.is_healthy());
        assert!(!HealthStatus::Unhealthy.is_operational());
    }

    #[test]
    fn test_health_report_from_checks() {
        let checks = vec![
            CheckResult::pass("check1", Duration::from_millis(10)),
            CheckResult::pass("check2", Duration::from_millis(10)),
        ];
        assert_eq!(HealthReport::from_checks(checks).status, HealthStatus::Healthy);

        let checks = vec![
            CheckResult::pass("check1", Duration::from_millis(10)),
            CheckResult::pass("check2", Duration::from_millis(10)),
            CheckResult::fail("check3", "failed", Duration::from_millis(10)),
        ];
        let report = HealthReport::from_checks(checks);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.failed_checks().len(), 1);

        // Half failing counts as unhealthy
        let checks = vec![
            CheckResult::pass("store", Duration::ZERO),
            CheckResult::fail("reconciler", "worker stopped", Duration::ZERO),
        ];
        assert_eq!(HealthReport::from_checks(checks).status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_store_check_passes() {
        let checker = HealthChecker::new(Arc::new(MemoryStore::new()));
        let report = checker.check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_reconciler_fails_check() {
        let (worker, handle) = Reconciler::new(
            Arc::new(ScriptedProvider::failing()),
            ReconcilerConfig::default(),
            Arc::new(ServiceMetrics::new()),
        );
        drop(worker);

        let checker =
            HealthChecker::new(Arc::new(MemoryStore::new())).with_reconciler(Some(handle));
        let report = checker.check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.failed_checks()[0].name, "reconciler");
    }

    #[test]
    fn test_report_serializes() {
        let report = HealthReport::from_checks(vec![CheckResult::pass("store", Duration::ZERO)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"][0]["name"], "store");
        assert!(json["checks"][0].get("message").is_none());
    }
}
