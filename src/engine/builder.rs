//! Engine builder with pluggable store and provider

use super::before::{BeforeFetcher, FetchPolicy};
use super::live::LiveCounter;
use super::merge::CounterEngine;
use crate::config::{LegacyConfig, DEFAULT_TTL_SECS};
use crate::error::{Error, Result};
use crate::legacy::LegacyProvider;
use crate::observability::ServiceMetrics;
use crate::services::ReconcilerHandle;
use crate::store::SharedStore;
use std::sync::Arc;
use std::time::Duration;

/// Builder for wiring a [`CounterEngine`] from its collaborators
pub struct CounterEngineBuilder {
    store: Option<SharedStore>,
    provider: Option<Arc<dyn LegacyProvider>>,
    legacy: LegacyConfig,
    ttl: Duration,
    metrics: Option<Arc<ServiceMetrics>>,
    reconciler: Option<ReconcilerHandle>,
}

impl Default for CounterEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterEngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self {
            store: None,
            provider: None,
            legacy: LegacyConfig::default(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            metrics: None,
            reconciler: None,
        }
    }

    /// Set the counter store
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the legacy provider used for before-counts
    pub fn with_provider(mut self, provider: Arc<dyn LegacyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set retry policy and the legacy kill switch
    pub fn with_legacy_config(mut self, legacy: LegacyConfig) -> Self {
        self.legacy = legacy;
        self
    }

    /// Set the expiry applied to counters and cached before-counts
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Share an existing metrics sink (a fresh one is created otherwise)
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the reconciler queue for legacy hit notifications
    pub fn with_reconciler(mut self, reconciler: ReconcilerHandle) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Build the engine.
    ///
    /// A store is always required. A provider is required only while legacy
    /// lookups are enabled; when they are disabled any provider and
    /// reconciler are ignored.
    pub fn build(self) -> Result<CounterEngine> {
        let store = self
            .store
            .ok_or_else(|| Error::Configuration("No counter store configured".to_string()))?;

        if self.ttl.is_zero() {
            return Err(Error::Configuration("TTL must be non-zero".to_string()));
        }

        let (provider, reconciler) = if self.legacy.enabled {
            let provider = self.provider.ok_or_else(|| {
                Error::Configuration("No legacy provider configured".to_string())
            })?;
            (Some(provider), self.reconciler)
        } else {
            tracing::info!("Legacy provider disabled; before-counts come from cache only");
            (None, None)
        };

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(ServiceMetrics::new()));

        let before = BeforeFetcher::new(
            Arc::clone(&store),
            provider,
            FetchPolicy::new(&self.legacy, self.ttl),
            Arc::clone(&metrics),
        );
        let live = LiveCounter::new(store, self.ttl);

        Ok(CounterEngine {
            before,
            live,
            reconciler,
            metrics,
        })
    }
}
