//! Before-count resolution
//!
//! Historical counts come from the legacy provider and are written through
//! to the counter store, so each host/page is looked up at most once per
//! TTL window. A failed lookup caches zero; that zero is a cache hit like
//! any other value.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::LegacyConfig;
use crate::error::StoreResult;
use crate::legacy::{LegacyCounts, LegacyProvider};
use crate::observability::ServiceMetrics;
use crate::store::SharedStore;
use crate::types::{keys, PageKey};

/// Which field of a legacy response a lookup is after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    SiteUv,
    SitePv,
    PagePv,
}

impl Metric {
    fn pick(self, counts: &LegacyCounts) -> u64 {
        match self {
            Metric::SiteUv => counts.site_uv,
            Metric::SitePv => counts.site_pv,
            Metric::PagePv => counts.page_pv,
        }
    }
}

/// Retry and caching parameters for legacy lookups
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Attempts per lookup, including the first
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    pub retry_backoff: Duration,
    /// Expiry of cached before-counts
    pub ttl: Duration,
}

impl FetchPolicy {
    /// Policy from legacy settings and the store TTL
    pub fn new(legacy: &LegacyConfig, ttl: Duration) -> Self {
        Self {
            max_attempts: legacy.max_attempts.max(1),
            retry_backoff: legacy.retry_backoff(),
            ttl,
        }
    }
}

/// Resolves before-counts, consulting the store cache first.
///
/// With no provider attached (legacy lookups switched off) a cache miss
/// resolves to 0 and nothing is written.
pub struct BeforeFetcher {
    store: SharedStore,
    provider: Option<Arc<dyn LegacyProvider>>,
    policy: FetchPolicy,
    metrics: Arc<ServiceMetrics>,
}

impl BeforeFetcher {
    pub fn new(
        store: SharedStore,
        provider: Option<Arc<dyn LegacyProvider>>,
        policy: FetchPolicy,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            store,
            provider,
            policy,
            metrics,
        }
    }

    /// Historical unique visitors for `host`
    pub async fn fetch_site_uv(&self, host: &str) -> StoreResult<u64> {
        let key = keys::site_uv_cache(host);
        self.fetch_site(&key, host, Metric::SiteUv).await
    }

    /// Historical page views for `host`
    pub async fn fetch_site_pv(&self, host: &str) -> StoreResult<u64> {
        let key = keys::site_pv_cache(host);
        self.fetch_site(&key, host, Metric::SitePv).await
    }

    /// Historical page views for one page.
    ///
    /// The provider may track the page with or without a trailing slash, so
    /// both spellings are looked up concurrently and the larger successful
    /// answer wins.
    pub async fn fetch_page_pv(&self, page: &PageKey) -> StoreResult<u64> {
        let key = keys::page_pv_cache(page);
        if let Some(value) = self.cached(&key).await? {
            return Ok(value);
        }
        let Some(provider) = &self.provider else {
            return Ok(0);
        };

        let bare = page.page_referer();
        let slashed = page.page_referer_with_slash();
        let (bare, slashed) = tokio::join!(
            self.lookup_with_retry(provider.as_ref(), &bare, Metric::PagePv),
            self.lookup_with_retry(provider.as_ref(), &slashed, Metric::PagePv),
        );

        let value = match (bare, slashed) {
            (Some(a), Some(b)) => a.max(b),
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => {
                self.metrics.record_legacy_fallback();
                warn!(page = %page, "Legacy page lookups exhausted, caching zero");
                0
            }
        };

        self.write_through(&key, value).await?;
        Ok(value)
    }

    async fn fetch_site(&self, key: &str, host: &str, metric: Metric) -> StoreResult<u64> {
        if let Some(value) = self.cached(key).await? {
            return Ok(value);
        }
        let Some(provider) = &self.provider else {
            return Ok(0);
        };

        let referer = format!("https://{}/", host);
        let value = match self.lookup_with_retry(provider.as_ref(), &referer, metric).await {
            Some(value) => value,
            None => {
                self.metrics.record_legacy_fallback();
                warn!(host = %host, ?metric, "Legacy site lookups exhausted, caching zero");
                0
            }
        };

        self.write_through(key, value).await?;
        Ok(value)
    }

    async fn cached(&self, key: &str) -> StoreResult<Option<u64>> {
        match self.store.get(key).await? {
            Some(value) => {
                self.metrics.record_cache_hit();
                debug!(key = %key, value, "Before-count cache hit");
                Ok(Some(u64::try_from(value).unwrap_or(0)))
            }
            None => {
                self.metrics.record_cache_miss();
                debug!(key = %key, "Before-count cache miss");
                Ok(None)
            }
        }
    }

    async fn write_through(&self, key: &str, value: u64) -> StoreResult<()> {
        let stored = i64::try_from(value).unwrap_or(i64::MAX);
        self.store.set_with_ttl(key, stored, self.policy.ttl).await
    }

    /// Up to `max_attempts` lookups; `None` once every attempt has failed
    async fn lookup_with_retry(
        &self,
        provider: &dyn LegacyProvider,
        referer: &str,
        metric: Metric,
    ) -> Option<u64> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            self.metrics.record_legacy_attempt();
            match provider.lookup(referer).await {
                Ok(counts) => return Some(metric.pick(&counts)),
                Err(e) => {
                    self.metrics.record_legacy_failure();
                    warn!(
                        referer = %referer,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Legacy lookup failed"
                    );
                    if attempt < max_attempts && !self.policy.retry_backoff.is_zero() {
                        tokio::time::sleep(self.policy.retry_backoff).await;
                    }
                }
            }
        }

        None
    }
}
