//! Live counters owned by this service

use std::time::Duration;

use crate::error::StoreResult;
use crate::store::SharedStore;
use crate::types::{keys, PageKey};

/// Increments local PV counters and the site UV set.
///
/// Each write also refreshes the expiry of the counter and of the paired
/// before-count cache key, so both age out together.
pub struct LiveCounter {
    store: SharedStore,
    ttl: Duration,
}

impl LiveCounter {
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Count one view for the site; returns the new local total
    pub async fn increment_site_pv(&self, host: &str) -> StoreResult<u64> {
        let key = keys::site_pv(host);
        let count = self.store.incr(&key).await?;
        self.refresh(&key, &keys::site_pv_cache(host)).await?;
        Ok(as_count(count))
    }

    /// Count one view for the page; returns the new local total
    pub async fn increment_page_pv(&self, page: &PageKey) -> StoreResult<u64> {
        let key = keys::page_pv(page);
        let count = self.store.incr(&key).await?;
        self.refresh(&key, &keys::page_pv_cache(page)).await?;
        Ok(as_count(count))
    }

    /// Record `client_ip` as a site visitor; returns the distinct visitors
    pub async fn increment_site_uv(&self, host: &str, client_ip: &str) -> StoreResult<u64> {
        let key = keys::site_uv(host);
        self.store.sadd(&key, client_ip).await?;
        let visitors = self.store.scard(&key).await?;
        self.refresh(&key, &keys::site_uv_cache(host)).await?;
        Ok(visitors)
    }

    /// Current local site views, without counting
    pub async fn site_pv(&self, host: &str) -> StoreResult<u64> {
        Ok(self.store.get(&keys::site_pv(host)).await?.map_or(0, as_count))
    }

    /// Current local page views, without counting
    pub async fn page_pv(&self, page: &PageKey) -> StoreResult<u64> {
        Ok(self.store.get(&keys::page_pv(page)).await?.map_or(0, as_count))
    }

    /// Current distinct visitors, without recording one
    pub async fn site_uv(&self, host: &str) -> StoreResult<u64> {
        self.store.scard(&keys::site_uv(host)).await
    }

    async fn refresh(&self, counter: &str, cache: &str) -> StoreResult<()> {
        let (counter, cache) = tokio::join!(
            self.store.expire(counter, self.ttl),
            self.store.expire(cache, self.ttl),
        );
        counter?;
        cache?;
        Ok(())
    }
}

fn as_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
