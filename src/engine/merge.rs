//! Merge engine: before-counts plus live counts

use std::sync::Arc;

use tracing::{debug, error};

use super::before::BeforeFetcher;
use super::live::LiveCounter;
use crate::error::{Result, StoreResult};
use crate::observability::ServiceMetrics;
use crate::services::ReconcilerHandle;
use crate::types::{PageKey, Totals};

/// Produces the totals reported for a page view.
///
/// Cheap to share behind an `Arc`; every piece of mutable state lives in the
/// counter store.
pub struct CounterEngine {
    pub(super) before: BeforeFetcher,
    pub(super) live: LiveCounter,
    pub(super) reconciler: Option<ReconcilerHandle>,
    pub(super) metrics: Arc<ServiceMetrics>,
}

impl CounterEngine {
    /// Count one view of `page` by `client_ip` and return the merged totals.
    ///
    /// The three before-count lookups and the three increments run
    /// concurrently and all six complete before merging, even when one of
    /// them fails. A hit notification for the legacy provider is queued
    /// afterwards without waiting on it.
    pub async fn compute_totals(&self, page: &PageKey, client_ip: &str) -> Result<Totals> {
        let host = page.host();

        let (before_uv, before_pv, before_page, live_uv, live_pv, live_page) = tokio::join!(
            self.before.fetch_site_uv(host),
            self.before.fetch_site_pv(host),
            self.before.fetch_page_pv(page),
            self.live.increment_site_uv(host, client_ip),
            self.live.increment_site_pv(host),
            self.live.increment_page_pv(page),
        );

        let merged = triple(before_uv, before_pv, before_page).and_then(|before| {
            triple(live_uv, live_pv, live_page).map(|live| Totals::merge(before, live))
        });
        let totals = match merged {
            Ok(totals) => totals,
            Err(e) => {
                self.metrics.record_store_error();
                error!(page = %page, error = %e, "Counter store failed while counting");
                return Err(e.into());
            }
        };

        self.metrics.record_request();
        if let Some(reconciler) = &self.reconciler {
            reconciler.notify(page);
        }

        debug!(page = %page, ?totals, "Counted page view");
        Ok(totals)
    }

    /// Totals for `page` as they stand, without counting a view or
    /// notifying the legacy provider.
    ///
    /// Before-counts still resolve through the cache, so a first lookup may
    /// populate it.
    pub async fn peek_totals(&self, page: &PageKey) -> Result<Totals> {
        let host = page.host();

        let (before_uv, before_pv, before_page, live_uv, live_pv, live_page) = tokio::join!(
            self.before.fetch_site_uv(host),
            self.before.fetch_site_pv(host),
            self.before.fetch_page_pv(page),
            self.live.site_uv(host),
            self.live.site_pv(host),
            self.live.page_pv(page),
        );

        let totals = triple(before_uv, before_pv, before_page)
            .and_then(|before| {
                triple(live_uv, live_pv, live_page).map(|live| Totals::merge(before, live))
            })
            .inspect_err(|e| {
                self.metrics.record_store_error();
                error!(page = %page, error = %e, "Counter store failed during lookup");
            })?;

        self.metrics.record_lookup();
        Ok(totals)
    }

    /// Shared metrics sink
    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Reconciler feeding the legacy provider, if attached
    pub fn reconciler(&self) -> Option<&ReconcilerHandle> {
        self.reconciler.as_ref()
    }
}

/// Collect one metric triple, failing on the first store error
fn triple(
    site_uv: StoreResult<u64>,
    site_pv: StoreResult<u64>,
    page_pv: StoreResult<u64>,
) -> StoreResult<Totals> {
    Ok(Totals {
        site_uv: site_uv?,
        site_pv: site_pv?,
        page_pv: page_pv?,
    })
}
