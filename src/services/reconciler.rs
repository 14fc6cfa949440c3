//! Background Reconciler
//!
//! Every counted hit is echoed to the legacy provider so its numbers keep
//! moving while both systems run side by side. Delivery is best effort:
//! - Hits are queued on a bounded channel; a full queue drops the hit
//! - Each hit waits the configured delay, then one GET is sent
//! - Failures are counted and logged, never retried
//! - Shutdown drains in-flight hits up to a deadline, then abandons the rest

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ReconcilerConfig;
use crate::legacy::LegacyProvider;
use crate::observability::ServiceMetrics;
use crate::types::PageKey;

// ============================================================================
// Handle
// ============================================================================

/// One pending hit notification
#[derive(Debug, Clone)]
struct ReconcileJob {
    referer: String,
    queued_at: Instant,
}

/// Cheap, cloneable sender side of the reconciler queue
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcileJob>,
    metrics: Arc<ServiceMetrics>,
}

impl ReconcilerHandle {
    /// Queue a hit for `page` without waiting.
    ///
    /// Returns `false` when the hit was dropped (queue full or reconciler
    /// stopped).
    pub fn notify(&self, page: &PageKey) -> bool {
        let job = ReconcileJob {
            referer: page.page_referer(),
            queued_at: Instant::now(),
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                self.metrics.record_reconcile_queued();
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.metrics.record_reconcile_dropped(1);
                tracing::warn!(referer = %job.referer, "Reconcile queue full, dropping hit");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.metrics.record_reconcile_dropped(1);
                tracing::debug!(referer = %job.referer, "Reconciler stopped, dropping hit");
                false
            }
        }
    }

    /// Whether the worker has stopped accepting hits
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Hits waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Queue consumer delivering hits to the legacy provider
pub struct Reconciler {
    rx: mpsc::Receiver<ReconcileJob>,
    provider: Arc<dyn LegacyProvider>,
    config: ReconcilerConfig,
    metrics: Arc<ServiceMetrics>,
}

impl Reconciler {
    /// Create the worker and the handle used to feed it
    pub fn new(
        provider: Arc<dyn LegacyProvider>,
        config: ReconcilerConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> (Self, ReconcilerHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = ReconcilerHandle {
            tx,
            metrics: Arc::clone(&metrics),
        };
        let worker = Self {
            rx,
            provider,
            config,
            metrics,
        };
        (worker, handle)
    }

    /// Consume the queue until `shutdown` fires or every handle is dropped,
    /// then drain.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut in_flight = JoinSet::new();
        let max_in_flight = self.config.queue_capacity.max(1);

        tracing::info!(
            delay_ms = self.config.delay_ms,
            capacity = self.config.queue_capacity,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Reconciler received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Reconciler broadcast receiver lagged");
                        }
                    }
                }

                job = self.rx.recv(), if in_flight.len() < max_in_flight => {
                    match job {
                        Some(job) => {
                            in_flight.spawn(self.deliver(job));
                        }
                        None => {
                            tracing::info!("All reconciler handles dropped");
                            break;
                        }
                    }
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        self.drain(in_flight).await;
    }

    fn deliver(&self, job: ReconcileJob) -> impl std::future::Future<Output = ()> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let metrics = Arc::clone(&self.metrics);
        let not_before = job.queued_at + self.config.delay();

        async move {
            tokio::time::sleep_until(not_before).await;
            match provider.notify(&job.referer).await {
                Ok(()) => metrics.record_reconcile_sent(),
                Err(e) => {
                    metrics.record_reconcile_failed();
                    tracing::warn!(referer = %job.referer, error = %e, "Legacy hit notification failed");
                }
            }
        }
    }

    async fn drain(mut self, mut in_flight: JoinSet<()>) {
        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            in_flight.spawn(self.deliver(job));
        }

        let pending = in_flight.len();
        if pending == 0 {
            tracing::info!("Reconciler stopped");
            return;
        }

        tracing::info!(pending, "Draining reconciler");
        let drained = tokio::time::timeout(self.config.drain_timeout(), async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            let abandoned = in_flight.len();
            in_flight.abort_all();
            self.metrics.record_reconcile_dropped(abandoned as u64);
            tracing::warn!(abandoned, "Reconciler drain deadline passed, abandoning hits");
        } else {
            tracing::info!("Reconciler drained and stopped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
