//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use busuanzi_counter::config::{LegacyConfig, ReconcilerConfig};
use busuanzi_counter::engine::{CounterEngine, CounterEngineBuilder};
use busuanzi_counter::error::LegacyError;
use busuanzi_counter::legacy::{LegacyCounts, LegacyProvider};
use busuanzi_counter::observability::ServiceMetrics;
use busuanzi_counter::services::Reconciler;
use busuanzi_counter::store::MemoryStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Legacy provider with per-referer answers and call recording
#[derive(Default)]
pub struct FakeProvider {
    answers: Mutex<HashMap<String, LegacyCounts>>,
    fallback: Option<LegacyCounts>,
    notify_delay: Duration,
    notify_fails: bool,
    lookups: AtomicUsize,
    notify_calls: AtomicUsize,
    notified: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn answering(site_uv: u64, site_pv: u64, page_pv: u64) -> Self {
        Self {
            fallback: Some(LegacyCounts {
                site_uv,
                site_pv,
                page_pv,
            }),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_answer(self, referer: &str, page_pv: u64) -> Self {
        self.answers.lock().insert(
            referer.to_string(),
            LegacyCounts {
                page_pv,
                ..Default::default()
            },
        );
        self
    }

    pub fn with_slow_notify(mut self, delay: Duration) -> Self {
        self.notify_delay = delay;
        self
    }

    pub fn with_failing_notify(mut self) -> Self {
        self.notify_fails = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Every notify attempt, successful or not
    pub fn notify_calls(&self) -> usize {
        self.notify_calls.load(Ordering::SeqCst)
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().clone()
    }
}

#[async_trait]
impl LegacyProvider for FakeProvider {
    async fn lookup(&self, referer: &str) -> Result<LegacyCounts, LegacyError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let scripted = self.answers.lock().get(referer).copied();
        scripted
            .or(self.fallback)
            .ok_or_else(|| LegacyError::Transport("connection refused".to_string()))
    }

    async fn notify(&self, referer: &str) -> Result<(), LegacyError> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        if !self.notify_delay.is_zero() {
            tokio::time::sleep(self.notify_delay).await;
        }
        if self.notify_fails {
            return Err(LegacyError::Status(502));
        }
        self.notified.lock().push(referer.to_string());
        Ok(())
    }
}

/// Legacy settings with retries but no backoff
pub fn fast_legacy() -> LegacyConfig {
    LegacyConfig {
        retry_backoff_ms: 0,
        ..Default::default()
    }
}

/// Engine over `store` and `provider` with no reconciler attached
pub fn engine(store: Arc<MemoryStore>, provider: Arc<FakeProvider>) -> CounterEngine {
    CounterEngineBuilder::new()
        .with_store(store)
        .with_provider(provider)
        .with_legacy_config(fast_legacy())
        .build()
        .expect("engine builds")
}

/// Engine with a running reconciler
pub struct Harness {
    pub engine: CounterEngine,
    pub metrics: Arc<ServiceMetrics>,
    pub shutdown: broadcast::Sender<()>,
    pub reconciler: JoinHandle<()>,
}

pub fn harness(
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    reconciler: ReconcilerConfig,
) -> Harness {
    let metrics = Arc::new(ServiceMetrics::new());
    let (worker, handle) = Reconciler::new(provider.clone(), reconciler, Arc::clone(&metrics));
    let (shutdown, rx) = broadcast::channel(1);
    let task = tokio::spawn(worker.run(rx));

    let engine = CounterEngineBuilder::new()
        .with_store(store)
        .with_provider(provider)
        .with_legacy_config(fast_legacy())
        .with_metrics(Arc::clone(&metrics))
        .with_reconciler(handle)
        .build()
        .expect("engine builds");

    Harness {
        engine,
        metrics,
        shutdown,
        reconciler: task,
    }
}
