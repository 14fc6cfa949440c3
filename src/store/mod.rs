//! Counter store abstraction
//!
//! Every count the service reports lives in a shared key-value store with
//! per-key expiry. The store's increment and set-add operations are atomic,
//! so the service itself keeps no shared mutable counter state.
//!
//! # Backends
//!
//! - [`RedisStore`]: managed Redis over TLS, pooled connections
//! - [`MemoryStore`]: process-local map with lazy expiry, for tests and
//!   local development

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreResult;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Key-value operations the counters are built from.
///
/// Reading a key that does not exist is never an error: `get` returns
/// `None` and `scard` returns 0.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read an integer value
    async fn get(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Overwrite an integer value and set its expiry
    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()>;

    /// Atomically increment an integer value, creating it at 0, and return
    /// the new value
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Add a member to a set; `true` when it was not already present
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Number of members in a set
    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// Reset a key's expiry; `false` when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Round-trip check used by the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}

/// Shared handle to a counter store
pub type SharedStore = Arc<dyn CounterStore>;

/// Build the configured backend, connecting if needed.
pub async fn connect(config: &StoreConfig) -> StoreResult<SharedStore> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(config).await?)),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory counter store; counts are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
