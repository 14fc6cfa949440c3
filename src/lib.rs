//! # busuanzi-counter
//!
//! Page-view and unique-visitor counting that keeps its own counters in
//! Redis while seeding them from the legacy busuanzi service.
//!
//! ## Counting model
//!
//! Every reported total is `before + live`:
//! - **before**: the historical count the legacy provider reports for the
//!   site or page, fetched once and cached for the TTL window
//! - **live**: the count this service has accumulated itself (INCR for page
//!   views, a set of client IPs for unique visitors)
//!
//! Counted hits are echoed back to the legacy provider in the background so
//! both systems stay close while they run side by side.
//!
//! ## Layout
//!
//! - [`store`]: counter store trait with Redis and in-memory backends
//! - [`legacy`]: legacy provider client and JSONP envelope parsing
//! - [`engine`]: before-count fetcher, live counters and the merge
//! - [`services`]: background reconciler and health checks
//! - [`observability`]: service metrics and Prometheus export
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use busuanzi_counter::{engine::CounterEngineBuilder, store::MemoryStore, types::PageKey};
//!
//! let engine = CounterEngineBuilder::new()
//!     .with_store(Arc::new(MemoryStore::new()))
//!     .with_provider(provider)
//!     .build()?;
//!
//! let page = PageKey::from_url("https://example.com/blog/post")?;
//! let totals = engine.compute_totals(&page, "203.0.113.7").await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod observability;
pub mod services;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use types::{PageKey, Totals};
