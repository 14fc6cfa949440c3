//! Background Services Module
//!
//! # Services
//!
//! - **Reconciler**: delivers queued hit notifications to the legacy
//!   provider after a short delay, draining on shutdown
//! - **HealthChecker**: store and reconciler checks behind `/health`
//!
//! # Example
//!
//! ```rust,ignore
//! use busuanzi_counter::services::Reconciler;
//!
//! let (worker, handle) = Reconciler::new(provider, config.reconciler.clone(), metrics);
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let task = tokio::spawn(worker.run(shutdown_rx));
//!
//! // Request path
//! handle.notify(&page);
//!
//! // Graceful shutdown
//! shutdown_tx.send(())?;
//! task.await?;
//! ```

pub mod health;
pub mod reconciler;

pub use health::{CheckResult, HealthChecker, HealthReport, HealthStatus};
pub use reconciler::{Reconciler, ReconcilerHandle};
