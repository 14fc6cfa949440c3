//! busuanzi-counter HTTP Server
//!
//! Drop-in replacement for the busuanzi counter endpoint. Pages embed the
//! client script (or the legacy busuanzi script pointed at this host) and
//! receive merged page-view and visitor totals.
//!
//! # Endpoints
//!
//! ## Counting
//! - `GET /` - JSONP totals for the page in `Referer` (landing page without one)
//! - `POST /log` - Count the page in `{"url": ...}` and return JSON totals
//!
//! ## Lookup
//! - `GET /api/v2/log?url=` - Current totals without counting
//! - `GET /js` - Client script
//!
//! ## Admin
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `BUSUANZI_CONFIG` environment variable (path to TOML file)
//! 2. `./busuanzi.toml` in current directory
//! 3. Default configuration
//!
//! `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`, `REDIS_TLS` and
//! `LISTEN_ADDR` override the file.
//!
//! # Example
//!
//! ```bash
//! REDIS_HOST=cache.internal REDIS_PASSWORD=secret ./server
//!
//! curl -H "Referer: https://example.com/blog/post" \
//!   "http://localhost:8080/?jsonpCallback=BusuanziCallback_777487655111"
//!
//! curl -X POST http://localhost:8080/log \
//!   -H "Content-Type: application/json" \
//!   -d '{"url": "https://example.com/blog/post"}'
//! ```

mod handlers;
mod types;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use busuanzi_counter::{
    config::AppConfig,
    engine::CounterEngineBuilder,
    legacy::{HttpLegacyProvider, LegacyProvider},
    observability::{PrometheusConfig, PrometheusExporter, ServiceMetrics},
    services::{HealthChecker, Reconciler},
    store,
};
use handlers::AppState;
use std::{net::SocketAddr, sync::Arc};
use tokio::{signal, sync::broadcast};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// =============================================================================
// Server Initialization
// =============================================================================

/// Build the router with all endpoints
fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // Counting
        .route("/", get(handlers::counter_script))
        .route("/log", post(handlers::log_visit))
        // Lookup and assets
        .route("/api/v2/log", get(handlers::lookup_totals))
        .route("/js", get(handlers::client_script))
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("busuanzi_counter=info".parse()?)
                .add_directive("server=info".parse()?),
        )
        .init();

    info!("busuanzi-counter starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load()?;
    info!("Listen address: {}", config.server.listen_addr);
    info!(
        host = %config.store.host,
        port = config.store.port,
        db = config.store.db,
        tls = config.store.tls,
        "Counter store"
    );

    // Shared collaborators
    let metrics = Arc::new(ServiceMetrics::new());
    let counter_store = store::connect(&config.store).await?;
    let provider: Arc<dyn LegacyProvider> = Arc::new(HttpLegacyProvider::new(&config.legacy)?);

    // Background reconciler
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (reconciler, reconciler_task) = if config.legacy.enabled {
        let (worker, handle) = Reconciler::new(
            Arc::clone(&provider),
            config.reconciler.clone(),
            Arc::clone(&metrics),
        );
        (Some(handle), Some(tokio::spawn(worker.run(shutdown_rx))))
    } else {
        info!("Legacy provider disabled; reconciliation off");
        (None, None)
    };

    // Engine
    let mut builder = CounterEngineBuilder::new()
        .with_store(Arc::clone(&counter_store))
        .with_provider(provider)
        .with_legacy_config(config.legacy.clone())
        .with_ttl(config.store.ttl())
        .with_metrics(Arc::clone(&metrics));
    if let Some(handle) = reconciler.clone() {
        builder = builder.with_reconciler(handle);
    }
    let engine = Arc::new(builder.build()?);

    // Create application state
    let state = Arc::new(AppState {
        engine,
        health: HealthChecker::new(counter_store)
            .with_reconciler(reconciler)
            .with_timeout(config.store.command_timeout()),
        exporter: PrometheusExporter::new(PrometheusConfig::default(), metrics),
        settings: config.server.clone(),
    });

    let app = build_router(state);

    // Parse listen address
    let addr: SocketAddr = config.server.listen_addr.parse()?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain pending legacy notifications
    let _ = shutdown_tx.send(());
    if let Some(task) = reconciler_task {
        if let Err(e) = task.await {
            error!(error = %e, "Reconciler task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
