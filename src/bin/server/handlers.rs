//! HTTP Handlers for the counter gateway
//!
//! Handlers turn requests into a [`PageKey`] and a client address, hand them
//! to the engine and format the reply. Counting runs in a spawned task so a
//! client that disconnects mid-request cannot cancel half-applied
//! increments.

use super::types::*;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, REFERER},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    Json,
};
use busuanzi_counter::{
    config::ServerSettings,
    engine::CounterEngine,
    error::{Error, Result},
    legacy::JsonpEnvelope,
    observability::PrometheusExporter,
    services::HealthChecker,
    PageKey, Totals,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Landing page served to visitors that open the service directly
pub const LANDING_PAGE: &str = include_str!("../../../statics/home.html");

/// Browser script that reports the page and fills in the counters
pub const CLIENT_SCRIPT: &str = include_str!("../../../statics/js/client.js");

/// Longest accepted JSONP callback name
const MAX_CALLBACK_LEN: usize = 128;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
pub struct AppState {
    pub engine: Arc<CounterEngine>,
    pub health: HealthChecker,
    pub exporter: PrometheusExporter,
    pub settings: ServerSettings,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Address of the visitor: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Callback name if it is a dotted JavaScript identifier path, otherwise
/// the empty callback
pub fn sanitize_callback(callback: Option<&str>) -> &str {
    let Some(callback) = callback else {
        return "";
    };
    if callback.len() > MAX_CALLBACK_LEN {
        return "";
    }

    let valid = callback.split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    });

    if valid {
        callback
    } else {
        ""
    }
}

/// Run the counting path on its own task and wait for it
async fn count_detached(
    engine: Arc<CounterEngine>,
    page: PageKey,
    client_ip: String,
) -> Result<Totals> {
    tokio::spawn(async move { engine.compute_totals(&page, &client_ip).await })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}

// =============================================================================
// Counting Handlers
// =============================================================================

/// `GET /`: JSONP totals for the page named by `Referer`, or the landing
/// page when there is none
pub async fn counter_script(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScriptParams>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) else {
        return Html(LANDING_PAGE).into_response();
    };

    let page = match PageKey::from_url(referer) {
        Ok(page) => page,
        Err(e) => {
            warn!(referer = %referer, error = %e, "Unusable referer, serving landing page");
            return Html(LANDING_PAGE).into_response();
        }
    };

    let client_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    debug!(page = %page, client_ip = %client_ip, "Script request");

    match count_detached(Arc::clone(&state.engine), page, client_ip).await {
        Ok(totals) => {
            let payload = ScriptPayload::new(totals, state.settings.response_version);
            let json = match serde_json::to_string(&payload) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to encode totals");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };
            let callback = sanitize_callback(params.callback.as_deref());
            let body = JsonpEnvelope::new(callback).wrap(&json);
            (
                [
                    (CONTENT_TYPE, "application/javascript"),
                    (CACHE_CONTROL, "no-store"),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, referer = %referer, "Counting failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /log`: count a page view reported by the client script
pub async fn log_visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<LogRequest>,
) -> Response {
    let Some(url) = req.url.filter(|u| !u.is_empty()) else {
        warn!("Beacon without url");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing url",
            }),
        )
            .into_response();
    };

    let page = match PageKey::from_url(&url) {
        Ok(page) => page,
        Err(rejection) => {
            warn!(url = %url, error = %rejection, "Rejected beacon url");
            return Json(LogResponse {
                totals: Totals::default(),
                message: Some(rejection.message()),
            })
            .into_response();
        }
    };

    let client_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    match count_detached(Arc::clone(&state.engine), page, client_ip).await {
        Ok(totals) => Json(LogResponse {
            totals,
            message: None,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, url = %url, "Counting failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal Server Error",
                }),
            )
                .into_response()
        }
    }
}

/// `GET /api/v2/log?url=`: current totals without counting
pub async fn lookup_totals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Response {
    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<Totals>::error("Missing url parameter", 400)),
        )
            .into_response();
    };

    let page = match PageKey::from_url(&url) {
        Ok(page) => page,
        Err(rejection) => {
            warn!(url = %url, error = %rejection, "Rejected lookup url");
            return Json(ApiResponse::success(Totals::default(), rejection.message()))
                .into_response();
        }
    };

    match state.engine.peek_totals(&page).await {
        Ok(totals) => {
            Json(ApiResponse::success(totals, "Data retrieved successfully")).into_response()
        }
        Err(e) => {
            error!(error = %e, url = %url, "Lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Totals>::error("Internal server error", 500)),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Static & Admin Handlers
// =============================================================================

/// `GET /js`: client script
pub async fn client_script() -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (CACHE_CONTROL, "public, max-age=3600"),
        ],
        CLIENT_SCRIPT,
    )
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.check().await;
    let status = if report.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            version: env!("CARGO_PKG_VERSION"),
            report,
        }),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (body, content_type) = state.exporter.export_http();
    ([(CONTENT_TYPE, content_type)], body)
}

// =============================================================================
// Tests
// =============================================================================
