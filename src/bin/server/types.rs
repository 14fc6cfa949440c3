//! Request and response types for the HTTP gateway

use busuanzi_counter::services::HealthReport;
use busuanzi_counter::Totals;
use serde::{Deserialize, Serialize};

// =============================================================================
// Requests
// =============================================================================

/// Query string of the script endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ScriptParams {
    /// JavaScript function the totals are passed to
    #[serde(rename = "jsonpCallback", default)]
    pub callback: Option<String>,
}

/// Body of a page-view beacon
#[derive(Debug, Deserialize)]
pub struct LogRequest {
    /// Full URL of the page being viewed
    #[serde(default)]
    pub url: Option<String>,
}

/// Query string of the read-only lookup
#[derive(Debug, Deserialize)]
pub struct LookupParams {
    /// Full URL of the page to look up
    #[serde(default)]
    pub url: Option<String>,
}

// =============================================================================
// Responses
// =============================================================================

/// JSON passed to the JSONP callback; field order is what legacy widgets
/// see
#[derive(Debug, Serialize)]
pub struct ScriptPayload {
    pub site_uv: u64,
    pub page_pv: u64,
    pub site_pv: u64,
    pub version: f64,
}

impl ScriptPayload {
    pub fn new(totals: Totals, version: f64) -> Self {
        Self {
            site_uv: totals.site_uv,
            page_pv: totals.page_pv,
            site_pv: totals.site_pv,
            version,
        }
    }
}

/// Beacon response: totals, plus a message when the URL was rejected
#[derive(Debug, Serialize)]
pub struct LogResponse {
    #[serde(flatten)]
    pub totals: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Envelope used by the versioned API
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: u16) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
            code: Some(code),
        }
    }
}

/// Error body for plain JSON endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub version: &'static str,
    #[serde(flatten)]
    pub report: HealthReport,
}
