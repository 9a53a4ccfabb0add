//! REST API handlers.
//!
//! Handlers only read from the cache and metrics stages; every response
//! is JSON except `/metrics`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn service_not_found() -> axum::response::Response {
    error_response("service not found", StatusCode::NOT_FOUND).into_response()
}

// ── Services ───────────────────────────────────────────────────

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.cache.service_ids())
}

/// GET /api/v1/services/{id}/addresses
pub async fn get_addresses(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.cache.get_addresses(&id) {
        Some(addresses) => ApiResponse::ok(addresses).into_response(),
        None => service_not_found(),
    }
}

/// GET /api/v1/services/{id}/online
pub async fn get_online_addresses(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.cache.get_online_addresses(&id) {
        Some(urls) => ApiResponse::ok(urls).into_response(),
        None => service_not_found(),
    }
}

// ── Lookup ─────────────────────────────────────────────────────

/// Query string of the lookup endpoint.
#[derive(Deserialize)]
pub struct LookupQuery {
    pub url: String,
}

#[derive(Serialize)]
struct LookupResult {
    url: String,
    service_id: String,
}

/// GET /api/v1/lookup?url=...
pub async fn lookup_url(
    State(state): State<ApiState>,
    Query(query): Query<LookupQuery>,
) -> impl IntoResponse {
    match state.cache.get_service_id(&query.url) {
        Some(service_id) => ApiResponse::ok(LookupResult {
            url: query.url,
            service_id,
        })
        .into_response(),
        None => error_response("url not found", StatusCode::NOT_FOUND).into_response(),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = oniontree_evtmetrics::render_prometheus(&state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
