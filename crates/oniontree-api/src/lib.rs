//! oniontree-api: REST API for a running scan.
//!
//! Exposes the cache query surface and the metrics snapshot. Both are
//! read while the pipeline keeps updating them.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/services` | List cached service IDs |
//! | GET | `/api/v1/services/{id}/addresses` | Every URL with its status |
//! | GET | `/api/v1/services/{id}/online` | Online URLs only |
//! | GET | `/api/v1/lookup?url=...` | Service owning a URL |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use oniontree_evtcache::Cache;
use oniontree_evtmetrics::Metrics;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<Cache>,
    pub metrics: Arc<Metrics>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(cache: Arc<Cache>, metrics: Arc<Metrics>) -> Router {
    let state = ApiState { cache, metrics };

    let api_routes = Router::new()
        .route("/services", get(handlers::list_services))
        .route("/services/{id}/addresses", get(handlers::get_addresses))
        .route("/services/{id}/online", get(handlers::get_online_addresses))
        .route("/lookup", get(handlers::lookup_url))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
