//! Web server module.
//!
//! Serves the scrape endpoint and the health probes. Handlers only ever read
//! registry snapshots and health state. No collection work happens in the
//! request path, so scrape latency is independent of warehouse latency and a
//! broken warehouse can never turn into a 5xx here.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::health::{CollectorStatus, HealthState};
use crate::registry::{MetricRegistry, EXPOSITION_CONTENT_TYPE};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub health: Arc<HealthState>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    collectors: Option<HashMap<String, CollectorStatus>>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Scrape endpoint: render the current registry snapshot.
///
/// Always 200. During sustained collector failure this serves the
/// last-known-good values, or an empty body before any collector succeeds.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.registry.snapshot();
    tracing::trace!(samples = snapshot.sample_count(), "Serving scrape");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        snapshot.render(),
    )
        .into_response()
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        collectors: None,
    })
}

/// Readiness probe: 200 once at least one collector has succeeded.
///
/// Collector failures after that point do not flip readiness back off,
/// because stale data remains servable.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    let collectors = state.health.collector_statuses();
    if state.health.is_ready() {
        Json(HealthResponse {
            status: "ok".to_string(),
            collectors: Some(collectors),
        })
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
                collectors: Some(collectors),
            }),
        )
            .into_response()
    }
}
