//! Banner, health and Prometheus endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use blood_store::BloodBankStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct BannerResponse {
    pub message: &'static str,
    pub endpoints: &'static [&'static str],
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET / returns the service banner.
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Blood Bank Management API is running",
        endpoints: &[
            "/requests",
            "/inventory",
            "/admin/requests",
            "/admin/fulfill/{id}",
            "/admin/inventory",
            "/admin/stats",
            "/health",
            "/metrics",
        ],
    })
}

/// GET /health probes the store; 503 if it cannot answer.
pub async fn health<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.store().list_inventory().await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded" }),
            )
        }
    }
}

/// GET /metrics returns Prometheus-formatted metrics.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
