//! HTTP API server for the blood bank backend.
//!
//! Provides REST endpoints for blood requests, inventory and admin
//! fulfillment, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use blood_store::BloodBankStore;
use fulfillment::FulfillmentCoordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::SessionRegistry;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// Every route except the banner, `/health` and `/metrics` requires a
/// session; `/admin/*` additionally requires the `Admin` role.
pub fn create_app<S: BloodBankStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    let admin = Router::new()
        .route("/admin/fulfill/{id}", post(routes::fulfill::fulfill::<S>))
        .route("/admin/requests", get(routes::requests::list_all::<S>))
        .route("/admin/requests/{id}", delete(routes::requests::delete::<S>))
        .route("/admin/inventory", post(routes::inventory::update::<S>))
        .route("/admin/stats", get(routes::stats::get::<S>))
        .route_layer(middleware::from_fn(auth::require_admin));

    let authenticated = Router::new()
        .route(
            "/requests",
            get(routes::requests::list::<S>).post(routes::requests::create::<S>),
        )
        .route("/inventory", get(routes::inventory::list::<S>))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(routes::system::banner))
        .route("/health", get(routes::system::health::<S>))
        .merge(authenticated)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store with an empty session registry.
pub fn create_default_state<S: BloodBankStore + 'static>(
    store: S,
    low_stock_threshold: u32,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        coordinator: FulfillmentCoordinator::new(store),
        sessions: SessionRegistry::new(),
        low_stock_threshold,
    })
}
