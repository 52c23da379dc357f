//! HTTP API server with observability for the mall order and flash-sale core.
//!
//! Provides admin endpoints for flash-sale activities and buyer endpoints for
//! orders and flash-sale purchases, with structured logging (tracing),
//! Prometheus metrics and an audit trail for admin changes.

pub mod audit;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use cache::Cache;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/mall/flash-sale",
            post(routes::flash_sale::create::<S, C>).get(routes::flash_sale::list::<S, C>),
        )
        .route(
            "/mall/flash-sale/{id}",
            get(routes::flash_sale::get::<S, C>)
                .put(routes::flash_sale::update::<S, C>)
                .delete(routes::flash_sale::delete::<S, C>),
        )
        .route(
            "/mall/flash-sale/{id}/warmup",
            post(routes::flash_sale::warmup::<S, C>),
        )
        .route(
            "/mall/flash-sale/{id}/purchase",
            post(routes::flash_sale::purchase::<S, C>),
        )
        .route("/mall/orders", post(routes::orders::place::<S, C>))
        .route("/mall/orders/{id}", get(routes::orders::get::<S, C>))
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
