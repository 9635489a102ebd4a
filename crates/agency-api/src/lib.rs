//! # agency-api -- HTTP Surface for the Agency Sales Backend
//!
//! | Prefix | Module | Domain |
//! |--------|--------|--------|
//! | `/v1/agencies/*`, `/v1/branches/*`, `/v1/packages` | [`routes::tenancy`] | Tenancy administration |
//! | `/v1/sales/*` | [`routes::sales`] | Sales, payment tokens, refunds |
//! | `/v1/payments/callback` | [`routes::payments`] | Gateway callbacks |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer -> metrics -> auth -> handler
//! ```
//!
//! Health checks, `/metrics` and the gateway callback are mounted outside
//! the auth middleware: health checks and scrapes need no credentials and the
//! callback carries its own hash.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Router};

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the router with a fresh metrics registry.
pub fn app(state: AppState) -> Result<Router, prometheus::Error> {
    Ok(app_with_metrics(state, ApiMetrics::new()?))
}

/// Assemble the router, counting into `metrics`.
pub fn app_with_metrics(state: AppState, metrics: ApiMetrics) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::tenancy::router())
        .merge(routes::sales::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let callbacks = routes::payments::router();

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    let scrape = Router::new()
        .route("/metrics", axum::routing::get(prometheus_metrics))
        .layer(Extension(metrics.clone()));

    Router::new()
        .merge(api)
        .merge(callbacks)
        .with_state(state)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(Extension(metrics))
        .layer(middleware::tracing_layer::layer())
        .merge(health)
        .merge(scrape)
}

async fn prometheus_metrics(Extension(metrics): Extension<ApiMetrics>) -> Response {
    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}
