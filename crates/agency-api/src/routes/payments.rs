//! # Gateway Callback Endpoint
//!
//! The gateway POSTs a form (or, in test mode, GETs the same fields as
//! query parameters). Authenticity comes from the payload hash, so this
//! route sits outside the bearer-token middleware.
//!
//! A correctly signed callback is always answered `200 OK` with the body
//! `OK`, including duplicates and unknown orders; anything else makes the
//! gateway retry. A bad hash is 400 and nothing is changed.

use agency_gateway::{CallbackPayload, CALLBACK_ACK};
use agency_settlement::{CallbackOutcome, ServiceError};
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::routing::get;
use axum::{Extension, Router};
use chrono::Utc;

use crate::error::AppError;
use crate::extractors::{extract_form, extract_query};
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/payments/callback",
        get(callback_query).post(callback_form),
    )
}

fn outcome_label(result: &Result<CallbackOutcome, ServiceError>) -> &'static str {
    match result {
        Ok(CallbackOutcome::Completed { .. }) => "completed",
        Ok(CallbackOutcome::Failed { .. }) => "failed",
        Ok(CallbackOutcome::AlreadySettled { .. }) => "duplicate",
        Ok(CallbackOutcome::UnknownOrder { .. }) => "unknown_order",
        Err(e) if e.as_rejection().is_some() => "rejected",
        Err(_) => "error",
    }
}

async fn reconcile(
    state: &AppState,
    metrics: Option<&ApiMetrics>,
    payload: CallbackPayload,
) -> Result<&'static str, AppError> {
    let reconciler = state
        .callbacks
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("payment gateway is not configured"))?;
    let result = reconciler.reconcile(&payload, Utc::now()).await;
    if let Some(m) = metrics {
        m.record_callback(outcome_label(&result));
    }
    if let CallbackOutcome::UnknownOrder { merchant_oid } = &result? {
        tracing::warn!(merchant_oid = %merchant_oid, "acknowledged callback for unknown order");
    }
    Ok(CALLBACK_ACK)
}

/// POST /v1/payments/callback: Gateway settlement notification.
#[utoipa::path(
    post,
    path = "/v1/payments/callback",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "Signed gateway callback fields"),
    responses(
        (status = 200, description = "Acknowledged", body = String),
        (status = 400, description = "Hash mismatch or malformed form", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway not configured", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn callback_form(
    State(state): State<AppState>,
    metrics: Option<Extension<ApiMetrics>>,
    body: Result<Form<CallbackPayload>, FormRejection>,
) -> Result<&'static str, AppError> {
    let payload = extract_form(body)?;
    reconcile(&state, metrics.as_deref(), payload).await
}

/// GET /v1/payments/callback: Same as POST, fields in the query string.
#[utoipa::path(
    get,
    path = "/v1/payments/callback",
    responses(
        (status = 200, description = "Acknowledged", body = String),
        (status = 400, description = "Hash mismatch or malformed query", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway not configured", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn callback_query(
    State(state): State<AppState>,
    metrics: Option<Extension<ApiMetrics>>,
    query: Result<Query<CallbackPayload>, QueryRejection>,
) -> Result<&'static str, AppError> {
    let payload = extract_query(query)?;
    reconcile(&state, metrics.as_deref(), payload).await
}
