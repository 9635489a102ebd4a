//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Business rejections keep their own status and code; storage failures
//! become 500 and gateway failures 502/503. Internal and upstream details
//! are logged, never returned; a gateway refusal carries the provider's
//! reason back to the caller.

use agency_core::SettlementError;
use agency_gateway::GatewayError;
use agency_settlement::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INSUFFICIENT_FUNDS").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller role too low (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Business rule rejected the operation. Status and code come from the rule.
    #[error("{0}")]
    Rejected(#[from] SettlementError),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// The payment gateway answered badly (502).
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// The payment gateway refused the order and said why (502).
    #[error("payment gateway refused the request: {0}")]
    GatewayRefused(String),

    /// A dependency is down or not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Rejected(e) => (
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY),
                e.code(),
            ),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::GatewayRefused(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_REFUSED"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    /// Construct a service unavailable error (503).
    pub fn service_unavailable(msg: &str) -> Self {
        Self::ServiceUnavailable(msg.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::UpstreamError(_) => "An upstream service error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::UpstreamError(_) => tracing::error!(error = %self, "upstream gateway error"),
            Self::GatewayRefused(_) => tracing::warn!(error = %self, "payment gateway refused"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(e) => Self::Rejected(e),
            ServiceError::Upstream(e) if e.is_unavailable() => {
                Self::ServiceUnavailable(format!("payment gateway unavailable: {e}"))
            }
            ServiceError::Upstream(GatewayError::Rejected { reason }) => Self::GatewayRefused(reason),
            ServiceError::Upstream(e) => Self::UpstreamError(e.to_string()),
            ServiceError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agency_core::Rate;
    use agency_store::StoreError;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[test]
    fn fixed_variants_map_to_status() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            (AppError::UpstreamError("x".into()), StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            (AppError::GatewayRefused("x".into()), StatusCode::BAD_GATEWAY, "GATEWAY_REFUSED"),
            (
                AppError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[test]
    fn rejections_keep_their_own_code() {
        let err = AppError::from(SettlementError::InsufficientFunds {
            balance: dec!(500),
            required: dec!(600),
        });
        assert_eq!(err.status_and_code(), (StatusCode::CONFLICT, "INSUFFICIENT_FUNDS"));

        let err = AppError::from(SettlementError::RateCapViolation {
            branch_rate: Rate::new(dec!(30)).unwrap(),
            agency_rate: Rate::new(dec!(20)).unwrap(),
        });
        assert_eq!(
            err.status_and_code(),
            (StatusCode::UNPROCESSABLE_ENTITY, "RATE_CAP_VIOLATION")
        );

        let err = AppError::from(SettlementError::InvalidSignature);
        assert_eq!(err.status_and_code(), (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"));
    }

    #[test]
    fn service_errors_split_by_cause() {
        let storage = AppError::from(ServiceError::Storage(StoreError::Begin("pool closed".into())));
        assert!(matches!(storage, AppError::Internal(_)));

        let down = AppError::from(ServiceError::Upstream(GatewayError::ApiError {
            endpoint: "get-token".into(),
            status: 503,
            body: "maintenance".into(),
        }));
        assert!(matches!(down, AppError::ServiceUnavailable(_)));

        let refused = AppError::from(ServiceError::Upstream(GatewayError::Rejected {
            reason: "duplicate order".into(),
        }));
        assert!(matches!(refused, AppError::GatewayRefused(ref r) if r == "duplicate order"));

        let garbled = AppError::from(ServiceError::Upstream(GatewayError::ApiError {
            endpoint: "get-token".into(),
            status: 400,
            body: "secret-merchant-key".into(),
        }));
        assert!(matches!(garbled, AppError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn gateway_refusal_reason_is_returned() {
        let err = AppError::from(ServiceError::Upstream(GatewayError::Rejected {
            reason: "order already paid".into(),
        }));
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error.code, "GATEWAY_REFUSED");
        assert!(body.error.message.contains("order already paid"));
    }

    #[tokio::test]
    async fn other_upstream_detail_is_hidden() {
        let (status, body) =
            response_parts(AppError::UpstreamError("body: secret-merchant-key".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body.error.message.contains("secret-merchant-key"));
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let (status, body) = response_parts(AppError::Internal("password=hunter2".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.error.message.contains("hunter2"));
    }

    #[tokio::test]
    async fn rejection_message_is_returned() {
        let (status, body) =
            response_parts(AppError::from(SettlementError::not_found("sale", "abc"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "NOT_FOUND");
        assert!(body.error.message.contains("sale abc"));
        assert!(body.error.details.is_none());
    }
}
