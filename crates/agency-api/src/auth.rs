//! # Authentication & Roles
//!
//! Static bearer token carrying the caller's role and actor name:
//!
//! ```text
//! Bearer {role}:{actor}:{secret}   role is staff | manager | admin
//! Bearer {secret}                  treated as admin, actor "operator"
//! ```
//!
//! With no token configured every request runs as admin. Handlers read the
//! [`CallerIdentity`] the middleware put into the request extensions.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Caller roles, ordered by privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// Sells and reads sales. Never sees commission figures.
    Staff,
    /// Staff plus refunds.
    Manager,
    /// Full access including tenancy administration.
    Admin,
}

impl CallerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "staff" => Some(Self::Staff),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: CallerRole,
    /// Recorded as the actor on refunds.
    pub actor: String,
}

impl CallerIdentity {
    fn admin(actor: &str) -> Self {
        Self {
            role: CallerRole::Admin,
            actor: actor.to_string(),
        }
    }

    pub fn has_role(&self, minimum: CallerRole) -> bool {
        self.role >= minimum
    }

    /// Whether commission figures may be shown to this caller.
    pub fn sees_commission(&self) -> bool {
        self.has_role(CallerRole::Manager)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// 403 unless the caller has at least `minimum`.
pub fn require_role(caller: &CallerIdentity, minimum: CallerRole) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Bearer secret with a redacted `Debug`.
#[derive(Clone)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<SecretToken>,
}

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{role}:{actor}:{secret}` or a bare `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::admin("operator"))
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, actor, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = CallerRole::parse(role).ok_or_else(|| format!("unknown role: {role}"))?;
            if actor.trim().is_empty() {
                return Err("actor must not be empty".into());
            }
            Ok(CallerIdentity {
                role,
                actor: actor.to_string(),
            })
        }
        _ => Err("invalid token format, expected {role}:{actor}:{secret} or {secret}".into()),
    }
}

/// Validate the bearer token and attach the caller identity.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        request.extensions_mut().insert(CallerIdentity::admin("anonymous"));
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header.map(|h| h.strip_prefix("Bearer ")) {
        Some(Some(provided)) => match parse_bearer_token(provided, expected.expose()) {
            Ok(identity) => {
                tracing::debug!(role = identity.role.as_str(), actor = %identity.actor, "caller authenticated");
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(msg) => {
                tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                unauthorized_response(&msg)
            }
        },
        Some(None) => {
            tracing::warn!("authentication failed: non-Bearer authorization scheme");
            unauthorized_response("authorization header must use Bearer scheme")
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(caller: CallerIdentity) -> String {
        format!("{}:{}", caller.role.as_str(), caller.actor)
    }

    fn test_app(token: Option<&str>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig {
                token: token.map(SecretToken::new),
            }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn roles_are_ordered() {
        assert!(CallerRole::Admin > CallerRole::Manager);
        assert!(CallerRole::Manager > CallerRole::Staff);
    }

    #[test]
    fn parse_role_token() {
        let id = parse_bearer_token("staff:ayse:s3cret", "s3cret").unwrap();
        assert_eq!(id.role, CallerRole::Staff);
        assert_eq!(id.actor, "ayse");
        assert!(!id.sees_commission());
    }

    #[test]
    fn parse_bare_secret_is_admin() {
        let id = parse_bearer_token("s3cret", "s3cret").unwrap();
        assert_eq!(id.role, CallerRole::Admin);
        assert!(id.sees_commission());
    }

    #[test]
    fn parse_rejects_wrong_secret_and_unknown_role() {
        assert!(parse_bearer_token("staff:ayse:nope", "s3cret").is_err());
        assert!(parse_bearer_token("owner:ayse:s3cret", "s3cret")
            .unwrap_err()
            .contains("unknown role"));
        assert!(parse_bearer_token("a:b", "s3cret").is_err());
    }

    #[test]
    fn require_role_forbids_lower_roles() {
        let staff = parse_bearer_token("staff:ayse:k", "k").unwrap();
        assert!(require_role(&staff, CallerRole::Staff).is_ok());
        assert!(matches!(
            require_role(&staff, CallerRole::Manager),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn secret_token_debug_redacted() {
        let rendered = format!("{:?}", AuthConfig { token: Some(SecretToken::new("hunter2")) });
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn disabled_auth_runs_as_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin:anonymous");
    }

    #[tokio::test]
    async fn valid_token_attaches_identity() {
        let (status, body) = call(test_app(Some("k")), Some("Bearer manager:mert:k")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "manager:mert");
    }

    #[tokio::test]
    async fn missing_and_foreign_schemes_rejected() {
        let (status, body) = call(test_app(Some("k")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing"));

        let (status, _) = call(test_app(Some("k")), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
