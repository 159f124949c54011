//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{taxpayer_id}:{secret}   — scoped caller
//! Bearer {secret}                        — admin
//! ```
//!
//! `taxpayer_id` may be empty for agents and admins. A `taxpayer` token
//! must carry one: it binds the caller to that taxpayer's records.
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rsm_core::TaxpayerId;
use rsm_state::TransitionEvidence;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles, ordered by privilege: `Taxpayer < Agent < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A registered business; sees only its own records.
    Taxpayer,
    /// Tax office staff: reviews orders, confirms payments, inspects.
    Agent,
    /// Full access, including catalogue administration.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Taxpayer => "taxpayer",
            Self::Agent => "agent",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// Bound taxpayer, required for the `taxpayer` role.
    pub taxpayer_id: Option<TaxpayerId>,
}

impl CallerIdentity {
    /// Unscoped admin identity.
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            taxpayer_id: None,
        }
    }

    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Agents and admins see every taxpayer; a taxpayer sees only itself.
    pub fn can_access_taxpayer(&self, id: TaxpayerId) -> bool {
        self.has_role(Role::Agent) || self.taxpayer_id == Some(id)
    }

    /// `"admin"`, `"agent"`, or `"taxpayer:<uuid>"`; recorded in transition logs.
    pub fn actor(&self) -> String {
        match self.taxpayer_id {
            Some(id) => format!("{}:{}", self.role.as_str(), id.as_uuid()),
            None => self.role.as_str().to_string(),
        }
    }

    /// Transition evidence naming this caller.
    pub fn evidence(&self) -> TransitionEvidence {
        TransitionEvidence::by(self.actor())
    }
}

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

/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
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

/// Returns 403 Forbidden unless the caller may act on `id`'s records.
pub fn require_taxpayer_access(caller: &CallerIdentity, id: TaxpayerId) -> Result<(), AppError> {
    if caller.can_access_taxpayer(id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "taxpayer callers may only access their own records".into(),
        ))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in format `{role}:{taxpayer_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::admin())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role_str, taxpayer_str, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = match *role_str {
                "admin" => Role::Admin,
                "agent" => Role::Agent,
                "taxpayer" => Role::Taxpayer,
                other => return Err(format!("unknown role: {other}")),
            };

            let taxpayer_id = if taxpayer_str.is_empty() {
                None
            } else {
                Some(TaxpayerId::from_uuid(
                    taxpayer_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid taxpayer_id: {e}"))?,
                ))
            };

            if role == Role::Taxpayer && taxpayer_id.is_none() {
                return Err("taxpayer tokens must name a taxpayer_id".into());
            }

            Ok(CallerIdentity { role, taxpayer_id })
        }
        _ => Err("invalid token format: expected {role}:{taxpayer_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as admin.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity::admin());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("UNAUTHORIZED", message)),
    )
        .into_response()
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

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.actor() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn bare_secret_is_admin() {
        let (status, body) = call(test_app(Some("s3cret".into())), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn scoped_taxpayer_token() {
        let id = Uuid::new_v4();
        let header = format!("Bearer taxpayer:{id}:s3cret");
        let (status, body) = call(test_app(Some("s3cret".into())), Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("taxpayer:{id}"));
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["success"], false);
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Bearer agent::nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_rejected() {
        let (status, body) =
            call(test_app(Some("s3cret".into())), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_runs_as_admin() {
        let (status, body) = call(test_app(None), Some("Bearer anything")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[test]
    fn taxpayer_token_needs_binding() {
        assert!(parse_bearer_token("taxpayer::s3cret", "s3cret").is_err());
        assert!(parse_bearer_token("agent::s3cret", "s3cret").is_ok());
        assert!(parse_bearer_token("auditor::s3cret", "s3cret").is_err());
        assert!(parse_bearer_token("agent:not-a-uuid:s3cret", "s3cret").is_err());
        assert!(parse_bearer_token("a:b", "s3cret").is_err());
    }

    #[test]
    fn constant_time_eq() {
        assert!(constant_time_token_eq("secret-token", "secret-token"));
        assert!(!constant_time_token_eq("secret", "secret-token"));
        assert!(!constant_time_token_eq("", "secret-token"));
    }

    #[test]
    fn role_ordering_and_access() {
        assert!(Role::Taxpayer < Role::Agent);
        assert!(Role::Agent < Role::Admin);

        let own = TaxpayerId::new();
        let caller = CallerIdentity {
            role: Role::Taxpayer,
            taxpayer_id: Some(own),
        };
        assert!(caller.can_access_taxpayer(own));
        assert!(!caller.can_access_taxpayer(TaxpayerId::new()));
        assert!(require_role(&caller, Role::Agent).is_err());

        let agent = CallerIdentity {
            role: Role::Agent,
            taxpayer_id: None,
        };
        assert!(agent.can_access_taxpayer(own));
        assert!(require_taxpayer_access(&agent, own).is_ok());
    }
}
