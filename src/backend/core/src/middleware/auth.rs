//! Authentication gate.
//!
//! Turns a bearer token into a fully resolved [`Principal`] and inserts it
//! into the request extensions. Failures short-circuit the request:
//!
//! | Situation                                   | Error                      |
//! |---------------------------------------------|----------------------------|
//! | no `Authorization`, non-bearer, empty token | `MISSING_TOKEN` (401)      |
//! | malformed, bad signature, expired           | `INVALID_TOKEN` (401)      |
//! | token subject no longer exists              | `IDENTITY_NOT_FOUND` (404) |
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::middleware::{AuthGate, AuthLayer};
//!
//! let gate = Arc::new(AuthGate::new(tokens, identities));
//! let app = Router::new()
//!     .route("/api/auth/me", get(me))
//!     .layer(AuthLayer::new(gate));
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use metrics::counter;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::auth::TokenService;
use crate::error::{ErrorCode, Result, WardenError};
use crate::identity::IdentityRepository;
use crate::rbac::models::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Verifies bearer tokens and loads the principal behind them.
#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityRepository>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, identities: Arc<dyn IdentityRepository>) -> Self {
        Self { tokens, identities }
    }

    /// Authenticate a request from its headers.
    ///
    /// The identity, its roles, and their permissions are loaded in a single
    /// repository call.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal> {
        let result = self.resolve(headers).await;
        match &result {
            Ok(principal) => {
                counter!("auth_success_total", "method" => "jwt").increment(1);
                tracing::Span::current().record("user_id", principal.id().as_i64());
                debug!(identity_id = %principal.id(), "Request authenticated");
            }
            Err(err) => {
                counter!("auth_errors_total", "error_type" => error_label(err.code()))
                    .increment(1);
            }
        }
        result
    }

    async fn resolve(&self, headers: &HeaderMap) -> Result<Principal> {
        let token = extract_bearer(headers).ok_or_else(WardenError::missing_token)?;

        let claims = self.tokens.verify(token).map_err(|e| {
            debug!(reason = %e, "Token verification failed");
            WardenError::from(e)
        })?;
        let identity_id = claims.identity_id()?;

        self.identities
            .resolve_principal(identity_id)
            .await?
            .ok_or_else(|| {
                warn!(identity_id = %identity_id, "Token subject no longer exists");
                WardenError::identity_not_found(identity_id.as_i64())
            })
    }
}

/// The token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. A missing header, another
/// scheme, or an empty token all yield `None`.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    gate: Arc<AuthGate>,
}

impl AuthLayer {
    pub fn new(gate: Arc<AuthGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    gate: Arc<AuthGate>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match gate.authenticate(request.headers()).await {
                Ok(principal) => {
                    request.extensions_mut().insert(principal);
                    inner.call(request).await
                }
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Extractor for the authenticated principal in handlers.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = WardenError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(WardenError::unauthenticated)
    }
}

fn error_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::MissingToken => "missing_token",
        ErrorCode::InvalidToken => "invalid_token",
        ErrorCode::IdentityNotFound => "identity_not_found",
        _ => "other",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::Claims;
    use crate::config::AuthConfig;
    use crate::db::MemoryStore;
    use crate::identity::{CredentialHash, IdentityId, NewIdentity};
    use axum::http::{HeaderValue, StatusCode};
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::convert::Infallible;
    use tower::ServiceExt;

    const SECRET: &str = "an-adequately-long-test-secret-value!";

    async fn setup() -> (AuthGate, Arc<TokenService>, IdentityId) {
        let store = Arc::new(MemoryStore::new());
        let identity = store
            .create(NewIdentity {
                email: "ada@example.com".to_string(),
                username: None,
                first_name: None,
                last_name: None,
                credential: CredentialHash::from_phc("$argon2id$test"),
                initial_roles: vec![],
            })
            .await
            .unwrap();
        let tokens = Arc::new(TokenService::new(&AuthConfig::new(SECRET)).unwrap());
        (AuthGate::new(tokens.clone(), store), tokens, identity.id)
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&bearer("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(&bearer("bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(&bearer("Bearer ")), None);
        assert_eq!(extract_bearer(&bearer("Basic dXNlcjpwYXNz")), None);
        assert_eq!(extract_bearer(&bearer("Bearer")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_missing_token_variants() {
        let (gate, _, _) = setup().await;
        for headers in [HeaderMap::new(), bearer("Basic abc"), bearer("Bearer  ")] {
            let err = gate.authenticate(&headers).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::MissingToken);
        }
    }

    #[tokio::test]
    async fn test_valid_token_resolves_principal() {
        let (gate, tokens, id) = setup().await;
        let issued = tokens.issue(id).unwrap();
        let principal = gate
            .authenticate(&bearer(&format!("Bearer {}", issued.token)))
            .await
            .unwrap();
        assert_eq!(principal.id(), id);
        assert!(principal.grants.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_and_foreign_tokens_are_invalid() {
        let (gate, _, id) = setup().await;
        let err = gate.authenticate(&bearer("Bearer not.a.jwt")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);

        let other = TokenService::new(&AuthConfig::new("x".repeat(40))).unwrap();
        let forged = other.issue(id).unwrap();
        let err = gate
            .authenticate(&bearer(&format!("Bearer {}", forged.token)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let (gate, tokens, id) = setup().await;
        let issued = tokens.issue_at(id, Utc::now() - Duration::hours(2)).unwrap();
        let err = gate
            .authenticate(&bearer(&format!("Bearer {}", issued.token)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_identity_not_found() {
        let (gate, tokens, _) = setup().await;
        let issued = tokens.issue(IdentityId(404)).unwrap();
        let err = gate
            .authenticate(&bearer(&format!("Bearer {}", issued.token)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::IdentityNotFound);
    }

    #[tokio::test]
    async fn test_non_numeric_subject_is_invalid() {
        let (gate, _, _) = setup().await;
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "not-a-number".to_string(),
            jti: "jti".to_string(),
            iat: now,
            exp: now + 3600,
            iss: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let err = gate
            .authenticate(&bearer(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[tokio::test]
    async fn test_layer_inserts_principal() {
        let (gate, tokens, id) = setup().await;
        let issued = tokens.issue(id).unwrap();
        let layer = AuthLayer::new(Arc::new(gate));

        let echo = tower::service_fn(|req: Request<Body>| async move {
            let id = req
                .extensions()
                .get::<Principal>()
                .map(|p| p.id().to_string())
                .unwrap_or_default();
            Ok::<_, Infallible>(id.into_response())
        });

        let request = Request::builder()
            .uri("/api/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {}", issued.token))
            .body(Body::empty())
            .unwrap();
        let response = layer.clone().layer(echo.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap();
        let response = layer.layer(echo).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
