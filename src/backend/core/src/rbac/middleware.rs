//! Axum authorization middleware that enforces a required capability on requests.
//!
//! Reads the [`Principal`] inserted by the authentication gate and runs the
//! decision engine. Must be layered inside (after) the gate.

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::engine::{authorize, RequiredCapability};
use super::models::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps services with capability enforcement.
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::rbac::{RequireCapabilityLayer, RequiredCapability};
///
/// let app = Router::new()
///     .route("/api/roles", post(create_role))
///     .layer(RequireCapabilityLayer::new(RequiredCapability::role("Admin")))
///     .layer(AuthLayer::new(gate));
/// ```
#[derive(Clone)]
pub struct RequireCapabilityLayer {
    required: Arc<RequiredCapability>,
}

impl RequireCapabilityLayer {
    pub fn new(required: RequiredCapability) -> Self {
        Self {
            required: Arc::new(required),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(RequiredCapability::role(name))
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(RequiredCapability::permission(name))
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RequiredCapability::any_of(names))
    }
}

impl<S> Layer<S> for RequireCapabilityLayer {
    type Service = RequireCapabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireCapabilityService {
            inner,
            required: self.required.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that enforces a required capability per request.
#[derive(Clone)]
pub struct RequireCapabilityService<S> {
    inner: S,
    required: Arc<RequiredCapability>,
}

impl<S> Service<Request<Body>> for RequireCapabilityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let required = self.required.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let grant = match authorize(request.extensions().get::<Principal>(), &required) {
                Ok(grant) => grant,
                Err(err) => {
                    warn!(
                        path = %request.uri().path(),
                        required = %required,
                        error_code = %err.code(),
                        "Authorization failed"
                    );
                    return Ok(err.into_response());
                }
            };

            request.extensions_mut().insert(grant);
            inner.call(request).await
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
