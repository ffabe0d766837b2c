//! Request tracing middleware.
//!
//! Features:
//! - Request IDs propagated from `X-Request-ID` or generated
//! - One span per request, with the authenticated identity recorded on it
//! - Completion logging at a level chosen by status class
//! - Request count and latency metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::middleware::tracing::{TracingConfig, TracingLayer};
//!
//! let app = Router::new()
//!     .route("/api/roles", get(list_roles))
//!     .layer(TracingLayer::new(TracingConfig::default()));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, Request},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::telemetry::metrics::RequestDurationHistogram;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracing middleware configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub enabled: bool,

    /// Paths that are neither logged nor counted
    pub excluded_paths: Vec<String>,

    /// Log request headers at debug level
    pub log_request_headers: bool,

    /// Headers to redact from logs
    pub redacted_headers: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_paths: vec!["/health".to_string(), "/metrics".to_string()],
            log_request_headers: false,
            redacted_headers: vec![
                header::AUTHORIZATION.to_string(),
                header::COOKIE.to_string(),
            ],
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-request context inserted into the request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: Option<String>,
    pub method: String,
    pub path: String,
    /// Matched route pattern, e.g. `/api/roles/:id`
    pub route: Option<String>,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            request_id: request_id_from(request.headers()),
            client_ip: remote_addr.map(|addr| addr.ip().to_string()),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            route: request
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string()),
        }
    }

    fn metric_path(&self) -> &str {
        self.route.as_deref().unwrap_or(&self.path)
    }
}

fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Redact sensitive headers.
fn redact_headers(headers: &HeaderMap, redacted: &[String]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value_str = if redacted.iter().any(|r| r.eq_ignore_ascii_case(name.as_str())) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[INVALID UTF-8]").to_string()
            };
            (name.to_string(), value_str)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracing layer for Tower.
#[derive(Clone, Default)]
pub struct TracingLayer {
    config: Arc<TracingConfig>,
}

impl TracingLayer {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Tracing service.
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
    config: Arc<TracingConfig>,
}

impl<S> Service<Request<Body>> for TracingService<S>
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
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = request.uri().path();
            if !config.enabled || config.excluded_paths.iter().any(|p| path == p) {
                return inner.call(request).await;
            }

            let start = Instant::now();
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let ctx = RequestContext::from_request(&request, remote_addr);

            let span = info_span!(
                "http_request",
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                route = ctx.route.as_deref().unwrap_or("unknown"),
                client_ip = ctx.client_ip.as_deref().unwrap_or("unknown"),
                user_id = tracing::field::Empty,
                status = tracing::field::Empty,
            );

            if config.log_request_headers {
                let headers = redact_headers(request.headers(), &config.redacted_headers);
                debug!(parent: &span, request_headers = ?headers, "Request headers");
            }

            request.extensions_mut().insert(ctx.clone());

            let result = inner.call(request).instrument(span.clone()).await;
            let duration = start.elapsed();

            match result {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    span.record("status", status);
                    let duration_ms = duration.as_millis() as u64;
                    if status >= 500 {
                        error!(parent: &span, status, duration_ms, "Server error");
                    } else if status >= 400 {
                        warn!(parent: &span, status, duration_ms, "Client error");
                    } else {
                        info!(parent: &span, status, duration_ms, "Request completed");
                    }

                    RequestDurationHistogram::record(
                        &ctx.method,
                        ctx.metric_path(),
                        status,
                        duration.as_secs_f64(),
                    );
                    Ok(response)
                }
                Err(e) => {
                    error!(
                        parent: &span,
                        duration_ms = duration.as_millis() as u64,
                        "Request failed with internal error"
                    );
                    Err(e)
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Extractor for request context in handlers.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext {
                request_id: request_id_from(&parts.headers),
                client_ip: None,
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                route: None,
            }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn call(request: Request<Body>) -> Response {
        let echo_request_id = tower::service_fn(|req: Request<Body>| async move {
            let id = req
                .extensions()
                .get::<RequestContext>()
                .map(|c| c.request_id.clone())
                .unwrap_or_default();
            Ok::<_, Infallible>((StatusCode::OK, id).into_response())
        });
        TracingLayer::default()
            .layer(echo_request_id)
            .oneshot(request)
            .await
            .unwrap()
    }

    #[test]
    fn test_header_redaction() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Authorization", HeaderValue::from_static("Bearer secret"));

        let result = redact_headers(&headers, &TracingConfig::default().redacted_headers);
        let auth_value = result
            .iter()
            .find(|(k, _)| k == "authorization")
            .map(|(_, v)| v.as_str());
        assert_eq!(auth_value, Some("[REDACTED]"));
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert!(config.enabled);
        assert!(config.excluded_paths.contains(&"/health".to_string()));
        assert!(config.excluded_paths.contains(&"/metrics".to_string()));
    }

    #[tokio::test]
    async fn test_propagates_request_id() {
        let request = Request::builder()
            .uri("/api/roles")
            .header(REQUEST_ID_HEADER, "req-123")
            .body(Body::empty())
            .unwrap();
        let response = call(request).await;
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");
    }

    #[tokio::test]
    async fn test_generates_request_id() {
        let request = Request::builder().uri("/api/roles").body(Body::empty()).unwrap();
        let response = call(request).await;
        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_excluded_paths_pass_through() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = call(request).await;
        assert!(!response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
