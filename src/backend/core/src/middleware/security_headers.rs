//! Security headers middleware.

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    response::Response,
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameOptions {
    #[default]
    Deny,
    SameOrigin,
}

impl FrameOptions {
    fn as_header(&self) -> HeaderValue {
        match self {
            Self::Deny => HeaderValue::from_static("DENY"),
            Self::SameOrigin => HeaderValue::from_static("SAMEORIGIN"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferrerPolicy {
    #[default]
    NoReferrer,
    SameOrigin,
    StrictOriginWhenCrossOrigin,
}

impl ReferrerPolicy {
    fn as_header(&self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Self::NoReferrer => "no-referrer",
            Self::SameOrigin => "same-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    pub frame_options: FrameOptions,
    pub referrer_policy: ReferrerPolicy,
    /// `Cache-Control: no-store` on everything under `/api/`
    pub api_no_store: bool,
    pub remove_server_header: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            frame_options: FrameOptions::Deny,
            referrer_policy: ReferrerPolicy::NoReferrer,
            api_no_store: true,
            remove_server_header: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityHeadersLayer {
    config: SecurityHeadersConfig,
}

impl SecurityHeadersLayer {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    config: SecurityHeadersConfig,
}

impl<S> Service<Request> for SecurityHeadersService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();
        let is_api = req.uri().path().starts_with("/api/");

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let headers = response.headers_mut();

            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            headers.insert(header::X_FRAME_OPTIONS, config.frame_options.as_header());
            headers.insert(header::REFERRER_POLICY, config.referrer_policy.as_header());
            if config.api_no_store && is_api {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            }
            if config.remove_server_header {
                headers.remove(header::SERVER);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, response::IntoResponse};
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn headers_for(path: &str) -> axum::http::HeaderMap {
        let ok = tower::service_fn(|_req: Request| async move {
            Ok::<_, Infallible>(StatusCode::OK.into_response())
        });
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        SecurityHeadersLayer::default()
            .layer(ok)
            .oneshot(request)
            .await
            .unwrap()
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn test_headers_on_api_routes() {
        let headers = headers_for("/api/roles").await;
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn test_no_cache_control_outside_api() {
        let headers = headers_for("/health").await;
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(!headers.contains_key(header::CACHE_CONTROL));
    }
}
