//! Rate limiting middleware.
//!
//! In-memory sliding window counters keyed by client IP, one limiter per
//! bucket (`auth`, `admin`). Allowed responses carry `X-RateLimit-*`
//! headers; rejected requests get a 429 with `Retry-After`.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::middleware::rate_limit::{RateLimitLayer, RateLimitPolicy, RateLimiter};
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::auth(&config.rate_limit), true));
//! let app = Router::new()
//!     .route("/api/auth/login", post(login))
//!     .layer(RateLimitLayer::new(limiter));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use metrics::counter;
use parking_lot::Mutex;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::error::WardenError;

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// A named request budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub bucket: &'static str,
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(bucket: &'static str, max_requests: u64, window: Duration) -> Self {
        Self {
            bucket,
            max_requests,
            window,
        }
    }

    /// Register and login.
    pub fn auth(settings: &RateLimitSettings) -> Self {
        Self::new(
            "auth",
            u64::from(settings.auth_max_requests),
            settings.auth_window,
        )
    }

    /// Role administration.
    pub fn admin(settings: &RateLimitSettings) -> Self {
        Self::new(
            "admin",
            u64::from(settings.admin_max_requests),
            settings.admin_window,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sliding Window
// ═══════════════════════════════════════════════════════════════════════════════

/// Sliding window counter entry.
#[derive(Debug, Clone)]
struct WindowEntry {
    /// Count in current window
    current_count: u64,

    /// Count in previous window
    previous_count: u64,

    /// Timestamp of current window start
    window_start: Instant,

    window_duration: Duration,
}

impl WindowEntry {
    fn new(window_duration: Duration) -> Self {
        Self {
            current_count: 0,
            previous_count: 0,
            window_start: Instant::now(),
            window_duration,
        }
    }

    /// Count the request if it fits in `limit`. Rejected requests are not counted.
    fn try_acquire(&mut self, limit: u64) -> (bool, u64) {
        let count = self.weighted_count();
        if count >= limit {
            return (false, count);
        }
        self.current_count += 1;
        (true, count + 1)
    }

    /// Weighted count, interpolated between the previous and current window.
    fn weighted_count(&mut self) -> u64 {
        self.maybe_rotate();

        let elapsed = self.window_start.elapsed();
        let window_progress = elapsed.as_secs_f64() / self.window_duration.as_secs_f64();
        let previous_weight = (1.0 - window_progress).max(0.0);

        (self.current_count as f64 + self.previous_count as f64 * previous_weight).ceil() as u64
    }

    fn maybe_rotate(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window_duration {
            let windows_passed =
                (elapsed.as_secs_f64() / self.window_duration.as_secs_f64()) as u64;
            if windows_passed >= 2 {
                self.previous_count = 0;
            } else {
                self.previous_count = self.current_count;
            }
            self.current_count = 0;
            self.window_start = Instant::now();
        }
    }

    fn time_until_reset(&self) -> Duration {
        self.window_duration
            .saturating_sub(self.window_start.elapsed())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limit check result.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from(self.reset_at.timestamp()),
        );
    }
}

/// Per-client sliding window limiter for one bucket.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    enabled: bool,
    /// Proxy headers trusted to carry the client address, in order
    trusted_proxy_headers: Vec<String>,
    windows: DashMap<String, Mutex<WindowEntry>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, enabled: bool) -> Self {
        Self {
            policy,
            enabled,
            trusted_proxy_headers: Vec::new(),
            windows: DashMap::new(),
        }
    }

    /// Key clients on these proxy headers before the peer address.
    pub fn with_trusted_proxy_headers(mut self, headers: Vec<String>) -> Self {
        self.trusted_proxy_headers = headers;
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check and count a request from `client`.
    pub fn check(&self, client: &str) -> RateLimitResult {
        if !self.enabled {
            return RateLimitResult {
                allowed: true,
                limit: u64::MAX,
                remaining: u64::MAX,
                reset_at: Utc::now() + chrono::Duration::hours(24),
                retry_after_secs: None,
            };
        }

        let entry = self
            .windows
            .entry(client.to_string())
            .or_insert_with(|| Mutex::new(WindowEntry::new(self.policy.window)));
        let mut window = entry.lock();

        let limit = self.policy.max_requests;
        let (allowed, count) = window.try_acquire(limit);
        let until_reset = window.time_until_reset();
        let reset_at = Utc::now()
            + chrono::Duration::from_std(until_reset).unwrap_or_else(|_| chrono::Duration::zero());

        RateLimitResult {
            allowed,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
            retry_after_secs: (!allowed).then(|| until_reset.as_secs().max(1)),
        }
    }

    /// Drop entries idle for more than two windows.
    pub fn cleanup_expired(&self) {
        let max_age = self.policy.window * 2;
        self.windows
            .retain(|_, entry| entry.lock().window_start.elapsed() < max_age);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Client Extraction
// ═══════════════════════════════════════════════════════════════════════════════

/// Client IP from the trusted proxy headers, falling back to the connection
/// address. Untrusted headers are ignored.
pub fn extract_client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxy_headers: &[String],
) -> Option<IpAddr> {
    for header_name in trusted_proxy_headers {
        if let Some(value) = headers.get(header_name.as_str()) {
            if let Ok(s) = value.to_str() {
                // X-Forwarded-For can contain multiple IPs, take the first (client)
                let ip_str = s.split(',').next().unwrap_or(s).trim();
                if let Ok(ip) = ip_str.parse() {
                    return Some(ip);
                }
            }
        }
    }

    remote_addr.map(|addr| addr.ip())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limiting layer for Tower.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let client =
                extract_client_ip(request.headers(), remote_addr, &limiter.trusted_proxy_headers)
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

            let result = limiter.check(&client);
            if result.allowed {
                let mut response = inner.call(request).await?;
                if limiter.enabled {
                    result.apply_headers(response.headers_mut());
                }
                return Ok(response);
            }

            let retry_after = result.retry_after_secs.unwrap_or(1);
            warn!(
                client = %client,
                bucket = limiter.policy.bucket,
                path = %request.uri().path(),
                retry_after_secs = retry_after,
                "Rate limit exceeded"
            );
            counter!("rate_limit_rejected_total", "bucket" => limiter.policy.bucket).increment(1);

            let mut response = WardenError::rate_limited(retry_after).into_response();
            result.apply_headers(response.headers_mut());
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after));
            Ok(response)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Background Cleanup Task
// ═══════════════════════════════════════════════════════════════════════════════

/// Start background cleanup task for expired rate limit entries.
pub fn start_cleanup_task(limiters: Vec<Arc<RateLimiter>>, interval: Duration) {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        loop {
            interval_timer.tick().await;
            for limiter in &limiters {
                limiter.cleanup_expired();
            }
            debug!("Cleaned up expired rate limit entries");
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
