//! HTTP API for Warden.
//!
//! # Routes
//!
//! | Route                                  | Guard                          |
//! |----------------------------------------|--------------------------------|
//! | `GET /health`, `GET /metrics`          | none                           |
//! | `POST /api/auth/register`, `login`     | auth rate limit                |
//! | `/api/auth/logout`, `/api/auth/me`     | authenticated                  |
//! | `/api/roles/**`                        | admin rate limit, then per-route capability |
//! | `/api/permissions/**`                  | authenticated, writes need `Admin` |
//! | `/api/users/:id/roles/**`              | `Admin` or `Manager` to read, `Admin` to write |
//!
//! Rate limiting wraps the authentication gate, which wraps the capability
//! check, which wraps the handler.

mod auth;
mod handlers;
mod permissions;
mod roles;
mod users;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::auth::{AccountService, CredentialVerifier, TokenService};
use crate::config::{Config, CorsConfig, RateLimitSettings};
use crate::db::Storage;
use crate::error::Result;
use crate::middleware::{
    AuthGate, AuthLayer, RateLimitLayer, RateLimitPolicy, RateLimiter, SecurityHeadersLayer,
    TracingLayer,
};
use crate::rbac::{RequireCapabilityLayer, RoleAdmin};
use crate::telemetry::MetricsRegistry;

const ADMIN_ROLE: &str = "Admin";
const MANAGER_ROLE: &str = "Manager";
const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub account: Arc<AccountService>,
    pub admin: RoleAdmin,
    pub gate: Arc<AuthGate>,
    pub storage: Storage,
    pub metrics: MetricsRegistry,
}

impl AppState {
    /// Wire the services for `config` on top of an already built storage backend.
    pub fn new(config: &Config, storage: Storage, metrics: MetricsRegistry) -> Result<Self> {
        let tokens = Arc::new(TokenService::new(&config.auth)?);
        let verifier = CredentialVerifier::new(&config.hashing)?;

        let account = AccountService::new(
            storage.identities(),
            storage.graph(),
            verifier,
            tokens.clone(),
        )
        .with_default_role(config.registration.default_role.clone());

        Ok(Self {
            account: Arc::new(account),
            admin: RoleAdmin::new(storage.graph()),
            gate: Arc::new(AuthGate::new(tokens, storage.identities())),
            storage,
            metrics,
        })
    }
}

/// Router-wide settings that are not part of the per-request state.
#[derive(Clone)]
pub struct RouterOptions {
    pub auth_limiter: Arc<RateLimiter>,
    pub admin_limiter: Arc<RateLimiter>,
    pub cors: CorsConfig,
}

impl RouterOptions {
    pub fn new(rate_limit: &RateLimitSettings, cors: CorsConfig) -> Self {
        let proxy_headers = rate_limit.proxy_headers();
        Self {
            auth_limiter: Arc::new(
                RateLimiter::new(RateLimitPolicy::auth(rate_limit), rate_limit.enabled)
                    .with_trusted_proxy_headers(proxy_headers.clone()),
            ),
            admin_limiter: Arc::new(
                RateLimiter::new(RateLimitPolicy::admin(rate_limit), rate_limit.enabled)
                    .with_trusted_proxy_headers(proxy_headers),
            ),
            cors,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.rate_limit, config.cors.clone())
    }

    /// Every limiter, for the background cleanup task.
    pub fn limiters(&self) -> Vec<Arc<RateLimiter>> {
        vec![self.auth_limiter.clone(), self.admin_limiter.clone()]
    }
}

/// The layers a route group picks from.
pub(crate) struct Guards {
    authenticated: AuthLayer,
    auth_rate_limit: RateLimitLayer,
    admin_rate_limit: RateLimitLayer,
}

impl Guards {
    fn new(state: &AppState, options: &RouterOptions) -> Self {
        Self {
            authenticated: AuthLayer::new(state.gate.clone()),
            auth_rate_limit: RateLimitLayer::new(options.auth_limiter.clone()),
            admin_rate_limit: RateLimitLayer::new(options.admin_limiter.clone()),
        }
    }

    fn admin() -> RequireCapabilityLayer {
        RequireCapabilityLayer::role(ADMIN_ROLE)
    }

    fn admin_or_manager() -> RequireCapabilityLayer {
        RequireCapabilityLayer::any_of([ADMIN_ROLE, MANAGER_ROLE])
    }
}

/// Build the API router.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(&config, storage, metrics)?;
/// let app = build_router(state, RouterOptions::from_config(&config));
/// ```
pub fn build_router(state: AppState, options: RouterOptions) -> Router {
    let guards = Guards::new(&state, &options);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .merge(auth::router(&guards))
        .merge(roles::router(&guards))
        .merge(permissions::router(&guards))
        .merge(users::router(&guards))
        .layer(SecurityHeadersLayer::default())
        .layer(TracingLayer::default())
        .layer(cors_layer(&options.cors))
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(CORS_MAX_AGE);

    let origins: Vec<HeaderValue> = config
        .origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

/// Success envelope: `{"success": true, "data": ...}`.
///
/// Failures are rendered by `WardenError`'s `IntoResponse` impl instead.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Body of simple acknowledgements such as logout.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
