//! HTTP middleware for Warden.
pub mod auth;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use auth::{extract_bearer, AuthGate, AuthLayer, AuthService};
pub use rate_limit::{RateLimitLayer, RateLimitPolicy, RateLimitResult, RateLimiter};
pub use security_headers::{
    FrameOptions, ReferrerPolicy, SecurityHeadersConfig, SecurityHeadersLayer,
};
pub use tracing::{RequestContext, TracingConfig, TracingLayer};
