#![allow(clippy::result_large_err)]
//! # Warden Core
//!
//! Role-based access control with token authentication.
//!
//! ## Architecture
//!
//! - **Identity**: user records and the repository seam they are loaded through
//! - **Auth**: password hashing, signed tokens, and the account service (register, login, profile)
//! - **RBAC**: roles, permissions, the decision engine, and role/permission administration
//! - **DB**: PostgreSQL and in-memory implementations of the repositories
//! - **Middleware**: authentication gate, rate limiting, request tracing, security headers
//! - **API**: the axum router and JSON handlers
//! - **Telemetry**: structured logging and Prometheus metrics

/// Declares a numeric id newtype that is transparent to serde and sqlx.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, WardenError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{AccountService, CredentialVerifier, IssuedToken, TokenService};
    pub use crate::config::Config;
    pub use crate::db::{Database, MemoryStore};
    pub use crate::error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, WardenError};
    pub use crate::identity::{Identity, IdentityId, IdentityRepository, NewIdentity, ProfileUpdate};
    pub use crate::middleware::{AuthGate, AuthLayer, RateLimitLayer, TracingLayer};
    pub use crate::rbac::{
        authorize, evaluate, DefaultRole, Grant, MatchedBy, NewPermission, NewRole, Permission,
        PermissionId, PermissionUpdate, PolicyDecision, Principal, RequireCapabilityLayer,
        RequiredCapability, Role, RoleAdmin, RoleGrant, RoleGraph, RoleId, RoleUpdate,
    };
}
