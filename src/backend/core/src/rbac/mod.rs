//! Role-Based Access Control.
//!
//! This module provides:
//! - **Models**: Role, Permission, and the per-request [`Principal`]
//! - **Engine**: the pure allow/deny decision over a principal and a [`RequiredCapability`]
//! - **Graph**: the storage seam for roles, permissions, and their associations
//! - **Admin**: validated CRUD over the graph
//! - **Default Roles**: Admin, Employee, Manager, Kurir and their default permissions
//! - **Authorization Middleware**: a Tower layer that guards routes
//!
//! Roles are flat; there is no inheritance between them. Permissions held
//! through any role count (union), and nothing overrides an allow.
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::rbac::{evaluate, RequiredCapability};
//!
//! let decision = evaluate(&principal, &RequiredCapability::permission("edit_employee"));
//! if decision.is_allowed() { /* ... */ }
//! ```

pub mod admin;
pub mod engine;
pub mod graph;
pub mod middleware;
pub mod models;
pub mod roles;

pub use admin::RoleAdmin;
pub use engine::{authorize, evaluate, Grant, MatchedBy, PolicyDecision, RequiredCapability};
pub use graph::RoleGraph;
pub use middleware::{RequireCapabilityLayer, RequireCapabilityService};
pub use models::{
    NewPermission, NewRole, Permission, PermissionId, PermissionUpdate, Principal, Role,
    RoleGrant, RoleId, RoleUpdate,
};
pub use roles::{seed_defaults, DefaultRole, SeedReport};
