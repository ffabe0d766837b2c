//! RBAC data models: Role, Permission, input types, and the resolved Principal.

use crate::identity::{Identity, IdentityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

numeric_id!(
    /// Strongly-typed role identifier.
    RoleId
);

numeric_id!(
    /// Strongly-typed permission identifier.
    PermissionId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Role & Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A named, flat role. Roles do not inherit from one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    /// Unique, case-sensitive name.
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named capability that roles can grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// Unique, case-sensitive name, e.g. `edit_employee`.
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a role.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial role update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RoleUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Input for creating a permission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPermission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial permission update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// A role held by an identity, with the permissions that role grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleGrant {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// An authenticated identity with its roles and permissions eagerly resolved.
///
/// Built once per request by the authentication gate and read by the
/// decision engine.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(rename = "roles")]
    pub grants: Vec<RoleGrant>,
}

impl Principal {
    pub fn new(identity: Identity, grants: Vec<RoleGrant>) -> Self {
        Self { identity, grants }
    }

    pub fn id(&self) -> IdentityId {
        self.identity.id
    }

    /// Names of every held role.
    pub fn role_names(&self) -> HashSet<&str> {
        self.grants.iter().map(|g| g.role.name.as_str()).collect()
    }

    /// Union of permission names across every held role.
    pub fn permission_names(&self) -> HashSet<&str> {
        self.grants
            .iter()
            .flat_map(|g| g.permissions.iter())
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.grants.iter().any(|g| g.role.name == name)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.grants
            .iter()
            .any(|g| g.permissions.iter().any(|p| p.name == name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
