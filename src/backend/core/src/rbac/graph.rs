//! The role/permission graph: the seam between the admin surface and storage.

use super::models::{
    NewPermission, NewRole, Permission, PermissionId, PermissionUpdate, Role, RoleId, RoleUpdate,
};
use crate::error::Result;
use crate::identity::IdentityId;
use async_trait::async_trait;

/// Storage for roles, permissions, and both association tables.
///
/// Implementations receive already-validated names. Query results follow
/// insertion order: roles and permissions by id, associations by the order
/// in which they were created.
#[async_trait]
pub trait RoleGraph: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    /// `DuplicateName` if the name is taken.
    async fn create_role(&self, new: NewRole) -> Result<Role>;

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// `NotFound` if absent, `DuplicateName` if renamed onto a taken name.
    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role>;

    /// Deletes the role and every association that references it.
    /// `NotFound` if absent.
    async fn delete_role(&self, id: RoleId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_permission(&self, new: NewPermission) -> Result<Permission>;

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>>;

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    async fn update_permission(&self, id: PermissionId, update: PermissionUpdate)
        -> Result<Permission>;

    async fn delete_permission(&self, id: PermissionId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Associations
    // ─────────────────────────────────────────────────────────────────────────

    /// `NotFound` if the identity does not exist.
    async fn roles_of_identity(&self, identity: IdentityId) -> Result<Vec<Role>>;

    /// `NotFound` if the role does not exist.
    async fn permissions_of_role(&self, role: RoleId) -> Result<Vec<Permission>>;

    /// Idempotent. `NotFound` if the identity or role does not exist.
    async fn assign_role(&self, identity: IdentityId, role: RoleId) -> Result<()>;

    /// Returns whether an assignment was removed. `NotFound` if the identity
    /// or role does not exist.
    async fn revoke_role(&self, identity: IdentityId, role: RoleId) -> Result<bool>;

    /// Atomically replace the role's permission set with `permissions`
    /// (duplicates collapsed, order kept). `NotFound` if the role or any
    /// permission is missing, in which case nothing changes. Returns the new set.
    async fn replace_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<Vec<Permission>>;

    /// Add a single grant without touching the rest of the set. Idempotent.
    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> Result<()>;
}

/// Drop repeated ids while keeping first-seen order.
pub(crate) fn dedup_ids<T: Copy + Eq + std::hash::Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
