//! Role/permission administration: validation and logging in front of the graph.

use super::graph::RoleGraph;
use super::models::{
    NewPermission, NewRole, Permission, PermissionId, PermissionUpdate, Role, RoleId, RoleUpdate,
};
use crate::error::{Result, WardenError};
use crate::identity::IdentityId;
use std::sync::Arc;
use tracing::info;

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

/// CRUD over roles, permissions, and their associations.
#[derive(Clone)]
pub struct RoleAdmin {
    graph: Arc<dyn RoleGraph>,
}

impl RoleAdmin {
    pub fn new(graph: Arc<dyn RoleGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<dyn RoleGraph> {
        &self.graph
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_role(&self, new: NewRole) -> Result<Role> {
        let new = NewRole {
            name: validate_name("role", &new.name)?,
            description: normalize_description(new.description)?,
        };
        let role = self.graph.create_role(new).await?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> Result<Role> {
        self.graph
            .find_role(id)
            .await?
            .ok_or_else(|| WardenError::not_found("role", id.to_string()))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.graph.list_roles().await
    }

    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role> {
        let update = RoleUpdate {
            name: update.name.map(|n| validate_name("role", &n)).transpose()?,
            description: normalize_description(update.description)?,
        };
        if update.is_empty() {
            return self.get_role(id).await;
        }
        let role = self.graph.update_role(id, update).await?;
        info!(role_id = %role.id, name = %role.name, "Role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.graph.delete_role(id).await?;
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    pub async fn permissions_of_role(&self, id: RoleId) -> Result<Vec<Permission>> {
        self.graph.permissions_of_role(id).await
    }

    /// Replace the role's permission set. An empty list revokes every grant.
    pub async fn replace_role_permissions(
        &self,
        id: RoleId,
        permissions: &[PermissionId],
    ) -> Result<Vec<Permission>> {
        let granted = self.graph.replace_role_permissions(id, permissions).await?;
        info!(
            role_id = %id,
            permission_count = granted.len(),
            "Role permissions replaced"
        );
        Ok(granted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        let new = NewPermission {
            name: validate_name("permission", &new.name)?,
            description: normalize_description(new.description)?,
        };
        let permission = self.graph.create_permission(new).await?;
        info!(permission_id = %permission.id, name = %permission.name, "Permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: PermissionId) -> Result<Permission> {
        self.graph
            .find_permission(id)
            .await?
            .ok_or_else(|| WardenError::not_found("permission", id.to_string()))
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.graph.list_permissions().await
    }

    pub async fn update_permission(
        &self,
        id: PermissionId,
        update: PermissionUpdate,
    ) -> Result<Permission> {
        let update = PermissionUpdate {
            name: update
                .name
                .map(|n| validate_name("permission", &n))
                .transpose()?,
            description: normalize_description(update.description)?,
        };
        if update.is_empty() {
            return self.get_permission(id).await;
        }
        let permission = self.graph.update_permission(id, update).await?;
        info!(permission_id = %permission.id, name = %permission.name, "Permission updated");
        Ok(permission)
    }

    pub async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        self.graph.delete_permission(id).await?;
        info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity ↔ Role
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn roles_of_identity(&self, identity: IdentityId) -> Result<Vec<Role>> {
        self.graph.roles_of_identity(identity).await
    }

    pub async fn assign_role(&self, identity: IdentityId, role: RoleId) -> Result<()> {
        self.graph.assign_role(identity, role).await?;
        info!(identity_id = %identity, role_id = %role, "Role assigned");
        Ok(())
    }

    pub async fn revoke_role(&self, identity: IdentityId, role: RoleId) -> Result<bool> {
        let removed = self.graph.revoke_role(identity, role).await?;
        info!(identity_id = %identity, role_id = %role, removed, "Role revoked");
        Ok(removed)
    }
}

/// Trim a role or permission name and reject empty or oversized ones.
pub fn validate_name(kind: &'static str, raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(WardenError::validation(format!("{} name must not be empty", kind))
            .with_context("field", "name"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(WardenError::validation(format!(
            "{} name must be at most {} characters",
            kind, MAX_NAME_LEN
        ))
        .with_context("field", "name"));
    }
    Ok(name.to_string())
}

fn normalize_description(raw: Option<String>) -> Result<Option<String>> {
    let Some(raw) = raw else { return Ok(None) };
    let description = raw.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(WardenError::validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        ))
        .with_context("field", "description"));
    }
    Ok(Some(description.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::ErrorCode;

    fn admin() -> RoleAdmin {
        RoleAdmin::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("role", "  Admin ").unwrap(), "Admin");
        assert_eq!(
            validate_name("role", "   ").unwrap_err().code(),
            ErrorCode::ValidationError
        );
        assert!(validate_name("role", &"x".repeat(101)).is_err());
    }

    #[tokio::test]
    async fn test_create_role_trims_and_rejects_empty() {
        let admin = admin();
        let role = admin.create_role(NewRole::new("  Auditor  ")).await.unwrap();
        assert_eq!(role.name, "Auditor");

        let err = admin.create_role(NewRole::new("")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_duplicate_names_after_trim() {
        let admin = admin();
        admin.create_permission(NewPermission::new("upload_cv")).await.unwrap();
        let err = admin
            .create_permission(NewPermission::new(" upload_cv "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateName);
    }

    #[tokio::test]
    async fn test_empty_update_returns_current() {
        let admin = admin();
        let role = admin.create_role(NewRole::new("Kurir")).await.unwrap();
        let same = admin.update_role(role.id, RoleUpdate::default()).await.unwrap();
        assert_eq!(same, role);

        let err = admin
            .update_role(RoleId(999), RoleUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name() {
        let admin = admin();
        let role = admin.create_role(NewRole::new("Kurir")).await.unwrap();
        let err = admin
            .update_role(
                role.id,
                RoleUpdate {
                    name: Some("  ".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_get_missing_permission() {
        let err = admin().get_permission(PermissionId(5)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
