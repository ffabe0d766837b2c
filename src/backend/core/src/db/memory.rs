//! In-process storage backend.
//!
//! Holds every table behind one lock so that multi-row operations (create
//! with roles, permission set-replace, cascading deletes) are atomic. Used by
//! the `memory` storage backend and throughout the test suite.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Result, WardenError};
use crate::identity::{Identity, IdentityId, IdentityRepository, NewIdentity, ProfileUpdate};
use crate::rbac::graph::{dedup_ids, RoleGraph};
use crate::rbac::models::{
    NewPermission, NewRole, Permission, PermissionId, PermissionUpdate, Principal, Role,
    RoleGrant, RoleId, RoleUpdate,
};

#[derive(Debug, Default)]
struct Tables {
    next_identity: i64,
    next_role: i64,
    next_permission: i64,
    identities: Vec<Identity>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    /// Assignment order is preserved.
    identity_roles: Vec<(IdentityId, RoleId)>,
    /// Grant order is preserved.
    role_permissions: Vec<(RoleId, PermissionId)>,
}

impl Tables {
    fn identity(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.iter().find(|i| i.id == id)
    }

    fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    fn permission(&self, id: PermissionId) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.id == id)
    }

    fn require_identity(&self, id: IdentityId) -> Result<&Identity> {
        self.identity(id)
            .ok_or_else(|| WardenError::not_found("identity", id.to_string()))
    }

    fn require_role(&self, id: RoleId) -> Result<&Role> {
        self.role(id)
            .ok_or_else(|| WardenError::not_found("role", id.to_string()))
    }

    fn require_permission(&self, id: PermissionId) -> Result<&Permission> {
        self.permission(id)
            .ok_or_else(|| WardenError::not_found("permission", id.to_string()))
    }

    fn permissions_of(&self, role: RoleId) -> Vec<Permission> {
        self.role_permissions
            .iter()
            .filter(|(r, _)| *r == role)
            .filter_map(|(_, p)| self.permission(*p).cloned())
            .collect()
    }

    fn roles_of(&self, identity: IdentityId) -> Vec<Role> {
        self.identity_roles
            .iter()
            .filter(|(i, _)| *i == identity)
            .filter_map(|(_, r)| self.role(*r).cloned())
            .collect()
    }
}

/// Storage backend that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identities
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>> {
        Ok(self.tables.read().identity(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        Ok(self
            .tables
            .read()
            .identities
            .iter()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity> {
        let mut tables = self.tables.write();

        if tables.identities.iter().any(|i| i.email == new.email) {
            return Err(WardenError::email_taken());
        }
        if let Some(username) = new.username.as_deref() {
            if tables
                .identities
                .iter()
                .any(|i| i.username.as_deref() == Some(username))
            {
                return Err(WardenError::duplicate_name("username", username));
            }
        }
        let initial_roles = dedup_ids(&new.initial_roles);
        for role in &initial_roles {
            tables.require_role(*role)?;
        }

        tables.next_identity += 1;
        let now = Utc::now();
        let identity = Identity {
            id: IdentityId(tables.next_identity),
            email: new.email,
            username: new.username,
            first_name: new.first_name,
            last_name: new.last_name,
            credential: new.credential,
            created_at: now,
            updated_at: now,
        };
        tables.identities.push(identity.clone());
        for role in initial_roles {
            tables.identity_roles.push((identity.id, role));
        }
        Ok(identity)
    }

    async fn update_profile(&self, id: IdentityId, update: ProfileUpdate) -> Result<Identity> {
        let mut tables = self.tables.write();
        tables.require_identity(id)?;
        if update.is_empty() {
            return tables.require_identity(id).cloned();
        }

        if let Some(username) = update.username.as_deref() {
            if tables
                .identities
                .iter()
                .any(|i| i.id != id && i.username.as_deref() == Some(username))
            {
                return Err(WardenError::duplicate_name("username", username));
            }
        }

        let identity = tables
            .identities
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| WardenError::not_found("identity", id.to_string()))?;
        if let Some(username) = update.username {
            identity.username = Some(username);
        }
        if let Some(first_name) = update.first_name {
            identity.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            identity.last_name = Some(last_name);
        }
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }

    async fn resolve_principal(&self, id: IdentityId) -> Result<Option<Principal>> {
        let tables = self.tables.read();
        let Some(identity) = tables.identity(id).cloned() else {
            return Ok(None);
        };
        let grants = tables
            .roles_of(id)
            .into_iter()
            .map(|role| RoleGrant {
                permissions: tables.permissions_of(role.id),
                role,
            })
            .collect();
        Ok(Some(Principal::new(identity, grants)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Graph
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl RoleGraph for MemoryStore {
    async fn create_role(&self, new: NewRole) -> Result<Role> {
        let mut tables = self.tables.write();
        if tables.roles.iter().any(|r| r.name == new.name) {
            return Err(WardenError::duplicate_name("role", new.name));
        }
        tables.next_role += 1;
        let now = Utc::now();
        let role = Role {
            id: RoleId(tables.next_role),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.tables.read().role(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self
            .tables
            .read()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.tables.read().roles.clone())
    }

    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role> {
        let mut tables = self.tables.write();
        tables.require_role(id)?;
        if let Some(name) = update.name.as_deref() {
            if tables.roles.iter().any(|r| r.id != id && r.name == name) {
                return Err(WardenError::duplicate_name("role", name));
            }
        }

        let role = tables
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| WardenError::not_found("role", id.to_string()))?;
        if let Some(name) = update.name {
            role.name = name;
        }
        if let Some(description) = update.description {
            role.description = Some(description);
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.require_role(id)?;
        tables.roles.retain(|r| r.id != id);
        tables.identity_roles.retain(|(_, r)| *r != id);
        tables.role_permissions.retain(|(r, _)| *r != id);
        Ok(())
    }

    async fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        let mut tables = self.tables.write();
        if tables.permissions.iter().any(|p| p.name == new.name) {
            return Err(WardenError::duplicate_name("permission", new.name));
        }
        tables.next_permission += 1;
        let now = Utc::now();
        let permission = Permission {
            id: PermissionId(tables.next_permission),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        tables.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        Ok(self.tables.read().permission(id).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        Ok(self
            .tables
            .read()
            .permissions
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self.tables.read().permissions.clone())
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        update: PermissionUpdate,
    ) -> Result<Permission> {
        let mut tables = self.tables.write();
        tables.require_permission(id)?;
        if let Some(name) = update.name.as_deref() {
            if tables.permissions.iter().any(|p| p.id != id && p.name == name) {
                return Err(WardenError::duplicate_name("permission", name));
            }
        }

        let permission = tables
            .permissions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| WardenError::not_found("permission", id.to_string()))?;
        if let Some(name) = update.name {
            permission.name = name;
        }
        if let Some(description) = update.description {
            permission.description = Some(description);
        }
        permission.updated_at = Utc::now();
        Ok(permission.clone())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.require_permission(id)?;
        tables.permissions.retain(|p| p.id != id);
        tables.role_permissions.retain(|(_, p)| *p != id);
        Ok(())
    }

    async fn roles_of_identity(&self, identity: IdentityId) -> Result<Vec<Role>> {
        let tables = self.tables.read();
        tables.require_identity(identity)?;
        Ok(tables.roles_of(identity))
    }

    async fn permissions_of_role(&self, role: RoleId) -> Result<Vec<Permission>> {
        let tables = self.tables.read();
        tables.require_role(role)?;
        Ok(tables.permissions_of(role))
    }

    async fn assign_role(&self, identity: IdentityId, role: RoleId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.require_identity(identity)?;
        tables.require_role(role)?;
        if !tables.identity_roles.contains(&(identity, role)) {
            tables.identity_roles.push((identity, role));
        }
        Ok(())
    }

    async fn revoke_role(&self, identity: IdentityId, role: RoleId) -> Result<bool> {
        let mut tables = self.tables.write();
        tables.require_identity(identity)?;
        tables.require_role(role)?;
        let before = tables.identity_roles.len();
        tables.identity_roles.retain(|pair| *pair != (identity, role));
        Ok(tables.identity_roles.len() != before)
    }

    async fn replace_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<Vec<Permission>> {
        let mut tables = self.tables.write();
        tables.require_role(role)?;
        let wanted = dedup_ids(permissions);
        for permission in &wanted {
            tables.require_permission(*permission)?;
        }

        tables.role_permissions.retain(|(r, _)| *r != role);
        tables
            .role_permissions
            .extend(wanted.into_iter().map(|p| (role, p)));
        Ok(tables.permissions_of(role))
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.require_role(role)?;
        tables.require_permission(permission)?;
        if !tables.role_permissions.contains(&(role, permission)) {
            tables.role_permissions.push((role, permission));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::identity::CredentialHash;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            username: None,
            first_name: None,
            last_name: None,
            credential: CredentialHash::from_phc("$argon2id$test"),
            initial_roles: vec![],
        }
    }

    async fn names(store: &MemoryStore, role: RoleId) -> Vec<String> {
        store
            .permissions_of_role(role)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect()
    }

    #[tokio::test]
    async fn test_create_identity_with_missing_role_leaves_nothing() {
        let store = MemoryStore::new();
        let mut new = new_identity("ada@example.com");
        new.initial_roles = vec![RoleId(42)];
        let err = store.create(new).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(store.find_by_email("ada@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_and_username() {
        let store = MemoryStore::new();
        let mut first = new_identity("ada@example.com");
        first.username = Some("ada".to_string());
        store.create(first).await.unwrap();

        let err = store.create(new_identity("ada@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailTaken);

        let mut second = new_identity("bob@example.com");
        second.username = Some("ada".to_string());
        let err = store.create(second).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateName);
    }

    #[tokio::test]
    async fn test_replace_is_atomic_on_missing_permission() {
        let store = MemoryStore::new();
        let role = store.create_role(NewRole::new("Manager")).await.unwrap();
        let view = store.create_permission(NewPermission::new("view_employee")).await.unwrap();
        store.grant_permission(role.id, view.id).await.unwrap();

        let err = store
            .replace_role_permissions(role.id, &[view.id, PermissionId(99)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(names(&store, role.id).await, vec!["view_employee"]);
    }

    #[tokio::test]
    async fn test_replace_keeps_requested_order() {
        let store = MemoryStore::new();
        let role = store.create_role(NewRole::new("Manager")).await.unwrap();
        let view = store.create_permission(NewPermission::new("view_employee")).await.unwrap();
        let edit = store.create_permission(NewPermission::new("edit_employee")).await.unwrap();

        let set = store
            .replace_role_permissions(role.id, &[edit.id, view.id, edit.id])
            .await
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(names(&store, role.id).await, vec!["edit_employee", "view_employee"]);

        store.replace_role_permissions(role.id, &[]).await.unwrap();
        assert!(names(&store, role.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_role_cascades() {
        let store = MemoryStore::new();
        let identity = store.create(new_identity("ada@example.com")).await.unwrap();
        let role = store.create_role(NewRole::new("Kurir")).await.unwrap();
        let perm = store.create_permission(NewPermission::new("upload_photo")).await.unwrap();
        store.assign_role(identity.id, role.id).await.unwrap();
        store.grant_permission(role.id, perm.id).await.unwrap();

        store.delete_role(role.id).await.unwrap();
        assert!(store.roles_of_identity(identity.id).await.unwrap().is_empty());
        assert!(store.find_permission(perm.id).await.unwrap().is_some());

        let err = store.delete_role(role.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_assign_is_idempotent_and_revoke_reports() {
        let store = MemoryStore::new();
        let identity = store.create(new_identity("ada@example.com")).await.unwrap();
        let role = store.create_role(NewRole::new("Employee")).await.unwrap();

        store.assign_role(identity.id, role.id).await.unwrap();
        store.assign_role(identity.id, role.id).await.unwrap();
        assert_eq!(store.roles_of_identity(identity.id).await.unwrap().len(), 1);

        assert!(store.revoke_role(identity.id, role.id).await.unwrap());
        assert!(!store.revoke_role(identity.id, role.id).await.unwrap());

        let err = store.assign_role(IdentityId(77), role.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_principal_groups_permissions_by_role() {
        let store = MemoryStore::new();
        let employee = store.create_role(NewRole::new("Employee")).await.unwrap();
        let view = store.create_permission(NewPermission::new("view_employee")).await.unwrap();
        store.grant_permission(employee.id, view.id).await.unwrap();

        let mut new = new_identity("ada@example.com");
        new.initial_roles = vec![employee.id];
        let identity = store.create(new).await.unwrap();

        let principal = store.resolve_principal(identity.id).await.unwrap().unwrap();
        assert_eq!(principal.grants.len(), 1);
        assert_eq!(principal.grants[0].permissions[0].name, "view_employee");
        assert!(store.resolve_principal(IdentityId(99)).await.unwrap().is_none());
    }
}
