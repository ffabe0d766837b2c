//! Default roles and permissions created at startup.
//!
//! | Role     | Permissions                                   |
//! |----------|-----------------------------------------------|
//! | Admin    | every default permission                      |
//! | Manager  | view_employee, edit_employee                  |
//! | Employee | view_employee                                 |
//! | Kurir    | none                                          |
//!
//! Seeding is idempotent: existing rows are reused, missing grants are added,
//! and nothing is ever removed.

use super::graph::RoleGraph;
use super::models::{NewPermission, NewRole, Permission, Role};
use crate::error::Result;
use tracing::info;

/// Default permissions as (name, description).
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    ("view_employee", "Permission to view employee details"),
    ("edit_employee", "Permission to edit employee details"),
    ("delete_employee", "Permission to delete an employee"),
    ("upload_cv", "Permission to upload CVs"),
    ("upload_photo", "Permission to upload employee photos"),
];

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRole {
    Admin,
    Employee,
    Manager,
    Kurir,
}

impl DefaultRole {
    pub const ALL: [DefaultRole; 4] = [Self::Admin, Self::Employee, Self::Manager, Self::Kurir];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Employee => "Employee",
            Self::Manager => "Manager",
            Self::Kurir => "Kurir",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full access to every resource",
            Self::Employee => "Read access to employee records",
            Self::Manager => "View and edit employee records",
            Self::Kurir => "Courier staff",
        }
    }

    /// Names of the permissions this role is granted by default.
    pub fn permissions(&self) -> Vec<&'static str> {
        match self {
            Self::Admin => DEFAULT_PERMISSIONS.iter().map(|(name, _)| *name).collect(),
            Self::Manager => vec!["view_employee", "edit_employee"],
            Self::Employee => vec!["view_employee"],
            Self::Kurir => vec![],
        }
    }
}

/// What a seeding pass created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: usize,
    pub permissions_created: usize,
}

/// Ensure every default role, permission, and grant exists.
pub async fn seed_defaults(graph: &dyn RoleGraph) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let mut permissions: Vec<Permission> = Vec::with_capacity(DEFAULT_PERMISSIONS.len());
    for (name, description) in DEFAULT_PERMISSIONS {
        let permission = match graph.find_permission_by_name(name).await? {
            Some(existing) => existing,
            None => {
                report.permissions_created += 1;
                graph
                    .create_permission(NewPermission::new(*name).with_description(*description))
                    .await?
            }
        };
        permissions.push(permission);
    }

    for default in DefaultRole::ALL {
        let role = ensure_role(graph, default, &mut report).await?;
        for wanted in default.permissions() {
            if let Some(permission) = permissions.iter().find(|p| p.name == wanted) {
                graph.grant_permission(role.id, permission.id).await?;
            }
        }
    }

    info!(
        roles_created = report.roles_created,
        permissions_created = report.permissions_created,
        "Default roles and permissions ensured"
    );
    Ok(report)
}

async fn ensure_role(
    graph: &dyn RoleGraph,
    default: DefaultRole,
    report: &mut SeedReport,
) -> Result<Role> {
    if let Some(existing) = graph.find_role_by_name(default.name()).await? {
        return Ok(existing);
    }
    report.roles_created += 1;
    graph
        .create_role(NewRole::new(default.name()).with_description(default.description()))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_default_role_permissions() {
        assert_eq!(DefaultRole::Admin.permissions().len(), DEFAULT_PERMISSIONS.len());
        assert_eq!(DefaultRole::Manager.permissions(), vec!["view_employee", "edit_employee"]);
        assert_eq!(DefaultRole::Employee.permissions(), vec!["view_employee"]);
        assert!(DefaultRole::Kurir.permissions().is_empty());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        let first = seed_defaults(&store).await.unwrap();
        assert_eq!(first.roles_created, 4);
        assert_eq!(first.permissions_created, 5);

        let second = seed_defaults(&store).await.unwrap();
        assert_eq!(second, SeedReport::default());

        assert_eq!(store.list_roles().await.unwrap().len(), 4);
        let admin = store.find_role_by_name("Admin").await.unwrap().unwrap();
        assert_eq!(store.permissions_of_role(admin.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_seed_keeps_extra_grants() {
        let store = MemoryStore::new();
        seed_defaults(&store).await.unwrap();

        let employee = store.find_role_by_name("Employee").await.unwrap().unwrap();
        let upload = store.find_permission_by_name("upload_cv").await.unwrap().unwrap();
        store.grant_permission(employee.id, upload.id).await.unwrap();

        seed_defaults(&store).await.unwrap();
        let names: Vec<String> = store
            .permissions_of_role(employee.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["view_employee", "upload_cv"]);
    }
}
