//! Postgres implementation of [`RoleGraph`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use super::Database;
use crate::error::{Result, WardenError};
use crate::identity::IdentityId;
use crate::rbac::graph::{dedup_ids, RoleGraph};
use crate::rbac::models::{
    NewPermission, NewRole, Permission, PermissionId, PermissionUpdate, Role, RoleId, RoleUpdate,
};

#[derive(Debug, FromRow)]
struct NamedRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NamedRow> for Role {
    fn from(row: NamedRow) -> Self {
        Role {
            id: RoleId(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<NamedRow> for Permission {
    fn from(row: NamedRow) -> Self {
        Permission {
            id: PermissionId(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Unique violations on a name column become `DuplicateName` for `entity`.
fn name_conflict(error: sqlx::Error, entity: &'static str, name: &str) -> WardenError {
    match &error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            WardenError::duplicate_name(entity, name)
        }
        _ => WardenError::from(error),
    }
}

async fn require(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> Result<()> {
    // `table` is always one of our own literals.
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
        table
    ))
    .bind(id)
    .fetch_one(conn)
    .await?;
    if exists {
        Ok(())
    } else {
        Err(WardenError::not_found(entity, id.to_string()))
    }
}

async fn permissions_in_grant_order(
    conn: &mut PgConnection,
    role: RoleId,
) -> Result<Vec<Permission>> {
    let rows = sqlx::query_as::<_, NamedRow>(
        r#"
        SELECT p.id, p.name, p.description, p.created_at, p.updated_at
        FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = $1
        ORDER BY rp.seq
        "#,
    )
    .bind(role)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Permission::from).collect())
}

#[async_trait]
impl RoleGraph for Database {
    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_role(&self, new: NewRole) -> Result<Role> {
        let row = sqlx::query_as::<_, NamedRow>(
            r#"
            INSERT INTO roles (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(self.pool())
        .await
        .map_err(|e| name_conflict(e, "role", &new.name))?;
        Ok(row.into())
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Role::from))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Role::from))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role> {
        let name = update.name.clone().unwrap_or_default();
        let row = sqlx::query_as::<_, NamedRow>(
            r#"
            UPDATE roles
            SET name        = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at  = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| name_conflict(e, "role", &name))?;
        row.map(Role::from)
            .ok_or_else(|| WardenError::not_found("role", id.to_string()))
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::not_found("role", id.to_string()));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        let row = sqlx::query_as::<_, NamedRow>(
            r#"
            INSERT INTO permissions (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(self.pool())
        .await
        .map_err(|e| name_conflict(e, "permission", &new.name))?;
        Ok(row.into())
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        let row = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM permissions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Permission::from))
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let row = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM permissions WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Permission::from))
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let rows = sqlx::query_as::<_, NamedRow>(
            "SELECT id, name, description, created_at, updated_at FROM permissions ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        update: PermissionUpdate,
    ) -> Result<Permission> {
        let name = update.name.clone().unwrap_or_default();
        let row = sqlx::query_as::<_, NamedRow>(
            r#"
            UPDATE permissions
            SET name        = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at  = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| name_conflict(e, "permission", &name))?;
        row.map(Permission::from)
            .ok_or_else(|| WardenError::not_found("permission", id.to_string()))
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::not_found("permission", id.to_string()));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Associations
    // ─────────────────────────────────────────────────────────────────────────

    async fn roles_of_identity(&self, identity: IdentityId) -> Result<Vec<Role>> {
        let mut conn = self.pool().acquire().await?;
        require(&mut conn, "identities", "identity", identity.as_i64()).await?;
        let rows = sqlx::query_as::<_, NamedRow>(
            r#"
            SELECT r.id, r.name, r.description, r.created_at, r.updated_at
            FROM identity_roles ir
            JOIN roles r ON r.id = ir.role_id
            WHERE ir.identity_id = $1
            ORDER BY ir.seq
            "#,
        )
        .bind(identity)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn permissions_of_role(&self, role: RoleId) -> Result<Vec<Permission>> {
        let mut conn = self.pool().acquire().await?;
        require(&mut conn, "roles", "role", role.as_i64()).await?;
        permissions_in_grant_order(&mut conn, role).await
    }

    async fn assign_role(&self, identity: IdentityId, role: RoleId) -> Result<()> {
        let mut conn = self.pool().acquire().await?;
        require(&mut conn, "identities", "identity", identity.as_i64()).await?;
        require(&mut conn, "roles", "role", role.as_i64()).await?;
        sqlx::query(
            r#"
            INSERT INTO identity_roles (identity_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (identity_id, role_id) DO NOTHING
            "#,
        )
        .bind(identity)
        .bind(role)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn revoke_role(&self, identity: IdentityId, role: RoleId) -> Result<bool> {
        let mut conn = self.pool().acquire().await?;
        require(&mut conn, "identities", "identity", identity.as_i64()).await?;
        require(&mut conn, "roles", "role", role.as_i64()).await?;
        let result =
            sqlx::query("DELETE FROM identity_roles WHERE identity_id = $1 AND role_id = $2")
                .bind(identity)
                .bind(role)
                .execute(&mut *conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_role_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> Result<Vec<Permission>> {
        let wanted = dedup_ids(permissions);
        let mut tx = self.pool().begin().await?;

        // Lock the role row so concurrent replaces serialize.
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
                .bind(role)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(WardenError::not_found("role", role.to_string()));
        }
        for permission in &wanted {
            require(&mut tx, "permissions", "permission", permission.as_i64()).await?;
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role)
            .execute(&mut *tx)
            .await?;
        for permission in &wanted {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(role)
                .bind(*permission)
                .execute(&mut *tx)
                .await?;
        }

        let granted = permissions_in_grant_order(&mut tx, role).await?;
        tx.commit().await?;
        Ok(granted)
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> Result<()> {
        let mut conn = self.pool().acquire().await?;
        require(&mut conn, "roles", "role", role.as_i64()).await?;
        require(&mut conn, "permissions", "permission", permission.as_i64()).await?;
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role)
        .bind(permission)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
