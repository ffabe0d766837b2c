//! Postgres implementation of [`IdentityRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Database;
use crate::error::{Result, WardenError};
use crate::identity::{
    CredentialHash, Identity, IdentityId, IdentityRepository, NewIdentity, ProfileUpdate,
};
use crate::rbac::graph::dedup_ids;
use crate::rbac::models::{Permission, PermissionId, Principal, Role, RoleGrant, RoleId};

const IDENTITY_COLUMNS: &str =
    "id, email, username, first_name, last_name, password_hash, created_at, updated_at";

#[derive(Debug, FromRow)]
struct IdentityRow {
    id: IdentityId,
    email: String,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Identity {
            id: row.id,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            credential: CredentialHash::from_phc(row.password_hash),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// One row of the identity ⟕ roles ⟕ permissions join.
#[derive(Debug, FromRow)]
struct PrincipalRow {
    #[sqlx(flatten)]
    identity: IdentityRow,
    role_id: Option<RoleId>,
    role_name: Option<String>,
    role_description: Option<String>,
    role_created_at: Option<DateTime<Utc>>,
    role_updated_at: Option<DateTime<Utc>>,
    permission_id: Option<PermissionId>,
    permission_name: Option<String>,
    permission_description: Option<String>,
    permission_created_at: Option<DateTime<Utc>>,
    permission_updated_at: Option<DateTime<Utc>>,
}

impl PrincipalRow {
    fn role(&self) -> Option<Role> {
        Some(Role {
            id: self.role_id?,
            name: self.role_name.clone()?,
            description: self.role_description.clone(),
            created_at: self.role_created_at?,
            updated_at: self.role_updated_at?,
        })
    }

    fn permission(&self) -> Option<Permission> {
        Some(Permission {
            id: self.permission_id?,
            name: self.permission_name.clone()?,
            description: self.permission_description.clone(),
            created_at: self.permission_created_at?,
            updated_at: self.permission_updated_at?,
        })
    }
}

/// Fold join rows (ordered by assignment, then grant) into a principal.
fn fold_principal(rows: Vec<PrincipalRow>) -> Option<Principal> {
    let mut grants: Vec<RoleGrant> = Vec::new();
    for row in &rows {
        let Some(role) = row.role() else { continue };
        let permission = row.permission();
        match grants.iter_mut().find(|g| g.role.id == role.id) {
            Some(grant) => grant.permissions.extend(permission),
            None => grants.push(RoleGrant {
                role,
                permissions: permission.into_iter().collect(),
            }),
        }
    }
    let identity = rows.into_iter().next()?.identity;
    Some(Principal::new(identity.into(), grants))
}

/// Translate unique violations on the identity table into domain errors.
fn identity_conflict(error: sqlx::Error, username: Option<&str>) -> WardenError {
    if let sqlx::Error::Database(db_err) = &error {
        match db_err.constraint() {
            Some("identities_email_key") => return WardenError::email_taken(),
            Some("identities_username_key") => {
                return WardenError::duplicate_name("username", username.unwrap_or_default())
            }
            _ => {}
        }
    }
    WardenError::from(error)
}

#[async_trait]
impl IdentityRepository for Database {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM identities WHERE id = $1",
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Identity::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM identities WHERE email = $1",
            IDENTITY_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Identity::from))
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            INSERT INTO identities (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        ))
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.credential.as_phc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| identity_conflict(e, new.username.as_deref()))?;

        for role in dedup_ids(&new.initial_roles) {
            let inserted = sqlx::query(
                r#"
                INSERT INTO identity_roles (identity_id, role_id)
                SELECT $1, id FROM roles WHERE id = $2
                "#,
            )
            .bind(row.id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                // Dropping the transaction rolls the insert back.
                return Err(WardenError::not_found("role", role.to_string()));
            }
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn update_profile(&self, id: IdentityId, update: ProfileUpdate) -> Result<Identity> {
        if update.is_empty() {
            return self
                .find_by_id(id)
                .await?
                .ok_or_else(|| WardenError::not_found("identity", id.to_string()));
        }

        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            UPDATE identities
            SET username   = COALESCE($2, username),
                first_name = COALESCE($3, first_name),
                last_name  = COALESCE($4, last_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .bind(&update.username)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| identity_conflict(e, update.username.as_deref()))?;

        row.map(Identity::from)
            .ok_or_else(|| WardenError::not_found("identity", id.to_string()))
    }

    async fn resolve_principal(&self, id: IdentityId) -> Result<Option<Principal>> {
        let rows = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT i.id, i.email, i.username, i.first_name, i.last_name, i.password_hash,
                   i.created_at, i.updated_at,
                   r.id AS role_id, r.name AS role_name, r.description AS role_description,
                   r.created_at AS role_created_at, r.updated_at AS role_updated_at,
                   p.id AS permission_id, p.name AS permission_name,
                   p.description AS permission_description,
                   p.created_at AS permission_created_at, p.updated_at AS permission_updated_at
            FROM identities i
            LEFT JOIN identity_roles ir ON ir.identity_id = i.id
            LEFT JOIN roles r ON r.id = ir.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE i.id = $1
            ORDER BY ir.seq NULLS FIRST, rp.seq NULLS FIRST
            "#,
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(fold_principal(rows))
    }
}
