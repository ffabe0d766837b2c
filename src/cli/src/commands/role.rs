//! Role management commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use super::permission::{Permission, PermissionRow};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List roles (requires Admin or Manager)
    List,

    /// Show a role
    Get {
        /// Role ID
        id: i64,
    },

    /// Create a role
    Create {
        /// Unique role name
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Rename a role or change its description
    Update {
        /// Role ID
        id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a role and every assignment of it
    Delete {
        /// Role ID
        id: i64,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List the permissions a role grants
    Permissions {
        /// Role ID
        id: i64,
    },

    /// Replace a role's permissions with exactly the given set
    SetPermissions {
        /// Role ID
        id: i64,

        /// Permission IDs; pass none to clear the set
        #[arg(value_delimiter = ',')]
        permission_ids: Vec<i64>,
    },
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct RoleRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Permissions")]
    pub permissions: String,
}

impl From<Role> for RoleRow {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description.unwrap_or_default(),
            permissions: String::new(),
        }
    }
}

#[derive(Serialize)]
struct RoleBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: RoleCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        RoleCommands::List => {
            let roles: Vec<Role> = client.get("/api/roles").await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<RoleRow> = roles.into_iter().map(RoleRow::from).collect();
                    output::print_list(&rows, format);
                }
                _ => output::print_item(&roles, format),
            }
        }

        RoleCommands::Get { id } => {
            let role: Role = client.get(&format!("/api/roles/{}", id)).await?;
            print_role(&role, format);
        }

        RoleCommands::Create { name, description } => {
            let role: Role = client
                .post(
                    "/api/roles",
                    &RoleBody {
                        name: Some(name),
                        description,
                    },
                )
                .await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Role '{}' created with ID {}", role.name, role.id));
            }
            print_role(&role, format);
        }

        RoleCommands::Update {
            id,
            name,
            description,
        } => {
            let role: Role = client
                .put(&format!("/api/roles/{}", id), &RoleBody { name, description })
                .await?;
            print_role(&role, format);
        }

        RoleCommands::Delete { id, force } => {
            if !force {
                output::print_info(
                    "This removes the role from every user holding it. Use --force to confirm.",
                );
                return Ok(());
            }
            client.delete(&format!("/api/roles/{}", id)).await?;
            output::print_success(&format!("Role {} deleted", id));
        }

        RoleCommands::Permissions { id } => {
            let permissions: Vec<Permission> = client
                .get(&format!("/api/roles/{}/permissions", id))
                .await?;
            print_permissions(permissions, format);
        }

        RoleCommands::SetPermissions { id, permission_ids } => {
            let permissions: Vec<Permission> = client
                .put(
                    &format!("/api/roles/{}/permissions", id),
                    &serde_json::json!({ "permission_ids": permission_ids }),
                )
                .await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!(
                    "Role {} now grants {} permission(s)",
                    id,
                    permissions.len()
                ));
            }
            print_permissions(permissions, format);
        }
    }

    Ok(())
}

fn print_role(role: &Role, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Role: {}", role.name));
            output::print_detail("ID", &role.id.to_string());
            if let Some(description) = &role.description {
                output::print_detail("Description", description);
            }
            if let Some(created) = &role.created_at {
                output::print_detail("Created", created);
            }
            if let Some(updated) = &role.updated_at {
                output::print_detail("Updated", updated);
            }
        }
        _ => output::print_item(role, format),
    }
}

fn print_permissions(permissions: Vec<Permission>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<PermissionRow> =
                permissions.into_iter().map(PermissionRow::from).collect();
            output::print_list(&rows, format);
        }
        _ => output::print_item(&permissions, format),
    }
}
