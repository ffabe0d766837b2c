//! Permission management commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// List permissions
    List,

    /// Show a permission
    Get {
        /// Permission ID
        id: i64,
    },

    /// Create a permission
    Create {
        /// Unique permission name, e.g. edit_employee
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Rename a permission or change its description
    Update {
        /// Permission ID
        id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a permission and revoke it from every role
    Delete {
        /// Permission ID
        id: i64,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct PermissionRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<Permission> for PermissionRow {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct PermissionBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

pub async fn execute(
    cmd: PermissionCommands,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        PermissionCommands::List => {
            let permissions: Vec<Permission> = client.get("/api/permissions").await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<PermissionRow> =
                        permissions.into_iter().map(PermissionRow::from).collect();
                    output::print_list(&rows, format);
                }
                _ => output::print_item(&permissions, format),
            }
        }

        PermissionCommands::Get { id } => {
            let permission: Permission = client.get(&format!("/api/permissions/{}", id)).await?;
            output::print_item(&permission, format);
        }

        PermissionCommands::Create { name, description } => {
            let permission: Permission = client
                .post(
                    "/api/permissions",
                    &PermissionBody {
                        name: Some(name),
                        description,
                    },
                )
                .await?;
            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "Permission '{}' created with ID {}",
                    permission.name, permission.id
                )),
                _ => output::print_item(&permission, format),
            }
        }

        PermissionCommands::Update {
            id,
            name,
            description,
        } => {
            let permission: Permission = client
                .put(
                    &format!("/api/permissions/{}", id),
                    &PermissionBody { name, description },
                )
                .await?;
            output::print_item(&permission, format);
        }

        PermissionCommands::Delete { id, force } => {
            if !force {
                output::print_info(
                    "This revokes the permission from every role. Use --force to confirm.",
                );
                return Ok(());
            }
            client.delete(&format!("/api/permissions/{}", id)).await?;
            output::print_success(&format!("Permission {} deleted", id));
        }
    }

    Ok(())
}
