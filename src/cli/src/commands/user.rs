//! User role assignment commands.

use anyhow::Result;
use clap::Subcommand;

use super::role::{Role, RoleRow};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum UserCommands {
    /// List the roles a user holds
    Roles {
        /// User ID
        user_id: i64,
    },

    /// Assign a role to a user
    Assign {
        /// User ID
        user_id: i64,
        /// Role ID
        role_id: i64,
    },

    /// Revoke a role from a user
    Revoke {
        /// User ID
        user_id: i64,
        /// Role ID
        role_id: i64,
    },
}

pub async fn execute(cmd: UserCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        UserCommands::Roles { user_id } => {
            let roles: Vec<Role> = client.get(&format!("/api/users/{}/roles", user_id)).await?;
            print_roles(roles, format);
        }

        UserCommands::Assign { user_id, role_id } => {
            let roles: Vec<Role> = client
                .post(
                    &format!("/api/users/{}/roles", user_id),
                    &serde_json::json!({ "role_id": role_id }),
                )
                .await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Role {} assigned to user {}", role_id, user_id));
            }
            print_roles(roles, format);
        }

        UserCommands::Revoke { user_id, role_id } => {
            client
                .delete(&format!("/api/users/{}/roles/{}", user_id, role_id))
                .await?;
            output::print_success(&format!("Role {} revoked from user {}", role_id, user_id));
        }
    }

    Ok(())
}

fn print_roles(roles: Vec<Role>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<RoleRow> = roles.into_iter().map(RoleRow::from).collect();
            output::print_list(&rows, format);
        }
        _ => output::print_item(&roles, format),
    }
}
