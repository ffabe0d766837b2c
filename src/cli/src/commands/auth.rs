//! Session commands: login, logout, whoami.
//!
//! The token returned by login is kept in the CLI config file and sent as a
//! bearer token on later requests.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

use super::config;
use super::role::RoleRow;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct LoginArgs {
    /// Account email
    #[arg(short, long)]
    email: String,

    /// Password (prompted on stdin when omitted)
    #[arg(short, long)]
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
struct IssuedToken {
    token: String,
    token_type: String,
    expires_at: chrono::DateTime<chrono::Utc>,
    expires_in: i64,
}

#[derive(Debug, Deserialize, Serialize)]
struct Permission {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct RoleGrant {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Profile {
    id: i64,
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    roles: Vec<RoleGrant>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Message {
    message: String,
}

fn read_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn login(args: LoginArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let password = match args.password {
        Some(p) => p,
        None => read_password()?,
    };

    let issued: IssuedToken = client
        .post(
            "/api/auth/login",
            &LoginBody {
                email: &args.email,
                password: &password,
            },
        )
        .await?;
    config::store_token(&issued.token)?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("Logged in as {}", args.email));
            output::print_detail("Expires", &issued.expires_at.to_rfc3339());
        }
        _ => output::print_item(&issued, format),
    }
    Ok(())
}

pub async fn logout(client: &ApiClient, format: OutputFormat) -> Result<()> {
    // The server keeps no session; a rejected call still clears the local token.
    let server: Option<Message> = client
        .post("/api/auth/logout", &serde_json::json!({}))
        .await
        .ok();
    let removed = config::clear_token()?;

    match format {
        OutputFormat::Table => {
            if removed {
                output::print_success("Logged out");
            } else {
                output::print_info("No stored session");
            }
        }
        _ => output::print_item(
            &serde_json::json!({
                "removed": removed,
                "message": server.map(|m| m.message),
            }),
            format,
        ),
    }
    Ok(())
}

pub async fn whoami(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let profile: Profile = client.get("/api/auth/me").await?;

    match format {
        OutputFormat::Table => {
            output::print_header(&profile.email);
            output::print_detail("ID", &profile.id.to_string());
            if let Some(username) = &profile.username {
                output::print_detail("Username", username);
            }
            let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !name.is_empty() {
                output::print_detail("Name", &name);
            }

            let rows: Vec<RoleRow> = profile
                .roles
                .iter()
                .map(|r| RoleRow {
                    id: r.id,
                    name: r.name.clone(),
                    description: r.description.clone().unwrap_or_default(),
                    permissions: r
                        .permissions
                        .iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            output::print_header("Roles");
            output::print_list(&rows, format);
        }
        _ => output::print_item(&profile, format),
    }
    Ok(())
}
