//! Warden CLI - command-line client for the Warden authorization server.
//!
//! Provides session, role, permission, user assignment, health, and
//! configuration commands.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use client::{ApiClient, ApiError};
use commands::{auth, config, health, permission, role, user};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Warden - role-based access control CLI
#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Warden - role-based access control",
    long_about = "CLI tool for managing Warden roles, permissions, and role assignments.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "WARDEN_API_URL")]
    api_url: Option<String>,

    /// Bearer token, overriding the one stored by `warden login`
    #[arg(long, global = true, env = "WARDEN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the issued token
    Login(auth::LoginArgs),

    /// Forget the stored token
    Logout,

    /// Show the current identity and its roles
    Whoami,

    /// Role management operations
    #[command(subcommand)]
    Role(role::RoleCommands),

    /// Permission management operations
    #[command(subcommand)]
    Permission(permission::PermissionCommands),

    /// User role assignments
    #[command(subcommand)]
    User(user::UserCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = cli.token.clone().or_else(config::load_token);

    let client = ApiClient::new(&api_url, token)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Login(args) => auth::login(args, &client, format).await,
        Commands::Logout => auth::logout(&client, format).await,
        Commands::Whoami => auth::whoami(&client, format).await,
        Commands::Role(cmd) => role::execute(cmd, &client, format).await,
        Commands::Permission(cmd) => permission::execute(cmd, &client, format).await,
        Commands::User(cmd) => user::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        if let Some(code) = e.downcast_ref::<ApiError>().and_then(ApiError::code) {
            match code {
                "MISSING_TOKEN" | "INVALID_TOKEN" => {
                    output::print_info("Run `warden login` to start a new session")
                }
                "FORBIDDEN" => output::print_info("Your roles do not grant this operation"),
                _ => {}
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
