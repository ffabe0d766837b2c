//! Health check command.
//!
//! Queries the `/health` endpoint and displays storage status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include storage backend details
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    match format {
        OutputFormat::Table => {
            output::print_header("Warden Health");
            output::print_detail("Status", status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }

            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if args.detailed {
                if let Some(storage) = health.get("storage") {
                    println!();
                    output::print_header("Storage");
                    if let Some(backend) = storage.get("backend").and_then(|v| v.as_str()) {
                        output::print_detail("Backend", backend);
                    }
                    if let Some(healthy) = storage.get("healthy").and_then(|v| v.as_bool()) {
                        output::print_detail("Healthy", &healthy.to_string());
                    }
                    if let Some(latency) = storage.get("latency_ms").and_then(|v| v.as_u64()) {
                        output::print_detail("Latency", &format!("{} ms", latency));
                    }
                }
            }

            if status == "healthy" {
                output::print_success("Server is healthy");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format),
    }

    if status != "healthy" {
        anyhow::bail!("server reported status '{}'", status);
    }
    Ok(())
}
