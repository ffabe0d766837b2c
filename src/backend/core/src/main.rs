//! Warden Server - Main entry point

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use warden_core::{
    api::{self, AppState, RouterOptions},
    config::Config,
    db::Storage,
    middleware::rate_limit::start_cleanup_task,
    rbac::seed_defaults,
    telemetry::{init_telemetry, TelemetryConfig},
};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;

    let metrics = init_telemetry(&TelemetryConfig {
        logging: config.logging.clone(),
        metrics: config.metrics.clone(),
    })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.storage.backend,
        "Starting Warden Server"
    );

    let storage = Storage::from_config(&config).await?;
    tracing::info!(backend = storage.health().await.backend, "Storage ready");

    let state = AppState::new(&config, storage, metrics)?;

    if config.seed.enabled {
        seed_defaults(state.admin.graph().as_ref()).await?;
        if let Some(password) = config.seed.admin_password.as_deref() {
            let created = state
                .account
                .ensure_admin(&config.seed.admin_email, password)
                .await?;
            tracing::info!(email = %config.seed.admin_email, created, "Admin account ensured");
        }
    }

    let options = RouterOptions::from_config(&config);
    start_cleanup_task(options.limiters(), RATE_LIMIT_CLEANUP_INTERVAL);

    let app = api::build_router(state, options);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(address = %address, "Starting HTTP server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
