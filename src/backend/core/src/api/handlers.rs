//! Operational endpoints: liveness and Prometheus metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = state.storage.health().await;
    let status = if storage.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if storage.healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "storage": storage,
        })),
    )
}

/// Prometheus text exposition, or 404 when metrics are disabled.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}
