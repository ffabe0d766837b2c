//! `/api/auth`: registration, login, logout, and the caller's own profile.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use super::{ApiResponse, AppState, Guards, MessageResponse};
use crate::auth::{LoginRequest, RegisterRequest};
use crate::error::WardenError;
use crate::identity::ProfileUpdate;
use crate::rbac::Principal;

pub(super) fn router(guards: &Guards) -> Router<AppState> {
    let public = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route_layer(guards.auth_rate_limit.clone());

    let authenticated = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me).put(update_me))
        .route_layer(guards.authenticated.clone());

    public.merge(authenticated)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, WardenError> {
    let identity = state.account.register(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(identity))))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, WardenError> {
    let token = state.account.login(&req.email, &req.password).await?;
    Ok(Json(ApiResponse::success(token)))
}

async fn logout(State(state): State<AppState>, principal: Principal) -> impl IntoResponse {
    tracing::info!(identity_id = %principal.id(), "Logged out");
    Json(ApiResponse::success(MessageResponse {
        message: state.account.logout_message(),
    }))
}

async fn me(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, WardenError> {
    let profile = state.account.me(principal.id()).await?;
    Ok(Json(ApiResponse::success(profile)))
}

async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, WardenError> {
    let identity = state.account.update_profile(principal.id(), update).await?;
    Ok(Json(ApiResponse::success(identity)))
}
