//! `/api/roles`: role CRUD and role permission sets.
//!
//! Every route sits behind the admin rate limit and the authentication gate.
//! Reads of a single role are open to any authenticated caller, listing needs
//! `Admin` or `Manager`, and writes need `Admin`.

use axum::{
    extract::{Path, State},
    handler::Handler,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::{ApiResponse, AppState, Guards};
use crate::error::WardenError;
use crate::rbac::{NewRole, PermissionId, RoleId, RoleUpdate};

/// Body of `PUT /api/roles/:id/permissions`.
#[derive(Debug, Deserialize)]
pub struct ReplacePermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

pub(super) fn router(guards: &Guards) -> Router<AppState> {
    Router::new()
        .route(
            "/api/roles",
            get(list_roles.layer(Guards::admin_or_manager()))
                .post(create_role.layer(Guards::admin())),
        )
        .route(
            "/api/roles/:id",
            get(get_role)
                .put(update_role.layer(Guards::admin()))
                .delete(delete_role.layer(Guards::admin())),
        )
        .route(
            "/api/roles/:id/permissions",
            get(role_permissions).put(replace_permissions.layer(Guards::admin())),
        )
        .route_layer(guards.authenticated.clone())
        .route_layer(guards.admin_rate_limit.clone())
}

async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<NewRole>,
) -> Result<impl IntoResponse, WardenError> {
    let role = state.admin.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(role))))
}

async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse, WardenError> {
    let roles = state.admin.list_roles().await?;
    Ok(Json(ApiResponse::success(roles)))
}

async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<impl IntoResponse, WardenError> {
    let role = state.admin.get_role(id).await?;
    Ok(Json(ApiResponse::success(role)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, WardenError> {
    let role = state.admin.update_role(id, update).await?;
    Ok(Json(ApiResponse::success(role)))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<StatusCode, WardenError> {
    state.admin.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn role_permissions(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<impl IntoResponse, WardenError> {
    let permissions = state.admin.permissions_of_role(id).await?;
    Ok(Json(ApiResponse::success(permissions)))
}

async fn replace_permissions(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(req): Json<ReplacePermissionsRequest>,
) -> Result<impl IntoResponse, WardenError> {
    let permissions = state
        .admin
        .replace_role_permissions(id, &req.permission_ids)
        .await?;
    Ok(Json(ApiResponse::success(permissions)))
}
