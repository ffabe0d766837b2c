//! `/api/permissions`: permission CRUD.

use axum::{
    extract::{Path, State},
    handler::Handler,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::{ApiResponse, AppState, Guards};
use crate::error::WardenError;
use crate::rbac::{NewPermission, PermissionId, PermissionUpdate};

pub(super) fn router(guards: &Guards) -> Router<AppState> {
    Router::new()
        .route(
            "/api/permissions",
            get(list_permissions).post(create_permission.layer(Guards::admin())),
        )
        .route(
            "/api/permissions/:id",
            get(get_permission)
                .put(update_permission.layer(Guards::admin()))
                .delete(delete_permission.layer(Guards::admin())),
        )
        .route_layer(guards.authenticated.clone())
}

async fn create_permission(
    State(state): State<AppState>,
    Json(req): Json<NewPermission>,
) -> Result<impl IntoResponse, WardenError> {
    let permission = state.admin.create_permission(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(permission))))
}

async fn list_permissions(State(state): State<AppState>) -> Result<impl IntoResponse, WardenError> {
    let permissions = state.admin.list_permissions().await?;
    Ok(Json(ApiResponse::success(permissions)))
}

async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<impl IntoResponse, WardenError> {
    let permission = state.admin.get_permission(id).await?;
    Ok(Json(ApiResponse::success(permission)))
}

async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    Json(update): Json<PermissionUpdate>,
) -> Result<impl IntoResponse, WardenError> {
    let permission = state.admin.update_permission(id, update).await?;
    Ok(Json(ApiResponse::success(permission)))
}

async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<StatusCode, WardenError> {
    state.admin.delete_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
