//! `/api/users/:id/roles`: role assignment.

use axum::{
    extract::{Path, State},
    handler::Handler,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiResponse, AppState, Guards};
use crate::error::WardenError;
use crate::identity::IdentityId;
use crate::rbac::RoleId;

/// Body of `POST /api/users/:id/roles`.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

pub(super) fn router(guards: &Guards) -> Router<AppState> {
    Router::new()
        .route(
            "/api/users/:id/roles",
            get(roles_of_user.layer(Guards::admin_or_manager()))
                .post(assign_role.layer(Guards::admin())),
        )
        .route(
            "/api/users/:id/roles/:role_id",
            delete(revoke_role.layer(Guards::admin())),
        )
        .route_layer(guards.authenticated.clone())
}

async fn roles_of_user(
    State(state): State<AppState>,
    Path(id): Path<IdentityId>,
) -> Result<impl IntoResponse, WardenError> {
    let roles = state.admin.roles_of_identity(id).await?;
    Ok(Json(ApiResponse::success(roles)))
}

/// Assigning a role the identity already holds succeeds without change.
async fn assign_role(
    State(state): State<AppState>,
    Path(id): Path<IdentityId>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<impl IntoResponse, WardenError> {
    state.admin.assign_role(id, req.role_id).await?;
    let roles = state.admin.roles_of_identity(id).await?;
    Ok(Json(ApiResponse::success(roles)))
}

async fn revoke_role(
    State(state): State<AppState>,
    Path((id, role_id)): Path<(IdentityId, RoleId)>,
) -> Result<StatusCode, WardenError> {
    state.admin.revoke_role(id, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
