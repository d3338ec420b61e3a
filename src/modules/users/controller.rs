use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::middleware::role::RequireAdmin;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::pagination::{PaginationMeta, PaginationParams};
use crate::utils::response::ApiResponse;
use crate::validator::ValidatedJson;

use super::model::{ActivationRequest, PublicUser, UpdateProfileRequest, UpdateRoleRequest};
use super::service::UserService;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
    pub meta: PaginationMeta,
}

/// Own profile
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Caller's profile", body = PublicUser),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let user = UserService::get_by_id(&state.db, auth_user.user_id()?).await?;
    Ok(Json(ApiResponse::ok("Profile", user.into())))
}

/// Update own profile
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = PublicUser),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state, dto))]
pub async fn update_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(dto): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let user = UserService::update_profile(&state.db, auth_user.user_id()?, dto).await?;
    Ok(Json(ApiResponse::ok("Profile updated", user.into())))
}

/// List users (admin)
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, max 100"),
        ("page" = Option<i64>, Query, description = "1-based page number")
    ),
    responses(
        (status = 200, description = "Paginated users", body = UserListResponse),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<UserListResponse>>, AppError> {
    let (users, meta) = UserService::list(&state.db, &pagination).await?;
    Ok(Json(ApiResponse::ok("Users", UserListResponse { users, meta })))
}

/// Change a user's role (admin)
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}/role",
    params(("id" = Uuid, Path, description = "Public user id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = PublicUser),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn update_role(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(dto): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let user = UserService::set_role(&state.db, id, dto.role).await?;
    Ok(Json(ApiResponse::ok("Role updated", user.into())))
}

/// Activate or deactivate a user (admin)
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}/activation",
    params(("id" = Uuid, Path, description = "Public user id")),
    request_body = ActivationRequest,
    responses(
        (status = 200, description = "Updated user; sessions revoked on deactivation", body = PublicUser),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn update_activation(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(dto): Json<ActivationRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let user = UserService::set_activation(&state.db, id, dto.is_active).await?;
    Ok(Json(ApiResponse::ok("Activation updated", user.into())))
}
