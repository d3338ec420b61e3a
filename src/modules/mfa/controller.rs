use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::response::ApiResponse;
use crate::validator::ValidatedJson;

use super::model::{
    ConfirmTwoFactorRequest, ConfirmTwoFactorResponse, DisableTwoFactorRequest,
    EnableTwoFactorResponse, TwoFactorStatusResponse,
};
use super::service::TwoFactorService;

/// Second-factor enrollment status
#[utoipa::path(
    get,
    path = "/api/v1/auth/2fa/status",
    responses(
        (status = 200, description = "Current enrollment status", body = TwoFactorStatusResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Two-factor"
)]
#[instrument(skip(state))]
pub async fn twofa_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<TwoFactorStatusResponse>>, AppError> {
    let status = TwoFactorService::status(&state.db, auth_user.user_id()?).await?;
    Ok(Json(ApiResponse::ok("Two-factor status", status)))
}

/// Begin second-factor enrollment
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/enable",
    responses(
        (status = 200, description = "Candidate secret and QR code", body = EnableTwoFactorResponse),
        (status = 400, description = "Already enabled"),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Two-factor"
)]
#[instrument(skip(state))]
pub async fn enable_twofa(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<EnableTwoFactorResponse>>, AppError> {
    let response = TwoFactorService::provision(&state.db, auth_user.user_id()?).await?;
    Ok(Json(ApiResponse::ok(
        "Scan the QR code, then confirm with a generated code",
        response,
    )))
}

/// Confirm enrollment with a TOTP
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/confirm",
    request_body = ConfirmTwoFactorRequest,
    responses(
        (status = 200, description = "Enabled; backup codes shown once", body = ConfirmTwoFactorResponse),
        (status = 400, description = "Invalid code or no pending secret"),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Two-factor"
)]
#[instrument(skip(state, dto))]
pub async fn confirm_twofa(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(dto): ValidatedJson<ConfirmTwoFactorRequest>,
) -> Result<Json<ApiResponse<ConfirmTwoFactorResponse>>, AppError> {
    let response =
        TwoFactorService::confirm(&state.db, auth_user.user_id()?, &dto.code).await?;
    Ok(Json(ApiResponse::ok(
        "Two-factor enabled. Store these backup codes now, they will not be shown again",
        response,
    )))
}

/// Disable the second factor
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/disable",
    request_body = DisableTwoFactorRequest,
    responses(
        (status = 204, description = "Disabled"),
        (status = 400, description = "Invalid code"),
        (status = 401, description = "Invalid credentials")
    ),
    security(("bearer_auth" = [])),
    tag = "Two-factor"
)]
#[instrument(skip(state, dto))]
pub async fn disable_twofa(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(dto): ValidatedJson<DisableTwoFactorRequest>,
) -> Result<StatusCode, AppError> {
    TwoFactorService::disable(&state.db, auth_user.user_id()?, &dto.password, &dto.code).await?;
    Ok(StatusCode::NO_CONTENT)
}
