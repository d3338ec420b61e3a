use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::modules::users::model::UserRole;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    /// Defaults to `athlete`. Admin accounts cannot be self-registered.
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Access + refresh pair as returned to clients. The same tokens are also
/// set as HTTP-only cookies for cookie-based clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub two_factor_required: bool,
}

/// Returned instead of tokens when the account has a second factor: the
/// password step passed, the TOTP step is still outstanding.
#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorChallengeResponse {
    pub two_factor_required: bool,
    pub pending_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPairResponse),
    TwoFactorRequired(TwoFactorChallengeResponse),
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorLoginRequest {
    #[validate(length(min = 1))]
    pub pending_token: String,
    /// A current TOTP or an unused backup code.
    #[validate(length(min = 6))]
    pub code: String,
}

/// Refresh token may arrive in the body or as a cookie; the cookie wins
/// when both are present.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequestDto {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetValidateRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordResetValidateResponse {
    /// Short-lived authorization for the confirm step.
    pub reset_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    #[validate(length(min = 1))]
    pub reset_token: String,
    #[validate(length(min = 1))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordChangeRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 1))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailVerifyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub code: String,
}
