use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::modules::auth::model::{
    EmailVerifyRequest, LoginRequest, LoginResponse, LogoutAllResponse, LogoutRequest,
    PasswordChangeRequest, PasswordResetConfirmRequest, PasswordResetRequestDto,
    PasswordResetValidateRequest, PasswordResetValidateResponse, RefreshRequest, RegisterRequest,
    TokenPairResponse, TwoFactorChallengeResponse, TwoFactorLoginRequest,
};
use crate::modules::mfa::model::{
    ConfirmTwoFactorRequest, ConfirmTwoFactorResponse, DisableTwoFactorRequest,
    EnableTwoFactorResponse, TwoFactorStatusResponse,
};
use crate::modules::sessions::model::SessionSummary;
use crate::modules::users::controller::UserListResponse;
use crate::modules::users::model::{
    ActivationRequest, PublicUser, UpdateProfileRequest, UpdateRoleRequest, UserRole,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::auth::controller::register,
        crate::modules::auth::controller::login,
        crate::modules::auth::controller::verify_two_factor_login,
        crate::modules::auth::controller::refresh,
        crate::modules::auth::controller::logout,
        crate::modules::auth::controller::logout_all,
        crate::modules::auth::controller::list_sessions,
        crate::modules::auth::controller::change_password,
        crate::modules::auth::controller::request_password_reset,
        crate::modules::auth::controller::validate_password_reset,
        crate::modules::auth::controller::confirm_password_reset,
        crate::modules::auth::controller::request_email_verification,
        crate::modules::auth::controller::verify_email,
        crate::modules::mfa::controller::twofa_status,
        crate::modules::mfa::controller::enable_twofa,
        crate::modules::mfa::controller::confirm_twofa,
        crate::modules::mfa::controller::disable_twofa,
        crate::modules::users::controller::get_me,
        crate::modules::users::controller::update_me,
        crate::modules::users::controller::list_users,
        crate::modules::users::controller::update_role,
        crate::modules::users::controller::update_activation,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            TokenPairResponse,
            TwoFactorChallengeResponse,
            TwoFactorLoginRequest,
            RefreshRequest,
            LogoutRequest,
            LogoutAllResponse,
            PasswordResetRequestDto,
            PasswordResetValidateRequest,
            PasswordResetValidateResponse,
            PasswordResetConfirmRequest,
            PasswordChangeRequest,
            EmailVerifyRequest,
            EnableTwoFactorResponse,
            ConfirmTwoFactorRequest,
            ConfirmTwoFactorResponse,
            DisableTwoFactorRequest,
            TwoFactorStatusResponse,
            SessionSummary,
            PublicUser,
            UserRole,
            UpdateProfileRequest,
            UpdateRoleRequest,
            ActivationRequest,
            UserListResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Sign-in, token lifecycle, sessions"),
        (name = "Two-factor", description = "TOTP enrollment and backup codes"),
        (name = "Password reset", description = "Code-based password recovery"),
        (name = "Email verification", description = "Prove control of an address"),
        (name = "Users", description = "Profiles and administration")
    ),
    info(
        title = "Stadion API",
        description = "User management backend for an athletics federation"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
