use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{instrument, warn};

use crate::middleware::auth::AuthUser;
use crate::modules::sessions::model::SessionSummary;
use crate::modules::users::model::PublicUser;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::response::ApiResponse;
use crate::validator::ValidatedJson;

use super::model::{
    EmailVerifyRequest, LoginRequest, LoginResponse, LogoutAllResponse, LogoutRequest,
    PasswordChangeRequest, PasswordResetConfirmRequest, PasswordResetRequestDto,
    PasswordResetValidateRequest, PasswordResetValidateResponse, RefreshRequest, RegisterRequest,
    TokenPairResponse, TwoFactorLoginRequest,
};
use super::service::{AuthService, LoginOutcome};

const ACCESS_COOKIE: &str = "access_token";
const REFRESH_COOKIE: &str = "refresh_token";

fn token_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie
}

fn set_token_cookies(jar: CookieJar, tokens: &TokenPairResponse, secure: bool) -> CookieJar {
    jar.add(token_cookie(
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        secure,
    ))
    .add(token_cookie(
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        secure,
    ))
}

fn clear_token_cookies(jar: CookieJar) -> CookieJar {
    let mut access = Cookie::new(ACCESS_COOKIE, "");
    access.set_path("/");
    let mut refresh = Cookie::new(REFRESH_COOKIE, "");
    refresh.set_path("/");
    jar.remove(access).remove(refresh)
}

/// Picks the refresh token out of cookie and/or body. The cookie wins
/// when both are present; the disagreement is logged for diagnostics.
fn extract_refresh_token(jar: &CookieJar, body: Option<String>) -> Result<String, AppError> {
    let cookie = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    match (cookie, body) {
        (Some(cookie), Some(_)) => {
            warn!("refresh token supplied in both cookie and body, preferring cookie");
            Ok(cookie)
        }
        (Some(cookie), None) => Ok(cookie),
        (None, Some(body)) => Ok(body),
        (None, None) => Err(AppError::RefreshInvalid),
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(255).collect())
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = PublicUser),
        (status = 400, description = "Validation or password policy failure"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, dto))]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), AppError> {
    let user = AuthService::register(&state, dto).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Account created", user)),
    ))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair, or a two-factor challenge", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, dto, jar))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ValidatedJson(dto): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<LoginResponse>>), AppError> {
    let agent = user_agent(&headers);

    match AuthService::login(&state, dto, agent.as_deref()).await? {
        LoginOutcome::Tokens(tokens) => {
            let jar = set_token_cookies(jar, &tokens, state.jwt_config.cookie_secure);
            Ok((
                jar,
                Json(ApiResponse::ok("Signed in", LoginResponse::Tokens(tokens))),
            ))
        }
        LoginOutcome::TwoFactorRequired(challenge) => Ok((
            jar,
            Json(ApiResponse::ok(
                "Two-factor code required",
                LoginResponse::TwoFactorRequired(challenge),
            )),
        )),
    }
}

/// Complete a two-factor sign-in
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/verify",
    request_body = TwoFactorLoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPairResponse),
        (status = 400, description = "Invalid code"),
        (status = 401, description = "Pending token invalid or expired"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, dto, jar))]
pub async fn verify_two_factor_login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ValidatedJson(dto): ValidatedJson<TwoFactorLoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPairResponse>>), AppError> {
    let agent = user_agent(&headers);
    let tokens = AuthService::verify_two_factor_login(&state, dto, agent.as_deref()).await?;
    let jar = set_token_cookies(jar, &tokens, state.jwt_config.cookie_secure);
    Ok((jar, Json(ApiResponse::ok("Signed in", tokens))))
}

/// Rotate a refresh token into a new pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair; the old refresh is revoked", body = TokenPairResponse),
        (status = 401, description = "Refresh invalid, expired, or replayed")
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, jar, body))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPairResponse>>), AppError> {
    let supplied = body.and_then(|Json(dto)| dto.refresh_token);
    let refresh_token = extract_refresh_token(&jar, supplied)?;

    let agent = user_agent(&headers);
    let tokens = AuthService::refresh(&state, &refresh_token, agent.as_deref()).await?;
    let jar = set_token_cookies(jar, &tokens, state.jwt_config.cookie_secure);
    Ok((jar, Json(ApiResponse::ok("Tokens rotated", tokens))))
}

/// Sign out of the current session
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Refresh token invalid")
    ),
    tag = "Authentication"
)]
#[instrument(skip(state, jar, body))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> Result<(CookieJar, StatusCode), AppError> {
    let supplied = body.and_then(|Json(dto)| dto.refresh_token);
    let refresh_token = extract_refresh_token(&jar, supplied)?;

    AuthService::logout(&state, &refresh_token).await?;
    Ok((clear_token_cookies(jar), StatusCode::NO_CONTENT))
}

/// Sign out everywhere
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    responses(
        (status = 200, description = "All sessions revoked", body = LogoutAllResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[instrument(skip(state, jar))]
pub async fn logout_all(
    State(state): State<AppState>,
    jar: CookieJar,
    auth_user: AuthUser,
) -> Result<(CookieJar, Json<ApiResponse<LogoutAllResponse>>), AppError> {
    let revoked = AuthService::logout_all(&state, &auth_user.0).await?;
    Ok((
        clear_token_cookies(jar),
        Json(ApiResponse::ok(
            "All sessions revoked",
            LogoutAllResponse { revoked },
        )),
    ))
}

/// List the caller's active sessions
#[utoipa::path(
    get,
    path = "/api/v1/auth/sessions",
    responses(
        (status = 200, description = "Active sessions", body = [SessionSummary]),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, AppError> {
    let sessions = AuthService::list_sessions(&state, &auth_user.0).await?;
    Ok(Json(ApiResponse::ok("Active sessions", sessions)))
}

/// Change password (signed-in users)
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-change",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed; other sessions revoked"),
        (status = 400, description = "Password policy failure"),
        (status = 401, description = "Current password wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[instrument(skip(state, dto))]
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(dto): ValidatedJson<PasswordChangeRequest>,
) -> Result<StatusCode, AppError> {
    AuthService::change_password(&state, &auth_user.0, dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request a password reset code
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/request",
    request_body = PasswordResetRequestDto,
    responses(
        // Accepted whether or not the email is registered.
        (status = 202, description = "If the email is registered, a code is on its way"),
        (status = 429, description = "Rate limited")
    ),
    tag = "Password reset"
)]
#[instrument(skip(state, dto))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<PasswordResetRequestDto>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    AuthService::request_password_reset(&state, &dto.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message(
            "If that email is registered, a reset code has been sent",
        )),
    ))
}

/// Validate a reset code
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/validate",
    request_body = PasswordResetValidateRequest,
    responses(
        (status = 200, description = "Reset authorization token", body = PasswordResetValidateResponse),
        (status = 400, description = "Incorrect code"),
        (status = 401, description = "Code expired"),
        (status = 429, description = "Attempts exhausted or rate limited")
    ),
    tag = "Password reset"
)]
#[instrument(skip(state, dto))]
pub async fn validate_password_reset(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<PasswordResetValidateRequest>,
) -> Result<Json<ApiResponse<PasswordResetValidateResponse>>, AppError> {
    let reset_token = AuthService::validate_password_reset(&state, dto).await?;
    Ok(Json(ApiResponse::ok(
        "Code accepted",
        PasswordResetValidateResponse { reset_token },
    )))
}

/// Complete a password reset
#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password reset; all sessions revoked"),
        (status = 400, description = "Invalid reset authorization or weak password")
    ),
    tag = "Password reset"
)]
#[instrument(skip(state, dto))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<PasswordResetConfirmRequest>,
) -> Result<StatusCode, AppError> {
    AuthService::confirm_password_reset(&state, dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request an email verification code
#[utoipa::path(
    post,
    path = "/api/v1/auth/email/request-verification",
    responses(
        (status = 202, description = "Verification code sent"),
        (status = 400, description = "Already verified"),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer_auth" = [])),
    tag = "Email verification"
)]
#[instrument(skip(state))]
pub async fn request_email_verification(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    AuthService::request_email_verification(&state, &auth_user.0).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message("Verification code sent")),
    ))
}

/// Confirm an email address
#[utoipa::path(
    post,
    path = "/api/v1/auth/email/verify",
    request_body = EmailVerifyRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Incorrect code"),
        (status = 401, description = "Code expired"),
        (status = 429, description = "Attempts exhausted")
    ),
    tag = "Email verification"
)]
#[instrument(skip(state, dto))]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<EmailVerifyRequest>,
) -> Result<StatusCode, AppError> {
    AuthService::verify_email(&state, &dto.email, &dto.code).await?;
    Ok(StatusCode::NO_CONTENT)
}
