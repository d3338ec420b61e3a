use tracing::{info, instrument, warn};

use crate::modules::challenges::{ChallengePurpose, ValidationMode};
use crate::modules::mfa::service::TwoFactorService;
use crate::modules::sessions::model::SessionSummary;
use crate::modules::sessions::service::SessionService;
use crate::modules::users::model::{PublicUser, User, UserRole, normalize_email};
use crate::modules::users::service::UserService;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::jwt::{
    Claims, TokenType, create_pending_token, create_reset_token, create_token_pair, verify_token,
};
use crate::utils::password::{
    equalize_missing_identity_blocking, hash_password_blocking, validate_password_policy,
    verify_password_blocking,
};

use super::model::{
    LoginRequest, PasswordChangeRequest, PasswordResetConfirmRequest,
    PasswordResetValidateRequest, RegisterRequest, TokenPairResponse,
    TwoFactorChallengeResponse, TwoFactorLoginRequest,
};

/// Outcome of the password step of sign-in.
#[derive(Debug)]
pub enum LoginOutcome {
    Tokens(TokenPairResponse),
    TwoFactorRequired(TwoFactorChallengeResponse),
}

pub struct AuthService;

impl AuthService {
    #[instrument(skip(state, dto))]
    pub async fn register(state: &AppState, dto: RegisterRequest) -> Result<PublicUser, AppError> {
        let role = dto.role.unwrap_or(UserRole::Athlete);
        if role == UserRole::Admin {
            return Err(AppError::validation(
                "Admin accounts cannot be self-registered",
            ));
        }

        validate_password_policy(&dto.password)?;

        let email = normalize_email(&dto.email);

        if UserService::find_by_email(&state.db, &email).await?.is_some() {
            return Err(AppError::EmailConflict);
        }

        let password_hash = hash_password_blocking(dto.password).await?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (first_name, last_name, email, password, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, public_id, first_name, last_name, email, password, role,
                       is_active, is_email_verified, twofa_enabled, twofa_secret,
                       created_at, updated_at",
        )
        .bind(dto.first_name.trim())
        .bind(dto.last_name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .fetch_one(&state.db)
        .await?;

        info!(user_id = %user.id, role = %role, "user registered");

        // Best effort: a failed delivery must not fail the registration.
        // The user can re-request a code at any time.
        if let Err(e) = Self::issue_verification_challenge(state, &email).await {
            warn!(error = %e, "could not send verification code at registration");
        }

        Ok(user.into())
    }

    /// Password step of sign-in. Timing is equalized between "unknown
    /// email" and "wrong password", and the outcome message never says
    /// which one it was.
    #[instrument(skip(state, dto))]
    pub async fn login(
        state: &AppState,
        dto: LoginRequest,
        user_agent: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let Some(user) = UserService::find_by_email(&state.db, &dto.email).await? else {
            equalize_missing_identity_blocking(dto.password).await;
            return Err(AppError::InvalidCredentials);
        };

        let outcome = verify_password_blocking(dto.password.clone(), user.password.clone()).await?;
        if !outcome.ok {
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AppError::Inactive);
        }

        if outcome.needs_rehash {
            let fresh = hash_password_blocking(dto.password).await?;
            UserService::update_password_hash(&state.db, user.id, &fresh).await?;
            info!(user_id = %user.id, "password rehashed with current parameters");
        }

        if user.twofa_enabled {
            let pending_token =
                create_pending_token(user.id, user.role.as_str(), &state.jwt_config)?;
            return Ok(LoginOutcome::TwoFactorRequired(TwoFactorChallengeResponse {
                two_factor_required: true,
                pending_token,
            }));
        }

        let tokens = Self::issue_session_pair(state, &user, user_agent).await?;
        Ok(LoginOutcome::Tokens(tokens))
    }

    /// Second step of sign-in for accounts with 2FA: a pending token plus
    /// a TOTP or backup code buys the real pair.
    #[instrument(skip(state, dto))]
    pub async fn verify_two_factor_login(
        state: &AppState,
        dto: TwoFactorLoginRequest,
        user_agent: Option<&str>,
    ) -> Result<TokenPairResponse, AppError> {
        let claims = verify_token(&dto.pending_token, TokenType::Pending2fa, &state.jwt_config)
            .map_err(|e| match e {
                AppError::Expired(_) => {
                    AppError::expired("Two-factor sign-in window has expired, log in again")
                }
                other => other,
            })?;

        let user = UserService::get_by_id(&state.db, claims.user_id()?).await?;
        if !user.is_active {
            return Err(AppError::Inactive);
        }

        if !TwoFactorService::verify_second_factor(&state.db, user.id, &dto.code).await? {
            return Err(AppError::invalid_code("Invalid authenticator or backup code"));
        }

        Self::issue_session_pair(state, &user, user_agent).await
    }

    /// Exchanges a valid refresh token for a new pair, revoking the old
    /// one atomically. A replayed refresh revokes every session of the
    /// identity and fails.
    #[instrument(skip(state, refresh_token))]
    pub async fn refresh(
        state: &AppState,
        refresh_token: &str,
        user_agent: Option<&str>,
    ) -> Result<TokenPairResponse, AppError> {
        let claims = verify_token(refresh_token, TokenType::Refresh, &state.jwt_config)
            .map_err(|e| match e {
                AppError::Expired(_) => e,
                _ => AppError::RefreshInvalid,
            })?;

        // Role and activation are re-read from the directory so a rotated
        // pair reflects the current state, not the state at first login.
        let user = UserService::get_by_id(&state.db, claims.user_id()?)
            .await
            .map_err(|_| AppError::RefreshInvalid)?;
        if !user.is_active {
            return Err(AppError::Inactive);
        }

        let pair = create_token_pair(user.id, user.role.as_str(), &state.jwt_config)?;

        SessionService::rotate(
            &state.db,
            claims.jti,
            pair.access_jti,
            pair.refresh_jti,
            pair.refresh_expires_at,
            user_agent,
        )
        .await?;

        Ok(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.access_expires_in,
            two_factor_required: false,
        })
    }

    #[instrument(skip(state, refresh_token))]
    pub async fn logout(state: &AppState, refresh_token: &str) -> Result<(), AppError> {
        let claims = verify_token(refresh_token, TokenType::Refresh, &state.jwt_config)
            .map_err(|_| AppError::RefreshInvalid)?;

        if !SessionService::revoke_by_refresh_jti(&state.db, claims.jti).await? {
            return Err(AppError::RefreshInvalid);
        }

        Ok(())
    }

    #[instrument(skip(state))]
    pub async fn logout_all(state: &AppState, claims: &Claims) -> Result<u64, AppError> {
        SessionService::revoke_all_for_user(&state.db, claims.user_id()?).await
    }

    #[instrument(skip(state))]
    pub async fn list_sessions(
        state: &AppState,
        claims: &Claims,
    ) -> Result<Vec<SessionSummary>, AppError> {
        let sessions =
            SessionService::list_active_for_user(&state.db, claims.user_id()?).await?;

        Ok(sessions
            .into_iter()
            .map(|s| s.summarize(claims.jti))
            .collect())
    }

    /// Changes the password of an authenticated user and revokes every
    /// other session. The current session stays alive.
    #[instrument(skip(state, dto))]
    pub async fn change_password(
        state: &AppState,
        claims: &Claims,
        dto: PasswordChangeRequest,
    ) -> Result<(), AppError> {
        let user = UserService::get_by_id(&state.db, claims.user_id()?).await?;

        let outcome =
            verify_password_blocking(dto.current_password, user.password.clone()).await?;
        if !outcome.ok {
            return Err(AppError::InvalidCredentials);
        }

        validate_password_policy(&dto.new_password)?;

        let fresh = hash_password_blocking(dto.new_password).await?;
        UserService::update_password_hash(&state.db, user.id, &fresh).await?;

        let revoked =
            SessionService::revoke_all_except_access_jti(&state.db, user.id, claims.jti).await?;
        info!(user_id = %user.id, revoked, "password changed, other sessions revoked");

        Ok(())
    }

    /// Starts a password reset. The response (and, as far as possible,
    /// the latency) is the same whether the email is registered or not.
    #[instrument(skip(state))]
    pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);

        let Some(user) = UserService::find_by_email(&state.db, &email).await? else {
            // No email is sent for unknown addresses, and no error either.
            info!("password reset requested for unknown email");
            return Ok(());
        };

        let issued = state
            .challenges
            .issue(ChallengePurpose::PasswordReset, &email)
            .await?;

        state
            .notifier
            .send_password_reset_code(&user.email, &issued.code, issued.ttl_seconds / 60)
            .await?;

        Ok(())
    }

    /// Validates a reset code without consuming it; a correct code buys a
    /// short-lived reset-authorization token for the confirm step. Wrong
    /// codes count toward the attempt cap.
    #[instrument(skip(state, dto))]
    pub async fn validate_password_reset(
        state: &AppState,
        dto: PasswordResetValidateRequest,
    ) -> Result<String, AppError> {
        let email = normalize_email(&dto.email);

        state
            .challenges
            .validate(
                ChallengePurpose::PasswordReset,
                &email,
                &dto.code,
                ValidationMode::Peek,
            )
            .await?;

        let user = UserService::find_by_email(&state.db, &email)
            .await?
            .ok_or_else(|| AppError::invalid_code("Incorrect code"))?;

        create_reset_token(user.id, user.role.as_str(), &state.jwt_config)
    }

    /// Completes a password reset: reset-authorization token plus a new
    /// password. Every session of the identity is revoked.
    #[instrument(skip(state, dto))]
    pub async fn confirm_password_reset(
        state: &AppState,
        dto: PasswordResetConfirmRequest,
    ) -> Result<(), AppError> {
        let claims = verify_token(&dto.reset_token, TokenType::PasswordReset, &state.jwt_config)
            .map_err(|e| match e {
                AppError::Expired(_) => e,
                _ => AppError::invalid_code("Invalid reset authorization"),
            })?;

        validate_password_policy(&dto.new_password)?;

        let user = UserService::get_by_id(&state.db, claims.user_id()?).await?;

        let fresh = hash_password_blocking(dto.new_password).await?;
        UserService::update_password_hash(&state.db, user.id, &fresh).await?;

        let revoked = SessionService::revoke_all_for_user(&state.db, user.id).await?;
        info!(user_id = %user.id, revoked, "password reset, all sessions revoked");

        // The challenge has served its purpose; drop it so the code
        // cannot authorize a second reset.
        if let Err(e) = state
            .challenges
            .remove(ChallengePurpose::PasswordReset, &user.email)
            .await
        {
            warn!(error = %e, "could not remove spent reset challenge");
        }

        Ok(())
    }

    /// (Re-)issues an email verification code for the authenticated user.
    #[instrument(skip(state))]
    pub async fn request_email_verification(
        state: &AppState,
        claims: &Claims,
    ) -> Result<(), AppError> {
        let user = UserService::get_by_id(&state.db, claims.user_id()?).await?;

        if user.is_email_verified {
            return Err(AppError::validation("Email is already verified"));
        }

        Self::issue_verification_challenge(state, &user.email).await
    }

    /// Confirms an email address with a delivered code.
    #[instrument(skip(state, code))]
    pub async fn verify_email(state: &AppState, email: &str, code: &str) -> Result<(), AppError> {
        let email = normalize_email(email);

        state
            .challenges
            .validate(
                ChallengePurpose::EmailVerification,
                &email,
                code,
                ValidationMode::Consume,
            )
            .await?;

        let user = UserService::find_by_email(&state.db, &email)
            .await?
            .ok_or_else(|| AppError::invalid_code("Incorrect code"))?;

        UserService::mark_email_verified(&state.db, user.id).await?;
        info!(user_id = %user.id, "email verified");

        Ok(())
    }

    async fn issue_verification_challenge(state: &AppState, email: &str) -> Result<(), AppError> {
        let issued = state
            .challenges
            .issue(ChallengePurpose::EmailVerification, email)
            .await?;

        state
            .notifier
            .send_verification_code(email, &issued.code, issued.ttl_seconds / 60)
            .await
    }

    /// Mints an access+refresh pair and records the pairing in the
    /// session store.
    async fn issue_session_pair(
        state: &AppState,
        user: &User,
        user_agent: Option<&str>,
    ) -> Result<TokenPairResponse, AppError> {
        let pair = create_token_pair(user.id, user.role.as_str(), &state.jwt_config)?;

        SessionService::create(
            &state.db,
            user.id,
            pair.access_jti,
            pair.refresh_jti,
            pair.refresh_expires_at,
            user_agent,
        )
        .await?;

        Ok(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.access_expires_in,
            two_factor_required: false,
        })
    }
}
