use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::jwt::JwtConfig;
use crate::utils::errors::AppError;

/// Accepted clock skew when validating `exp`/`iat`, in seconds.
const LEEWAY_SECONDS: u64 = 30;

/// The kind of bearer token a set of claims represents. Every endpoint
/// states which kind it accepts; a token of the wrong kind is rejected
/// before any other check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    #[serde(rename = "pending_2fa")]
    Pending2fa,
    PasswordReset,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Pending2fa => "pending_2fa",
            Self::PasswordReset => "password_reset",
        };
        f.write_str(s)
    }
}

/// JWT claims carried by every token this service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id, stringified.
    pub sub: String,
    pub role: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: usize,
    pub exp: usize,
    pub jti: Uuid,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::unauthorized("Invalid user id in token"))
    }
}

/// A freshly minted access + refresh pair. The jtis are returned alongside
/// the encoded tokens so the caller can record the pairing in the session
/// store.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_jti: Uuid,
    pub refresh_token: String,
    pub refresh_jti: Uuid,
    /// Access token lifetime in seconds, for the response body.
    pub access_expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

fn sign(
    user_id: Uuid,
    role: &str,
    token_type: TokenType,
    lifetime: Duration,
    jwt_config: &JwtConfig,
) -> Result<(String, Uuid, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = now + lifetime;
    let jti = Uuid::new_v4();

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        token_type,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
        jti,
    };

    let token = encode(
        &Header::new(jwt_config.algorithm),
        &claims,
        &EncodingKey::from_secret(jwt_config.secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))?;

    Ok((token, jti, expires_at))
}

pub fn create_token_pair(
    user_id: Uuid,
    role: &str,
    jwt_config: &JwtConfig,
) -> Result<TokenPair, AppError> {
    let access_lifetime = Duration::minutes(jwt_config.access_token_expires_minutes);
    let refresh_lifetime = Duration::days(jwt_config.refresh_token_expires_days);

    let (access_token, access_jti, _) =
        sign(user_id, role, TokenType::Access, access_lifetime, jwt_config)?;
    let (refresh_token, refresh_jti, refresh_expires_at) =
        sign(user_id, role, TokenType::Refresh, refresh_lifetime, jwt_config)?;

    Ok(TokenPair {
        access_token,
        access_jti,
        refresh_token,
        refresh_jti,
        access_expires_in: access_lifetime.num_seconds(),
        refresh_expires_at,
    })
}

/// Mints the short-lived token proving that the password step of a
/// two-factor sign-in succeeded. It grants no access to protected routes.
pub fn create_pending_token(
    user_id: Uuid,
    role: &str,
    jwt_config: &JwtConfig,
) -> Result<String, AppError> {
    let lifetime = Duration::seconds(jwt_config.twofa_pending_expires_seconds);
    let (token, _, _) = sign(user_id, role, TokenType::Pending2fa, lifetime, jwt_config)?;
    Ok(token)
}

/// Mints the reset-authorization token returned by a successful
/// password-reset code validation.
pub fn create_reset_token(
    user_id: Uuid,
    role: &str,
    jwt_config: &JwtConfig,
) -> Result<String, AppError> {
    let lifetime = Duration::seconds(jwt_config.reset_token_expires_seconds);
    let (token, _, _) = sign(user_id, role, TokenType::PasswordReset, lifetime, jwt_config)?;
    Ok(token)
}

/// Parses and validates a token, rejecting bad signatures, expiry (with
/// ±30 s leeway), malformed tokens, and tokens of the wrong kind — each as
/// a distinct error.
pub fn verify_token(
    token: &str,
    expected: TokenType,
    jwt_config: &JwtConfig,
) -> Result<Claims, AppError> {
    let mut validation = Validation::new(jwt_config.algorithm);
    validation.leeway = LEEWAY_SECONDS;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::expired("Token has expired")
        }
        _ => AppError::unauthorized("Invalid token"),
    })?;

    if claims.token_type != expected {
        return Err(AppError::unauthorized(format!(
            "Expected a {expected} token"
        )));
    }

    Ok(claims)
}
