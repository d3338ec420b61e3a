use std::env;

use jsonwebtoken::Algorithm;

/// Token signing configuration.
///
/// The secret is process-wide; rotating it is a deploy event that
/// invalidates all outstanding tokens.
#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub access_token_expires_minutes: i64,
    pub refresh_token_expires_days: i64,
    pub twofa_pending_expires_seconds: i64,
    pub reset_token_expires_seconds: i64,
    /// Marks token cookies `Secure`; enable whenever TLS terminates in
    /// front of the service.
    pub cookie_secure: bool,
}

fn parse_algorithm(name: &str) -> Algorithm {
    match name {
        "HS256" => Algorithm::HS256,
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        other => panic!("Unsupported JWT_ALGORITHM: {other} (expected HS256, HS384, or HS512)"),
    }
}

impl JwtConfig {
    pub fn from_env() -> Self {
        Self {
            secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "change-this-secret-before-deploying".to_string()),
            algorithm: parse_algorithm(
                &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            ),
            access_token_expires_minutes: env::var("ACCESS_TOKEN_EXPIRES_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            refresh_token_expires_days: env::var("REFRESH_TOKEN_EXPIRES_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
            twofa_pending_expires_seconds: env::var("TWOFA_PENDING_EXPIRES_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300)
                // The pending window proves only that the password step
                // passed; it never exceeds five minutes.
                .min(300),
            reset_token_expires_seconds: env::var("RESET_TOKEN_EXPIRES_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
            cookie_secure: env::var("COOKIE_SECURE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}
