use std::sync::OnceLock;

use argon2::{
    Algorithm, Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::utils::errors::AppError;

/// Result of a password verification.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOutcome {
    pub ok: bool,
    /// True when the stored hash was produced with parameters weaker than the
    /// current defaults. The caller re-hashes on the next successful login.
    pub needs_rehash: bool,
}

/// Minimum password length accepted at registration, change, and reset.
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Small denylist of passwords that satisfy the character rules but are
/// too well known to accept.
const DENYLIST: &[&str] = &[
    "password123!",
    "p@ssword1234",
    "p@ssw0rd1234",
    "qwerty123456!",
    "welcome1234!",
    "letmein1234!",
    "admin1234567!",
    "iloveyou123!",
];

/// Hashes a password with Argon2id. The salt is random per hash and the
/// resulting PHC string embeds the salt and parameters, so a later
/// parameter bump needs no data migration.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal(format!("Failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC hash.
///
/// A mismatch is a normal outcome (`ok: false`); only a malformed stored
/// hash is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<VerifyOutcome, AppError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::internal(format!("Stored password hash is malformed: {e}")))?;

    let ok = match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(e) => {
            return Err(AppError::internal(format!(
                "Password verification failed: {e}"
            )));
        }
    };

    Ok(VerifyOutcome {
        ok,
        needs_rehash: needs_rehash(&parsed),
    })
}

fn needs_rehash(parsed: &PasswordHash<'_>) -> bool {
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }

    match Params::try_from(parsed) {
        Ok(params) => {
            params.m_cost() < Params::DEFAULT_M_COST
                || params.t_cost() < Params::DEFAULT_T_COST
                || params.p_cost() < Params::DEFAULT_P_COST
        }
        Err(_) => true,
    }
}

/// Runs a verification against a fixed hash and discards the result.
///
/// Callers use this when the looked-up identity does not exist, so the
/// request spends the same time as a real verification and the response
/// cannot be used to enumerate accounts.
pub fn equalize_missing_identity(password: &str) {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    let stored = DUMMY_HASH.get_or_init(|| {
        hash_password("timing-equalization-sentinel").expect("hashing a constant cannot fail")
    });

    let _ = verify_password(password, stored);
}

/// Async wrapper that moves the Argon2 work off the async workers.
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::internal(format!("Hashing task failed: {e}")))?
}

/// Async wrapper for [`verify_password`].
pub async fn verify_password_blocking(
    password: String,
    stored: String,
) -> Result<VerifyOutcome, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::internal(format!("Verification task failed: {e}")))?
}

/// Async wrapper for [`equalize_missing_identity`].
pub async fn equalize_missing_identity_blocking(password: String) {
    let _ = tokio::task::spawn_blocking(move || equalize_missing_identity(&password)).await;
}

/// Validates the password policy: at least [`MIN_PASSWORD_LENGTH`]
/// characters, at least one letter, one digit, and one non-alphanumeric
/// character, and not on the denylist.
pub fn validate_password_policy(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::weak_password(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(AppError::weak_password(
            "Password must contain at least one letter",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::weak_password(
            "Password must contain at least one digit",
        ));
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(AppError::weak_password(
            "Password must contain at least one symbol",
        ));
    }

    if DENYLIST.contains(&password.to_lowercase().as_str()) {
        return Err(AppError::weak_password(
            "This password is too common, choose another one",
        ));
    }

    Ok(())
}
