use rayon::prelude::*;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::instrument;
use uuid::Uuid;

use crate::utils::errors::AppError;
use crate::utils::password::{hash_password, verify_password};

use super::model::{ConfirmTwoFactorResponse, EnableTwoFactorResponse, TwoFactorStatusResponse};

const TOTP_ISSUER: &str = "Stadion";
const BACKUP_CODE_COUNT: usize = 10;

pub struct TwoFactorService;

impl TwoFactorService {
    #[instrument(skip(db))]
    pub async fn status(db: &PgPool, user_id: Uuid) -> Result<TwoFactorStatusResponse, AppError> {
        let enabled =
            sqlx::query_scalar::<_, bool>("SELECT twofa_enabled FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(db)
                .await?;

        Ok(TwoFactorStatusResponse { enabled })
    }

    /// Generates a candidate secret and provisioning material. The secret
    /// is stored but the account does NOT transition to enabled until the
    /// user confirms with a TOTP derived from it.
    #[instrument(skip(db))]
    pub async fn provision(db: &PgPool, user_id: Uuid) -> Result<EnableTwoFactorResponse, AppError> {
        #[derive(sqlx::FromRow)]
        struct EnrollmentTarget {
            twofa_enabled: bool,
            email: String,
        }

        let user = sqlx::query_as::<_, EnrollmentTarget>(
            "SELECT twofa_enabled, email FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        if user.twofa_enabled {
            return Err(AppError::validation("Two-factor is already enabled"));
        }

        // 20 random bytes, well above the 128-bit floor for TOTP secrets.
        let secret_bytes: Vec<u8> = {
            use rand::RngCore;
            let mut rng = rand::thread_rng();
            let mut bytes = vec![0u8; 20];
            rng.fill_bytes(&mut bytes);
            bytes
        };
        let secret = Secret::Raw(secret_bytes);
        let secret_encoded = secret.to_encoded().to_string();

        let totp = Self::build_totp(&secret_encoded, &user.email)?;
        let otpauth_url = totp.get_url();
        let qr_code = format!(
            "data:image/png;base64,{}",
            totp.get_qr_base64()
                .map_err(|e| AppError::internal(format!("Failed to render QR code: {e}")))?
        );

        sqlx::query("UPDATE users SET twofa_secret = $1, updated_at = NOW() WHERE id = $2")
            .bind(&secret_encoded)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(EnableTwoFactorResponse {
            secret: secret_encoded,
            otpauth_url,
            qr_code,
        })
    }

    /// Confirms the candidate secret with a user-supplied TOTP. On success
    /// the account transitions to enabled and a fresh set of backup codes
    /// is generated — returned in plain text exactly once.
    #[instrument(skip(db, code))]
    pub async fn confirm(
        db: &PgPool,
        user_id: Uuid,
        code: &str,
    ) -> Result<ConfirmTwoFactorResponse, AppError> {
        #[derive(sqlx::FromRow)]
        struct PendingTwoFactor {
            twofa_enabled: bool,
            twofa_secret: Option<String>,
            email: String,
        }

        let user = sqlx::query_as::<_, PendingTwoFactor>(
            "SELECT twofa_enabled, twofa_secret, email FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        if user.twofa_enabled {
            return Err(AppError::validation("Two-factor is already enabled"));
        }

        let secret = user.twofa_secret.ok_or_else(|| {
            AppError::validation("No pending two-factor secret, call /2fa/enable first")
        })?;

        if !Self::verify_totp(&secret, code, &user.email)? {
            return Err(AppError::invalid_code("Invalid authenticator code"));
        }

        sqlx::query("UPDATE users SET twofa_enabled = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;

        let backup_codes = Self::generate_backup_codes();
        Self::store_backup_codes(db, user_id, &backup_codes).await?;

        Ok(ConfirmTwoFactorResponse { backup_codes })
    }

    /// Disables the second factor. Requires the account password and a
    /// current TOTP or an unused backup code.
    #[instrument(skip(db, password, code))]
    pub async fn disable(
        db: &PgPool,
        user_id: Uuid,
        password: &str,
        code: &str,
    ) -> Result<(), AppError> {
        #[derive(sqlx::FromRow)]
        struct UserCredentials {
            password: String,
            twofa_enabled: bool,
        }

        let user = sqlx::query_as::<_, UserCredentials>(
            "SELECT password, twofa_enabled FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        if !user.twofa_enabled {
            return Err(AppError::validation("Two-factor is not enabled"));
        }

        let outcome = verify_password(password, &user.password)?;
        if !outcome.ok {
            return Err(AppError::InvalidCredentials);
        }

        if !Self::verify_second_factor(db, user_id, code).await? {
            return Err(AppError::invalid_code("Invalid authenticator or backup code"));
        }

        sqlx::query(
            "UPDATE users SET twofa_enabled = FALSE, twofa_secret = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(user_id)
        .execute(db)
        .await?;

        sqlx::query("DELETE FROM twofa_backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(())
    }

    /// Checks a candidate against the enrolled TOTP secret, falling back
    /// to the backup-code set. Used by two-factor sign-in and by disable.
    #[instrument(skip(db, code))]
    pub async fn verify_second_factor(
        db: &PgPool,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, AppError> {
        #[derive(sqlx::FromRow)]
        struct EnrolledTwoFactor {
            twofa_enabled: bool,
            twofa_secret: Option<String>,
            email: String,
        }

        let user = sqlx::query_as::<_, EnrolledTwoFactor>(
            "SELECT twofa_enabled, twofa_secret, email FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        if !user.twofa_enabled {
            return Err(AppError::validation("Two-factor is not enabled"));
        }

        let secret = user
            .twofa_secret
            .ok_or_else(|| AppError::internal("Enabled account has no TOTP secret"))?;

        if code.len() == 6 && Self::verify_totp(&secret, code, &user.email)? {
            return Ok(true);
        }

        Self::consume_backup_code(db, user_id, code).await
    }

    /// Builds the TOTP instance: SHA1, 6 digits, 30 s step, ±1 step skew.
    fn build_totp(secret_encoded: &str, email: &str) -> Result<TOTP, AppError> {
        let secret_bytes = Secret::Encoded(secret_encoded.to_string())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {e}")))?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(TOTP_ISSUER.to_string()),
            email.to_string(),
        )
        .map_err(|e| AppError::internal(format!("Failed to build TOTP: {e}")))
    }

    fn verify_totp(secret_encoded: &str, code: &str, email: &str) -> Result<bool, AppError> {
        let totp = Self::build_totp(secret_encoded, email)?;

        totp.check_current(code)
            .map_err(|e| AppError::internal(format!("TOTP verification failed: {e}")))
    }

    /// Ten human-readable codes, `XXXX-XXXX` over A–Z and digits.
    fn generate_backup_codes() -> Vec<String> {
        use rand::Rng as _;
        let mut rng = rand::thread_rng();

        (0..BACKUP_CODE_COUNT)
            .map(|_| {
                let chunk = |rng: &mut rand::rngs::ThreadRng| -> String {
                    (0..4)
                        .map(|_| {
                            let idx = rng.gen_range(0..36);
                            if idx < 10 {
                                (b'0' + idx) as char
                            } else {
                                (b'A' + (idx - 10)) as char
                            }
                        })
                        .collect()
                };
                format!("{}-{}", chunk(&mut rng), chunk(&mut rng))
            })
            .collect()
    }

    /// Replaces the stored backup-code set with hashes of `codes`.
    #[instrument(skip(db, codes))]
    async fn store_backup_codes(
        db: &PgPool,
        user_id: Uuid,
        codes: &[String],
    ) -> Result<(), AppError> {
        let code_hashes: Vec<String> = codes
            .par_iter()
            .map(|code| hash_password(code))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM twofa_backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO twofa_backup_codes (user_id, code_hash)
             SELECT $1, unnest($2::text[])",
        )
        .bind(user_id)
        .bind(&code_hashes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Verifies a backup code and deletes it in the same statement, so a
    /// code can be consumed at most once even under concurrent attempts.
    #[instrument(skip(db, code))]
    async fn consume_backup_code(
        db: &PgPool,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, AppError> {
        #[derive(sqlx::FromRow)]
        struct BackupCode {
            id: Uuid,
            code_hash: String,
        }

        let candidates = sqlx::query_as::<_, BackupCode>(
            "SELECT id, code_hash FROM twofa_backup_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        for candidate in candidates {
            let outcome = verify_password(code, &candidate.code_hash)?;
            if outcome.ok {
                let deleted = sqlx::query("DELETE FROM twofa_backup_codes WHERE id = $1")
                    .bind(candidate.id)
                    .execute(db)
                    .await?
                    .rows_affected();

                // Zero rows means a concurrent request spent this code
                // first; the race loser does not authenticate.
                return Ok(deleted > 0);
            }
        }

        Ok(false)
    }
}
