use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::utils::errors::AppError;

use super::model::RefreshSession;

const SESSION_COLUMNS: &str =
    "id, user_id, access_jti, refresh_jti, user_agent, status, issued_at, expires_at, revoked_at";

/// Authoritative record of refresh validity.
pub struct SessionService;

impl SessionService {
    /// Records a freshly minted access+refresh pairing.
    #[instrument(skip(db))]
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        access_jti: Uuid,
        refresh_jti: Uuid,
        expires_at: DateTime<Utc>,
        user_agent: Option<&str>,
    ) -> Result<RefreshSession, AppError> {
        let session = sqlx::query_as::<_, RefreshSession>(&format!(
            "INSERT INTO refresh_sessions (user_id, access_jti, refresh_jti, user_agent, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(access_jti)
        .bind(refresh_jti)
        .bind(user_agent)
        .bind(expires_at)
        .fetch_one(db)
        .await?;

        Ok(session)
    }

    /// Finds the session a refresh jti belongs to, but only while it is
    /// active and unexpired. Revoked, expired, and unknown jtis all come
    /// back as `None`.
    #[instrument(skip(db))]
    pub async fn find_active_by_refresh_jti(
        db: &PgPool,
        refresh_jti: Uuid,
    ) -> Result<Option<RefreshSession>, AppError> {
        let session = sqlx::query_as::<_, RefreshSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_sessions
             WHERE refresh_jti = $1 AND status = 'active' AND expires_at > NOW()"
        ))
        .bind(refresh_jti)
        .fetch_optional(db)
        .await?;

        Ok(session)
    }

    /// Atomically exchanges one refresh capability for another.
    ///
    /// The old row transitions to `revoked` and the new row is inserted in
    /// one transaction; the conditional `UPDATE … WHERE status = 'active'`
    /// serializes concurrent rotations of the same jti, so exactly one
    /// caller wins. The loser observes an already-revoked row and gets
    /// `REFRESH_REPLAYED` — and, since a replayed refresh means the token
    /// leaked, every other active session of that identity is revoked in
    /// the same transaction.
    #[instrument(skip(db))]
    pub async fn rotate(
        db: &PgPool,
        old_refresh_jti: Uuid,
        new_access_jti: Uuid,
        new_refresh_jti: Uuid,
        new_expires_at: DateTime<Utc>,
        user_agent: Option<&str>,
    ) -> Result<RefreshSession, AppError> {
        let mut tx = db.begin().await?;

        let revoked_user: Option<Uuid> = sqlx::query_scalar(
            "UPDATE refresh_sessions
             SET status = 'revoked', revoked_at = NOW()
             WHERE refresh_jti = $1 AND status = 'active' AND expires_at > NOW()
             RETURNING user_id",
        )
        .bind(old_refresh_jti)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = revoked_user else {
            // Either the jti was never issued / has expired, or it was
            // already rotated. The latter is a replay.
            let replayed_user: Option<Uuid> = sqlx::query_scalar(
                "SELECT user_id FROM refresh_sessions
                 WHERE refresh_jti = $1 AND status = 'revoked'",
            )
            .bind(old_refresh_jti)
            .fetch_optional(&mut *tx)
            .await?;

            return match replayed_user {
                Some(user_id) => {
                    let count = sqlx::query(
                        "UPDATE refresh_sessions
                         SET status = 'revoked', revoked_at = NOW()
                         WHERE user_id = $1 AND status = 'active'",
                    )
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    tx.commit().await?;

                    warn!(
                        user_id = %user_id,
                        revoked = count,
                        "refresh replay detected, all sessions revoked"
                    );

                    Err(AppError::RefreshReplayed)
                }
                None => Err(AppError::RefreshInvalid),
            };
        };

        let session = sqlx::query_as::<_, RefreshSession>(&format!(
            "INSERT INTO refresh_sessions (user_id, access_jti, refresh_jti, user_agent, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(new_access_jti)
        .bind(new_refresh_jti)
        .bind(user_agent)
        .bind(new_expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(session)
    }

    /// Revokes a single session by its refresh jti. Returns whether a live
    /// row was actually revoked.
    #[instrument(skip(db))]
    pub async fn revoke_by_refresh_jti(db: &PgPool, refresh_jti: Uuid) -> Result<bool, AppError> {
        let affected = sqlx::query(
            "UPDATE refresh_sessions
             SET status = 'revoked', revoked_at = NOW()
             WHERE refresh_jti = $1 AND status = 'active'",
        )
        .bind(refresh_jti)
        .execute(db)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    /// Revokes every active session of an identity ("log out everywhere").
    /// Idempotent: a second call affects zero rows.
    #[instrument(skip(db))]
    pub async fn revoke_all_for_user(db: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
        let affected = sqlx::query(
            "UPDATE refresh_sessions
             SET status = 'revoked', revoked_at = NOW()
             WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();

        Ok(affected)
    }

    /// Revokes every active session of an identity except the one whose
    /// access jti matches. Used by password change, which keeps the caller
    /// signed in.
    #[instrument(skip(db))]
    pub async fn revoke_all_except_access_jti(
        db: &PgPool,
        user_id: Uuid,
        access_jti: Uuid,
    ) -> Result<u64, AppError> {
        let affected = sqlx::query(
            "UPDATE refresh_sessions
             SET status = 'revoked', revoked_at = NOW()
             WHERE user_id = $1 AND status = 'active' AND access_jti <> $2",
        )
        .bind(user_id)
        .bind(access_jti)
        .execute(db)
        .await?
        .rows_affected();

        Ok(affected)
    }

    #[instrument(skip(db))]
    pub async fn list_active_for_user(
        db: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, AppError> {
        let sessions = sqlx::query_as::<_, RefreshSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_sessions
             WHERE user_id = $1 AND status = 'active' AND expires_at > NOW()
             ORDER BY issued_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(sessions)
    }
}
