use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::modules::sessions::service::SessionService;
use crate::utils::errors::AppError;
use crate::utils::pagination::{PaginationMeta, PaginationParams};

use super::model::{PublicUser, UpdateProfileRequest, User, UserRole, normalize_email};

const USER_COLUMNS: &str = "id, public_id, first_name, last_name, email, password, role, \
     is_active, is_email_verified, twofa_enabled, twofa_secret, created_at, updated_at";

pub struct UserService;

impl UserService {
    /// Looks an identity up by email. The address is normalized first, so
    /// callers can pass raw request input.
    #[instrument(skip(db))]
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(db))]
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(db))]
    pub async fn get_by_id(db: &PgPool, id: Uuid) -> Result<User, AppError> {
        Self::find_by_id(db, id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    #[instrument(skip(db))]
    pub async fn get_by_public_id(db: &PgPool, public_id: Uuid) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = $1"
        ))
        .bind(public_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
    }

    #[instrument(skip(db))]
    pub async fn list(
        db: &PgPool,
        pagination: &PaginationParams,
    ) -> Result<(Vec<PublicUser>, PaginationMeta), AppError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(db)
        .await?;

        let meta = PaginationMeta {
            total,
            limit: pagination.limit(),
            page: pagination.page(),
            has_more: pagination.offset() + pagination.limit() < total,
        };

        Ok((users.into_iter().map(PublicUser::from).collect(), meta))
    }

    #[instrument(skip(db, dto))]
    pub async fn update_profile(
        db: &PgPool,
        user_id: Uuid,
        dto: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET first_name = COALESCE($1, first_name),
                 last_name = COALESCE($2, last_name),
                 updated_at = NOW()
             WHERE id = $3
             RETURNING {USER_COLUMNS}"
        ))
        .bind(dto.first_name)
        .bind(dto.last_name)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

        Ok(user)
    }

    #[instrument(skip(db))]
    pub async fn set_role(
        db: &PgPool,
        public_id: Uuid,
        role: UserRole,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $1, updated_at = NOW()
             WHERE public_id = $2
             RETURNING {USER_COLUMNS}"
        ))
        .bind(role)
        .bind(public_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

        Ok(user)
    }

    /// Activates or deactivates an identity. Deactivation revokes every
    /// live session so existing refresh tokens die with the account.
    #[instrument(skip(db))]
    pub async fn set_activation(
        db: &PgPool,
        public_id: Uuid,
        is_active: bool,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_active = $1, updated_at = NOW()
             WHERE public_id = $2
             RETURNING {USER_COLUMNS}"
        ))
        .bind(is_active)
        .bind(public_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

        if !is_active {
            let revoked = SessionService::revoke_all_for_user(db, user.id).await?;
            tracing::info!(user_id = %user.id, revoked, "sessions revoked on deactivation");
        }

        Ok(user)
    }

    #[instrument(skip(db, password_hash))]
    pub async fn update_password_hash(
        db: &PgPool,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(())
    }

    #[instrument(skip(db))]
    pub async fn mark_email_verified(db: &PgPool, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET is_email_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(db)
        .await?;

        Ok(())
    }
}
