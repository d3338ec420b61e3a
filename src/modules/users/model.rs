//! Identity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::utils::errors::AppError;

/// Federation roles. AuthCore only compares roles for equality; what a
/// role means is decided by the routes that require it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Coach,
    Representative,
    Intern,
    Athlete,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Coach => "coach",
            Self::Representative => "representative",
            Self::Intern => "intern",
            Self::Athlete => "athlete",
        }
    }

    pub fn parse(role: &str) -> Result<Self, AppError> {
        match role {
            "admin" => Ok(Self::Admin),
            "coach" => Ok(Self::Coach),
            "representative" => Ok(Self::Representative),
            "intern" => Ok(Self::Intern),
            "athlete" => Ok(Self::Athlete),
            other => Err(AppError::unauthorized(format!("Unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity as stored. The password hash never leaves this module's
/// service layer; responses use [`PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub public_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub twofa_enabled: bool,
    pub twofa_secret: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Identity summary exposed over the API. Carries the opaque `public_id`,
/// never the internal row id or any secret material.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub twofa_enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.public_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            twofa_enabled: user.twofa_enabled,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivationRequest {
    pub is_active: bool,
}

/// Normalizes an email for lookup and storage: trimmed and case-folded.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
