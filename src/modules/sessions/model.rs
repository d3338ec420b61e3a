//! Refresh session records.

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Revoked,
}

/// One live (or revoked) refresh capability. A refresh token is only
/// honored while its jti matches an `active`, unexpired row.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_jti: Uuid,
    pub refresh_jti: Uuid,
    pub user_agent: Option<String>,
    pub status: SessionStatus,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Session as listed on `GET /sessions`. Never exposes jtis.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user_agent: Option<String>,
    /// True for the session the caller's access token belongs to.
    pub current: bool,
}

impl RefreshSession {
    pub fn summarize(self, current_access_jti: Uuid) -> SessionSummary {
        SessionSummary {
            id: self.id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            user_agent: self.user_agent,
            current: self.access_jti == current_access_jti,
        }
    }
}
