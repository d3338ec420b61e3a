use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Application error. Every failure a handler can produce is one of these
/// kinds; the `IntoResponse` impl is the only place that translates kinds
/// into HTTP statuses and the response envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This account has been deactivated")]
    Inactive,

    #[error("An account with this email already exists")]
    EmailConflict,

    #[error("{0}")]
    InvalidCode(String),

    #[error("{0}")]
    Expired(String),

    #[error("Too many incorrect attempts, the code has been invalidated")]
    LockedOut,

    #[error("Refresh token is invalid, expired, or revoked")]
    RefreshInvalid,

    #[error("Refresh token has already been used")]
    RefreshReplayed,

    #[error("Too many requests")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("A downstream service is temporarily unavailable")]
    TransportUnavailable(String),

    #[error("{0}")]
    WeakPassword(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_code(msg: impl Into<String>) -> Self {
        Self::InvalidCode(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn weak_password(msg: impl Into<String>) -> Self {
        Self::WeakPassword(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Machine-readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Inactive => "INACTIVE",
            Self::EmailConflict => "CONFLICT_EMAIL",
            Self::InvalidCode(_) => "INVALID_CODE",
            Self::Expired(_) => "EXPIRED",
            Self::LockedOut => "LOCKED_OUT",
            Self::RefreshInvalid => "REFRESH_INVALID",
            Self::RefreshReplayed => "REFRESH_REPLAYED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::Database(_) | Self::Internal(_) => "INTERNAL",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::WeakPassword(_) | Self::InvalidCode(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_)
            | Self::InvalidCredentials
            | Self::Expired(_)
            | Self::RefreshInvalid
            | Self::RefreshReplayed => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Inactive => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::EmailConflict => StatusCode::CONFLICT,
            Self::LockedOut | Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail is logged, never returned.
        let message = match &self {
            Self::Database(e) => {
                error!(error = %e, "database error");
                "Internal server error".to_string()
            }
            Self::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            Self::TransportUnavailable(detail) => {
                error!(detail = %detail, "downstream unavailable");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "data": null,
            "errors": [{ "code": self.code(), "detail": message }],
        }));

        let mut response = (status, body).into_response();

        if let Self::RateLimited {
            retry_after_secs: Some(secs),
        } = self
        {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
