//! Role-based authorization.
//!
//! The guard is a predicate over the parsed access claims: a route states
//! which roles it accepts, nothing here interprets what a role means.
//! Missing/invalid token is 401, role mismatch is 403.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::middleware::auth::AuthUser;
use crate::modules::users::model::UserRole;
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Checks the caller's role against an allowed set.
pub fn check_any_role(auth_user: &AuthUser, allowed: &[UserRole]) -> Result<(), AppError> {
    let role = auth_user.role()?;

    if !allowed.contains(&role) {
        return Err(AppError::forbidden(format!(
            "Access denied for role {role}"
        )));
    }

    Ok(())
}

/// Extractor for admin-only routes.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_user = AuthUser::from_request_parts(parts, state).await?;
        check_any_role(&auth_user, &[UserRole::Admin])?;
        Ok(RequireAdmin(auth_user))
    }
}

/// Extractor for staff routes: admins plus coaches and club
/// representatives.
#[derive(Debug, Clone)]
pub struct RequireStaff(pub AuthUser);

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_user = AuthUser::from_request_parts(parts, state).await?;
        check_any_role(
            &auth_user,
            &[UserRole::Admin, UserRole::Coach, UserRole::Representative],
        )?;
        Ok(RequireStaff(auth_user))
    }
}
