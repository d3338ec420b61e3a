use axum::{
    Router,
    routing::{get, post},
};
use tower_governor::GovernorLayer;

use crate::config::rate_limit::{rate_limit_error_response, RateLimitConfig};
use crate::modules::mfa::router::init_twofa_router;
use crate::state::AppState;

use super::controller;

/// Builds the `/auth` route tree. Sensitive endpoints sit behind their own
/// rate-limit buckets; everything else shares the general one.
pub fn init_auth_router(rate_limit: &RateLimitConfig) -> Router<AppState> {
    let register = Router::new()
        .route("/register", post(controller::register))
        .layer(
            GovernorLayer::new(rate_limit.register_governor_config())
                .error_handler(rate_limit_error_response),
        );

    let login = Router::new()
        .route("/login", post(controller::login))
        .layer(
            GovernorLayer::new(rate_limit.login_governor_config())
                .error_handler(rate_limit_error_response),
        );

    let twofa_verify = Router::new()
        .route("/2fa/verify", post(controller::verify_two_factor_login))
        .layer(
            GovernorLayer::new(rate_limit.twofa_verify_governor_config())
                .error_handler(rate_limit_error_response),
        );

    let reset_request = Router::new()
        .route(
            "/password-reset/request",
            post(controller::request_password_reset),
        )
        .layer(
            GovernorLayer::new(rate_limit.reset_request_governor_config())
                .error_handler(rate_limit_error_response),
        );

    let reset_validate = Router::new()
        .route(
            "/password-reset/validate",
            post(controller::validate_password_reset),
        )
        .layer(
            GovernorLayer::new(rate_limit.reset_validate_governor_config())
                .error_handler(rate_limit_error_response),
        );

    let general = Router::new()
        .route("/refresh", post(controller::refresh))
        .route("/logout", post(controller::logout))
        .route("/logout-all", post(controller::logout_all))
        .route("/sessions", get(controller::list_sessions))
        .route("/password-change", post(controller::change_password))
        .route(
            "/password-reset/confirm",
            post(controller::confirm_password_reset),
        )
        .route(
            "/email/request-verification",
            post(controller::request_email_verification),
        )
        .route("/email/verify", post(controller::verify_email))
        .nest("/2fa", init_twofa_router())
        .layer(
            GovernorLayer::new(rate_limit.general_governor_config())
                .error_handler(rate_limit_error_response),
        );

    Router::new()
        .merge(register)
        .merge(login)
        .merge(twofa_verify)
        .merge(reset_request)
        .merge(reset_validate)
        .merge(general)
}
