use std::time::Duration;

use axum::response::{IntoResponse, Response};
use tower_governor::GovernorError;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::SmartIpKeyExtractor;

use crate::middleware::rate_limit::IdentityKeyExtractor;
use crate::utils::errors::AppError;

type IpGovernor = GovernorConfig<SmartIpKeyExtractor, ::governor::middleware::NoOpMiddleware>;
type IdentityGovernor =
    GovernorConfig<IdentityKeyExtractor, ::governor::middleware::NoOpMiddleware>;

/// Per-endpoint request budgets. Each budget is a burst size over a fixed
/// window; the limiter replenishes one slot every `window / budget`.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Login attempts per 5 minutes (per client address).
    pub login_budget: u32,
    /// Registrations per hour (per client address).
    pub register_budget: u32,
    /// Password reset requests per hour (per client address).
    pub reset_request_budget: u32,
    /// Password reset code validations per hour (per client address).
    pub reset_validate_budget: u32,
    /// Second-factor verifications per 5 minutes.
    pub twofa_verify_budget: u32,
    /// Everything else, per minute (per identity).
    pub general_budget: u32,
}

const LOGIN_WINDOW_SECS: u64 = 300;
const REGISTER_WINDOW_SECS: u64 = 3600;
const RESET_REQUEST_WINDOW_SECS: u64 = 3600;
const RESET_VALIDATE_WINDOW_SECS: u64 = 3600;
const TWOFA_VERIFY_WINDOW_SECS: u64 = 300;
const GENERAL_WINDOW_SECS: u64 = 60;

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_budget: 10,
            register_budget: 5,
            reset_request_budget: 3,
            reset_validate_budget: 10,
            twofa_verify_budget: 10,
            general_budget: 100,
        }
    }
}

fn env_budget(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            login_budget: env_budget("RATE_LIMIT_LOGIN_BUDGET", 10),
            register_budget: env_budget("RATE_LIMIT_REGISTER_BUDGET", 5),
            reset_request_budget: env_budget("RATE_LIMIT_RESET_REQUEST_BUDGET", 3),
            reset_validate_budget: env_budget("RATE_LIMIT_RESET_VALIDATE_BUDGET", 10),
            twofa_verify_budget: env_budget("RATE_LIMIT_2FA_VERIFY_BUDGET", 10),
            general_budget: env_budget("RATE_LIMIT_GENERAL_BUDGET", 100),
        }
    }

    /// Replenish interval giving `budget` requests over `window_secs`.
    fn period(budget: u32, window_secs: u64) -> Duration {
        Duration::from_millis(window_secs * 1000 / u64::from(budget.max(1)))
    }

    fn ip_governor(budget: u32, window_secs: u64) -> IpGovernor {
        GovernorConfigBuilder::default()
            .period(Self::period(budget, window_secs))
            .burst_size(budget)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .expect("Failed to build rate limiter config")
    }

    fn identity_governor(budget: u32, window_secs: u64) -> IdentityGovernor {
        GovernorConfigBuilder::default()
            .period(Self::period(budget, window_secs))
            .burst_size(budget)
            .key_extractor(IdentityKeyExtractor)
            .finish()
            .expect("Failed to build rate limiter config")
    }

    pub fn login_governor_config(&self) -> IpGovernor {
        Self::ip_governor(self.login_budget, LOGIN_WINDOW_SECS)
    }

    pub fn register_governor_config(&self) -> IpGovernor {
        Self::ip_governor(self.register_budget, REGISTER_WINDOW_SECS)
    }

    pub fn reset_request_governor_config(&self) -> IpGovernor {
        Self::ip_governor(self.reset_request_budget, RESET_REQUEST_WINDOW_SECS)
    }

    pub fn reset_validate_governor_config(&self) -> IpGovernor {
        Self::ip_governor(self.reset_validate_budget, RESET_VALIDATE_WINDOW_SECS)
    }

    pub fn twofa_verify_governor_config(&self) -> IdentityGovernor {
        Self::identity_governor(self.twofa_verify_budget, TWOFA_VERIFY_WINDOW_SECS)
    }

    pub fn general_governor_config(&self) -> IdentityGovernor {
        Self::identity_governor(self.general_budget, GENERAL_WINDOW_SECS)
    }
}

/// Maps limiter rejections to the uniform envelope with a retry-after hint.
pub(crate) fn rate_limit_error_response(err: GovernorError) -> Response {
    match err {
        GovernorError::TooManyRequests { wait_time, .. } => AppError::RateLimited {
            retry_after_secs: Some(wait_time),
        }
        .into_response(),
        GovernorError::UnableToExtractKey => {
            AppError::internal("Unable to key rate limiter").into_response()
        }
        GovernorError::Other { .. } => {
            AppError::internal("Rate limiter failure").into_response()
        }
    }
}
