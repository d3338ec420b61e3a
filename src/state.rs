use std::sync::Arc;

use sqlx::PgPool;

use crate::config::challenge::ChallengeConfig;
use crate::config::cors::CorsConfig;
use crate::config::database::init_db_pool;
use crate::config::email::EmailConfig;
use crate::config::jwt::JwtConfig;
use crate::config::rate_limit::RateLimitConfig;
use crate::modules::challenges::ChallengeStore;
use crate::utils::email::{EmailNotifier, SmtpNotifier};

/// Dependency container handed to every handler. AuthCore talks to its
/// collaborators (user directory, challenge store, notifier) only through
/// what lives here, so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub challenges: ChallengeStore,
    pub notifier: Arc<dyn EmailNotifier>,
    pub jwt_config: JwtConfig,
    pub email_config: EmailConfig,
    pub cors_config: CorsConfig,
    pub rate_limit_config: RateLimitConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("jwt_config", &"<redacted>")
            .field("rate_limit_config", &self.rate_limit_config)
            .finish_non_exhaustive()
    }
}

pub async fn init_app_state() -> AppState {
    let email_config = EmailConfig::from_env();
    let challenge_config = ChallengeConfig::from_env();

    AppState {
        db: init_db_pool().await,
        challenges: ChallengeStore::new(challenge_config)
            .expect("Invalid Redis configuration"),
        notifier: Arc::new(SmtpNotifier::new(email_config.clone())),
        jwt_config: JwtConfig::from_env(),
        email_config,
        cors_config: CorsConfig::from_env(),
        rate_limit_config: RateLimitConfig::from_env(),
    }
}
