use std::env;

/// Configuration for the Redis-backed challenge store (email verification
/// and password reset codes).
#[derive(Clone, Debug)]
pub struct ChallengeConfig {
    pub redis_url: String,
    /// TTL for email verification codes, in seconds.
    pub verify_code_ttl_seconds: u64,
    /// TTL for password reset codes, in seconds.
    pub reset_code_ttl_seconds: u64,
    /// Wrong attempts allowed before a code is destroyed.
    pub max_attempts: u32,
    /// Per-operation deadline against Redis, in milliseconds.
    pub op_timeout_ms: u64,
}

impl ChallengeConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            verify_code_ttl_seconds: env::var("VERIFY_CODE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            reset_code_ttl_seconds: env::var("RESET_CODE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            max_attempts: 5,
            op_timeout_ms: env::var("KV_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            verify_code_ttl_seconds: 900,
            reset_code_ttl_seconds: 600,
            max_attempts: 5,
            op_timeout_ms: 2000,
        }
    }
}
