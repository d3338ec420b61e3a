//! Redis-backed store for short-lived verification codes.
//!
//! One key per (purpose, email) holds a JSON `{code, attempts}` entry with
//! a server-managed TTL. A new issue overwrites any live code. Attempts cap
//! at a fixed limit; reaching the cap destroys the code.

use std::time::Duration;

use rand::Rng;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::config::challenge::ChallengeConfig;
use crate::utils::errors::AppError;

/// What a challenge code proves when echoed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengePurpose {
    EmailVerification,
    PasswordReset,
}

impl ChallengePurpose {
    fn key_prefix(&self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "pwd_reset",
        }
    }

    /// Storage key. Emails are case-folded before keying so at most one
    /// live code exists per address and purpose.
    pub fn key(&self, email: &str) -> String {
        format!("{}:{}", self.key_prefix(), email.trim().to_lowercase())
    }

    pub fn ttl_seconds(&self, config: &ChallengeConfig) -> u64 {
        match self {
            Self::EmailVerification => config.verify_code_ttl_seconds,
            Self::PasswordReset => config.reset_code_ttl_seconds,
        }
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        match self {
            // Six decimal digits, zero-padded.
            Self::EmailVerification => format!("{:06}", rng.gen_range(0..1_000_000u32)),
            // Eight characters from an unambiguous mixed alphabet.
            Self::PasswordReset => {
                const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
                (0..8)
                    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                    .collect()
            }
        }
    }
}

/// Whether a successful validation destroys the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Destroy the code on success (email verification).
    Consume,
    /// Leave the code in place on success; wrong attempts still count
    /// (password-reset validation, which hands out a reset token instead).
    Peek,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChallengeEntry {
    code: String,
    attempts: u32,
}

/// A freshly issued challenge.
#[derive(Debug)]
pub struct IssuedChallenge {
    pub code: String,
    pub ttl_seconds: u64,
}

/// Live-code status, for diagnostics and resend flows.
#[derive(Debug)]
pub struct ChallengeStatus {
    pub remaining_ttl_seconds: u64,
}

/// Redis challenge store. Connects lazily on first use so the service can
/// start (and non-challenge tests can run) without a reachable Redis.
#[derive(Clone)]
pub struct ChallengeStore {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    config: ChallengeConfig,
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChallengeStore {
    /// Parses the Redis URL; no connection is made until the first
    /// operation.
    pub fn new(config: ChallengeConfig) -> Result<Self, AppError> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| AppError::TransportUnavailable(format!("Redis URL: {e}")))?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            config,
        })
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    async fn conn(&self) -> Result<ConnectionManager, AppError> {
        let connect = self
            .conn
            .get_or_try_init(|| async { ConnectionManager::new(self.client.clone()).await });

        match tokio::time::timeout(self.op_timeout(), connect).await {
            Ok(Ok(conn)) => Ok(conn.clone()),
            Ok(Err(e)) => Err(AppError::TransportUnavailable(format!("Redis connect: {e}"))),
            Err(_) => Err(AppError::TransportUnavailable(
                "Redis connect timed out".to_string(),
            )),
        }
    }

    fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.config.op_timeout_ms)
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::TransportUnavailable(format!("Redis: {e}"))),
            Err(_) => Err(AppError::TransportUnavailable(
                "Redis operation timed out".to_string(),
            )),
        }
    }

    /// Issues a fresh code, overwriting any live one. The value and its TTL
    /// are written in a single `SET … EX`, so the pair is atomic.
    #[instrument(skip(self), fields(purpose = ?purpose))]
    pub async fn issue(
        &self,
        purpose: ChallengePurpose,
        email: &str,
    ) -> Result<IssuedChallenge, AppError> {
        let code = purpose.generate_code();
        let ttl = purpose.ttl_seconds(&self.config);
        let key = purpose.key(email);

        let entry = serde_json::to_string(&ChallengeEntry {
            code: code.clone(),
            attempts: 0,
        })
        .map_err(|e| AppError::internal(format!("Challenge serialization: {e}")))?;

        let mut conn = self.conn().await?;
        self.with_timeout(conn.set_ex::<_, _, ()>(&key, entry, ttl))
            .await?;

        debug!(key = %key, ttl_secs = ttl, "challenge issued");

        Ok(IssuedChallenge {
            code,
            ttl_seconds: ttl,
        })
    }

    /// Validates a candidate code.
    ///
    /// - absent key → `EXPIRED`
    /// - attempt cap already reached → code destroyed, `LOCKED_OUT`
    ///   (the candidate is not even compared)
    /// - wrong code → attempt recorded (TTL preserved), `INVALID_CODE`
    /// - correct code → `Ok`, destroying the entry in `Consume` mode
    ///
    /// Transport failures surface as `TRANSPORT_UNAVAILABLE` and never
    /// count as attempts.
    #[instrument(skip(self, candidate), fields(purpose = ?purpose, mode = ?mode))]
    pub async fn validate(
        &self,
        purpose: ChallengePurpose,
        email: &str,
        candidate: &str,
        mode: ValidationMode,
    ) -> Result<(), AppError> {
        let key = purpose.key(email);
        let mut conn = self.conn().await?;

        let raw = self.get_with_retry(&mut conn, &key).await?;

        let Some(raw) = raw else {
            return Err(AppError::expired("The code has expired or was never issued"));
        };

        let mut entry: ChallengeEntry = serde_json::from_str(&raw)
            .map_err(|e| AppError::internal(format!("Corrupt challenge entry: {e}")))?;

        if entry.attempts >= self.config.max_attempts {
            self.with_timeout(conn.del::<_, ()>(&key)).await?;
            return Err(AppError::LockedOut);
        }

        if entry.code != candidate {
            entry.attempts += 1;
            let updated = serde_json::to_string(&entry)
                .map_err(|e| AppError::internal(format!("Challenge serialization: {e}")))?;

            // KEEPTTL: recording an attempt must not extend the code's life.
            let mut set = redis::cmd("SET");
            set.arg(&key).arg(updated).arg("KEEPTTL");
            let _: () = self.with_timeout(set.query_async(&mut conn)).await?;

            return Err(AppError::invalid_code("Incorrect code"));
        }

        if mode == ValidationMode::Consume {
            self.with_timeout(conn.del::<_, ()>(&key)).await?;
        }

        Ok(())
    }

    /// Remaining TTL of a live code, if any.
    #[instrument(skip(self), fields(purpose = ?purpose))]
    pub async fn status(
        &self,
        purpose: ChallengePurpose,
        email: &str,
    ) -> Result<Option<ChallengeStatus>, AppError> {
        let key = purpose.key(email);
        let mut conn = self.conn().await?;

        let ttl: i64 = self
            .with_timeout(redis::cmd("TTL").arg(&key).query_async(&mut conn))
            .await?;

        if ttl < 0 {
            return Ok(None);
        }

        Ok(Some(ChallengeStatus {
            remaining_ttl_seconds: ttl as u64,
        }))
    }

    /// Destroys any live code for the pair.
    #[instrument(skip(self), fields(purpose = ?purpose))]
    pub async fn remove(
        &self,
        purpose: ChallengePurpose,
        email: &str,
    ) -> Result<(), AppError> {
        let key = purpose.key(email);
        let mut conn = self.conn().await?;
        self.with_timeout(conn.del::<_, ()>(&key)).await
    }

    /// GET with a single jittered retry. Reads are idempotent; mutations
    /// are never retried.
    async fn get_with_retry(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        match self
            .with_timeout(conn.get::<_, Option<String>>(key))
            .await
        {
            Ok(value) => Ok(value),
            Err(AppError::TransportUnavailable(_)) => {
                let jitter = rand::thread_rng().gen_range(25..125);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                self.with_timeout(conn.get::<_, Option<String>>(key)).await
            }
            Err(e) => Err(e),
        }
    }
}
