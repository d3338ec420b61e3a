use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use sqlx::PgPool;
use uuid::Uuid;

use stadion::config::challenge::ChallengeConfig;
use stadion::config::cors::CorsConfig;
use stadion::config::email::EmailConfig;
use stadion::config::jwt::JwtConfig;
use stadion::config::rate_limit::RateLimitConfig;
use stadion::modules::challenges::ChallengeStore;
use stadion::router::init_router;
use stadion::state::AppState;
use stadion::utils::email::EmailNotifier;
use stadion::utils::errors::AppError;
use stadion::utils::password::hash_password;

/// One captured outbound email.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub code: String,
    pub kind: &'static str,
}

/// Email notifier that records instead of sending.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl RecordingNotifier {
    #[allow(dead_code)]
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == email)
            .map(|m| m.code.clone())
    }

    #[allow(dead_code)]
    pub fn count_for(&self, email: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == email)
            .count()
    }
}

#[async_trait]
impl EmailNotifier for RecordingNotifier {
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        _ttl_minutes: u64,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to_email.to_string(),
            code: code.to_string(),
            kind: "verification",
        });
        Ok(())
    }

    async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
        _ttl_minutes: u64,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to_email.to_string(),
            code: code.to_string(),
            kind: "reset",
        });
        Ok(())
    }
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-key-for-testing-purposes".to_string(),
        algorithm: jsonwebtoken::Algorithm::HS256,
        access_token_expires_minutes: 15,
        refresh_token_expires_days: 7,
        twofa_pending_expires_seconds: 300,
        reset_token_expires_seconds: 600,
        cookie_secure: false,
    }
}

pub fn test_state(pool: PgPool) -> (AppState, RecordingNotifier) {
    test_state_with_rate_limit(pool, RateLimitConfig::default())
}

pub fn test_state_with_rate_limit(
    pool: PgPool,
    rate_limit_config: RateLimitConfig,
) -> (AppState, RecordingNotifier) {
    dotenvy::dotenv().ok();
    let notifier = RecordingNotifier::default();

    let state = AppState {
        db: pool,
        challenges: ChallengeStore::new(ChallengeConfig::from_env()).unwrap(),
        notifier: Arc::new(notifier.clone()),
        jwt_config: test_jwt_config(),
        email_config: EmailConfig::from_env(),
        cors_config: CorsConfig::from_env(),
        rate_limit_config,
    };

    (state, notifier)
}

pub fn setup_test_app(pool: PgPool) -> (axum::Router, RecordingNotifier) {
    let (state, notifier) = test_state(pool);
    (init_router(state), notifier)
}

#[allow(dead_code)]
pub fn generate_unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4().simple())
}

/// Inserts a user directly, bypassing the HTTP surface.
#[allow(dead_code)]
pub async fn create_test_user(pool: &PgPool, email: &str, password: &str, role: &str) -> Uuid {
    let hashed = hash_password(password).unwrap();

    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO users (first_name, last_name, email, password, role)
         VALUES ($1, $2, $3, $4, $5::user_role)
         RETURNING id",
    )
    .bind("Test")
    .bind("User")
    .bind(email)
    .bind(&hashed)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[allow(dead_code)]
pub fn bearer_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("x-forwarded-for", "198.51.100.7");

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[allow(dead_code)]
pub async fn response_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub async fn assert_error_code(response: Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0]["code"], code);
}

/// Registers and logs a user in over HTTP, returning (access, refresh).
#[allow(dead_code)]
pub async fn login_for_tokens(
    app: &axum::Router,
    email: &str,
    password: &str,
) -> (String, String) {
    use tower::ServiceExt;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    (
        body["data"]["access_token"].as_str().unwrap().to_string(),
        body["data"]["refresh_token"].as_str().unwrap().to_string(),
    )
}
