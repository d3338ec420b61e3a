mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

use common::{
    assert_error_code, bearer_request, create_test_user, generate_unique_email, json_request,
    login_for_tokens, response_json, setup_test_app,
};

fn totp_code(secret_b32: &str, email: &str) -> String {
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret_b32.to_string()).to_bytes().unwrap(),
        Some("Stadion".to_string()),
        email.to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

/// Runs the full enrollment over HTTP and returns (secret, backup_codes).
async fn enroll(app: &axum::Router, access: &str, email: &str) -> (String, Vec<String>) {
    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/enable",
            access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    assert!(body["data"]["otpauth_url"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));
    assert!(body["data"]["qr_code"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/confirm",
            access,
            Some(json!({ "code": totp_code(&secret, email) })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    let backup_codes: Vec<String> = body["data"]["backup_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();
    assert_eq!(backup_codes.len(), 10);

    (secret, backup_codes)
}

#[sqlx::test(migrations = "./migrations")]
async fn enrollment_then_two_step_login(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let (secret, _) = enroll(&app, &access, &email).await;

    // Password alone no longer yields tokens.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": email, "password": "hunter2!Strong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["two_factor_required"], true);
    assert!(body["data"].get("access_token").is_none());
    let pending = body["data"]["pending_token"].as_str().unwrap().to_string();

    // The pending token buys nothing on protected routes.
    let response = app
        .clone()
        .oneshot(bearer_request("GET", "/api/v1/users/me", &pending, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Pending token + TOTP completes the sign-in.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/2fa/verify",
            json!({ "pending_token": pending, "code": totp_code(&secret, &email) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["data"]["access_token"].as_str().is_some());
    assert!(body["data"]["refresh_token"].as_str().is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn wrong_totp_is_rejected_at_login(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    enroll(&app, &access, &email).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": email, "password": "hunter2!Strong" }),
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    let pending = body["data"]["pending_token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/2fa/verify",
            json!({ "pending_token": pending, "code": "000000" }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::BAD_REQUEST, "INVALID_CODE").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn backup_code_works_exactly_once(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let (_, backup_codes) = enroll(&app, &access, &email).await;
    let code = backup_codes[0].clone();

    let pending_token = |app: &axum::Router| {
        let email = email.clone();
        let app = app.clone();
        async move {
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/v1/auth/login",
                    json!({ "email": email, "password": "hunter2!Strong" }),
                ))
                .await
                .unwrap();
            let body = response_json(response).await;
            body["data"]["pending_token"].as_str().unwrap().to_string()
        }
    };

    // First use succeeds.
    let pending = pending_token(&app).await;
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/2fa/verify",
            json!({ "pending_token": pending, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second use of the same code fails.
    let pending = pending_token(&app).await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/2fa/verify",
            json!({ "pending_token": pending, "code": code }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::BAD_REQUEST, "INVALID_CODE").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn disable_requires_password_and_code(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let (secret, _) = enroll(&app, &access, &email).await;

    // Wrong password: rejected.
    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/disable",
            &access,
            Some(json!({ "password": "wrong1!wrong", "code": totp_code(&secret, &email) })),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS").await;

    // Correct password + TOTP: disabled.
    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/disable",
            &access,
            Some(json!({ "password": "hunter2!Strong", "code": totp_code(&secret, &email) })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Subsequent login yields tokens directly again.
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": email, "password": "hunter2!Strong" }),
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["data"]["two_factor_required"], false);
    assert!(body["data"]["access_token"].as_str().is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn enable_twice_is_rejected(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    enroll(&app, &access, &email).await;

    let response = app
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/enable",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn confirm_with_wrong_code_does_not_enable(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/enable",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/2fa/confirm",
            &access,
            Some(json!({ "code": "000000" })),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::BAD_REQUEST, "INVALID_CODE").await;

    let enabled = sqlx::query_scalar::<_, bool>("SELECT twofa_enabled FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(!enabled);
}
