//! Challenge-flow tests. These exercise the Redis-backed challenge store
//! end to end and are ignored by default; run them with a Redis reachable
//! at `REDIS_URL` via `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceExt;

use common::{
    assert_error_code, bearer_request, create_test_user, generate_unique_email, json_request,
    login_for_tokens, response_json, setup_test_app,
};

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a running Redis"]
async fn full_password_reset_flow(pool: PgPool) {
    let (app, notifier) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    // A live session that must die with the reset.
    let (_, old_refresh) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/request",
            json!({ "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let code = notifier.last_code_for(&email).expect("reset code sent");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/validate",
            json!({ "email": email, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let reset_token = body["data"]["reset_token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/confirm",
            json!({ "reset_token": reset_token, "new_password": "newPass!9xyz" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Every previous session is revoked.
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refresh_sessions WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active, 0);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": old_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Old password dead, new one works.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": email, "password": "hunter2!Strong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login_for_tokens(&app, &email, "newPass!9xyz").await;
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a running Redis"]
async fn reset_attempts_cap_at_five(pool: PgPool) {
    let (app, notifier) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/request",
            json!({ "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let code = notifier.last_code_for(&email).unwrap();

    // Five wrong attempts each come back as INVALID_CODE.
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password-reset/validate",
                json!({ "email": email, "code": "WRONG123" }),
            ))
            .await
            .unwrap();
        assert_error_code(response, StatusCode::BAD_REQUEST, "INVALID_CODE").await;
    }

    // The sixth attempt is locked out without comparing, even with the
    // correct code, and the code is destroyed.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/validate",
            json!({ "email": email, "code": code }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::TOO_MANY_REQUESTS, "LOCKED_OUT").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/validate",
            json!({ "email": email, "code": code }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "EXPIRED").await;
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a running Redis"]
async fn reset_request_does_not_reveal_registration(pool: PgPool) {
    let (app, notifier) = setup_test_app(pool.clone());
    let known = generate_unique_email();
    let unknown = generate_unique_email();
    create_test_user(&pool, &known, "hunter2!Strong", "athlete").await;

    let known_response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/request",
            json!({ "email": known }),
        ))
        .await
        .unwrap();

    let unknown_response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/request",
            json!({ "email": unknown }),
        ))
        .await
        .unwrap();

    assert_eq!(known_response.status(), StatusCode::ACCEPTED);
    assert_eq!(unknown_response.status(), StatusCode::ACCEPTED);

    // Identical body shape and content either way.
    let first = response_json(known_response).await;
    let second = response_json(unknown_response).await;
    assert_eq!(first, second);

    // But only the registered address got an email.
    assert_eq!(notifier.count_for(&known), 1);
    assert_eq!(notifier.count_for(&unknown), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a running Redis"]
async fn a_new_request_supersedes_the_previous_code(pool: PgPool) {
    let (app, notifier) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password-reset/request",
                json!({ "email": email }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let sent = notifier.sent.lock().unwrap().clone();
    let codes: Vec<_> = sent.iter().filter(|m| m.to == email).collect();
    assert_eq!(codes.len(), 2);
    let first_code = codes[0].code.clone();
    let second_code = codes[1].code.clone();
    drop(sent);

    // The first code is gone; only the latest validates.
    if first_code != second_code {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/password-reset/validate",
                json!({ "email": email, "code": first_code }),
            ))
            .await
            .unwrap();
        assert_error_code(response, StatusCode::BAD_REQUEST, "INVALID_CODE").await;
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/password-reset/validate",
            json!({ "email": email, "code": second_code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a running Redis"]
async fn email_verification_flow(pool: PgPool) {
    let (app, notifier) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;
    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/email/request-verification",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let code = notifier.last_code_for(&email).expect("verification code sent");
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/email/verify",
            json!({ "email": email, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let verified = sqlx::query_scalar::<_, bool>(
        "SELECT is_email_verified FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(verified);

    // The code was consumed; replaying it fails.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/email/verify",
            json!({ "email": email, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // And a re-request is refused now that the address is verified.
    let response = app
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/email/request-verification",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION").await;
}
