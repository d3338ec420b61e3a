mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceExt;

use common::{
    assert_error_code, bearer_request, create_test_user, generate_unique_email, json_request,
    login_for_tokens, response_json, setup_test_app,
};

async fn active_session_count(pool: &PgPool, user_id: uuid::Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refresh_sessions WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn refresh_rotates_and_replay_revokes_everything(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (_, refresh) = login_for_tokens(&app, &email, "hunter2!Strong").await;
    assert_eq!(active_session_count(&pool, user_id).await, 1);

    // First rotation succeeds and yields a fresh pair.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let new_refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);
    assert_eq!(active_session_count(&pool, user_id).await, 1);

    // Replaying the spent token fails and kills the survivor too.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "REFRESH_REPLAYED").await;
    assert_eq!(active_session_count(&pool, user_id).await, 0);

    // The pair handed out by the rotation is dead as well.
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": new_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
async fn garbage_refresh_token_is_invalid(pool: PgPool) {
    let (app, _) = setup_test_app(pool);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": "not-a-token" }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "REFRESH_INVALID").await;

    // No token anywhere: same kind.
    let response = app
        .oneshot(json_request("POST", "/api/v1/auth/refresh", json!({})))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "REFRESH_INVALID").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn access_token_is_not_a_refresh_token(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": access }),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "REFRESH_INVALID").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn logout_revokes_the_session(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (_, refresh) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/logout",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(active_session_count(&pool, user_id).await, 0);

    // Logging out twice is a refresh-chain violation, not a success.
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/logout",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
async fn logout_all_revokes_every_session(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;
    login_for_tokens(&app, &email, "hunter2!Strong").await;
    login_for_tokens(&app, &email, "hunter2!Strong").await;
    assert_eq!(active_session_count(&pool, user_id).await, 3);

    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/logout-all",
            &access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["revoked"], 3);
    assert_eq!(active_session_count(&pool, user_id).await, 0);

    // Idempotent: nothing left to revoke.
    let response = app
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/logout-all",
            &access,
            None,
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["data"]["revoked"], 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn session_listing_marks_the_current_one(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (first_access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;
    login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .oneshot(bearer_request(
            "GET",
            "/api/v1/auth/sessions",
            &first_access,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    let sessions = body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    let current: Vec<_> = sessions
        .iter()
        .filter(|s| s["current"] == true)
        .collect();
    assert_eq!(current.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn password_change_keeps_only_the_current_session(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    let user_id = create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (access_a, refresh_a) = login_for_tokens(&app, &email, "hunter2!Strong").await;
    let (_, refresh_b) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .clone()
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/password-change",
            &access_a,
            Some(json!({
                "current_password": "hunter2!Strong",
                "new_password": "newPass!9xyz"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(active_session_count(&pool, user_id).await, 1);

    // The other session's refresh is dead; the current one still rotates.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": refresh_b }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/refresh",
            json!({ "refresh_token": refresh_a }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Old password no longer works, the new one does.
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

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": email, "password": "newPass!9xyz" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn password_change_requires_the_current_password(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (access, _) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    let response = app
        .oneshot(bearer_request(
            "POST",
            "/api/v1/auth/password-change",
            &access,
            Some(json!({
                "current_password": "wrong-password1!",
                "new_password": "newPass!9xyz"
            })),
        ))
        .await
        .unwrap();
    assert_error_code(response, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS").await;
}

#[sqlx::test(migrations = "./migrations")]
async fn refresh_via_cookie_wins_over_body(pool: PgPool) {
    let (app, _) = setup_test_app(pool.clone());
    let email = generate_unique_email();
    create_test_user(&pool, &email, "hunter2!Strong", "athlete").await;

    let (_, refresh) = login_for_tokens(&app, &email, "hunter2!Strong").await;

    // Cookie carries the valid token; the body carries garbage. The
    // cookie must be preferred, so the rotation succeeds.
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/auth/refresh")
        .header("content-type", "application/json")
        .header("cookie", format!("refresh_token={refresh}"))
        .header("x-forwarded-for", "198.51.100.7")
        .body(axum::body::Body::from(
            serde_json::to_string(&json!({ "refresh_token": "garbage" })).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
