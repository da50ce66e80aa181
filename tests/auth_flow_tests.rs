use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "trainhub-{tag}-{}-{nanos}.sqlite",
        std::process::id()
    ));
    path
}

async fn setup(tag: &str) -> (Router, PathBuf) {
    let path = temp_db_path(tag);
    let database_url = format!("sqlite:{}", path.display());
    let store = trainhub::db::spawn(&database_url)
        .await
        .expect("open database");
    trainhub::service::accounts::seed_admin(&store, "admin", "pwd")
        .await
        .expect("seed admin");

    let state = trainhub::router::AppState::new(store, 24);
    (trainhub::router::app_router(state), path)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(request).await.expect("request failed");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await
}

#[tokio::test]
async fn seeded_admin_login_issues_a_working_token() {
    let (app, path) = setup("login-ok").await;

    let (status, body) = login(&app, "admin", "pwd").await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token");
    assert_eq!(body["user"]["username"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = send(&app, "GET", "/api/schools", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let (app, path) = setup("login-bad").await;

    let (status, body) = login(&app, "admin", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    let (status, body) = login(&app, "nobody", "pwd").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn api_routes_require_a_session_token() {
    let (app, path) = setup("no-token").await;

    let (status, body) = send(&app, "GET", "/api/schools", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let (status, _) = send(&app, "GET", "/api/schools", Some("forged-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Liveness stays open.
    let (status, _) = send(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn change_password_rotates_the_credential() {
    let (app, path) = setup("change-password").await;

    let (_, body) = login(&app, "admin", "pwd").await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/auth/change-password",
        Some(&token),
        Some(json!({"current_password": "wrong", "new_password": "next"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    let (status, _) = send(
        &app,
        "POST",
        "/auth/change-password",
        Some(&token),
        Some(json!({"current_password": "pwd", "new_password": "next"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "admin", "pwd").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "admin", "next").await;
    assert_eq!(status, StatusCode::OK);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn expired_sessions_are_rejected_and_purged() {
    let path = temp_db_path("session-expiry");
    let database_url = format!("sqlite:{}", path.display());
    let store = trainhub::db::spawn(&database_url)
        .await
        .expect("open database");
    trainhub::service::accounts::seed_admin(&store, "admin", "pwd")
        .await
        .expect("seed admin");

    // Negative TTL: every issued session is already expired.
    let state = trainhub::router::AppState::new(store.clone(), -1);
    let app = trainhub::router::app_router(state);

    let (status, body) = login(&app, "admin", "pwd").await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token").to_string();

    let (status, body) = send(&app, "GET", "/api/schools", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    // The lookup deletes the expired row, it does not just skip it.
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(store.pool())
        .await
        .expect("count sessions");
    assert_eq!(remaining, 0);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn repeated_logins_upsert_one_device_row() {
    let (app, path) = setup("device-upsert").await;

    let device = json!({"device_id": "tablet-7", "platform": "android"});
    for _ in 0..2 {
        let (status, _) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"username": "admin", "password": "pwd", "device": device})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = login(&app, "admin", "pwd").await;
    let token = body["token"].as_str().unwrap().to_string();
    let admin_id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/user_devices", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["device_id"], "tablet-7");
    assert_eq!(rows[0]["user_id"], admin_id.as_str());
    assert!(rows[0]["last_seen_at"].is_string());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn user_created_through_crud_can_log_in() {
    let (app, path) = setup("crud-user-login").await;

    let (_, body) = login(&app, "admin", "pwd").await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/api/users",
        Some(&token),
        Some(json!({
            "username": "mentor1",
            "name": "Huda",
            "role": "mentor",
            "password": "pw1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = login(&app, "mentor1", "pw1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "mentor");

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn deactivated_users_cannot_log_in_or_keep_sessions() {
    let (app, path) = setup("deactivated").await;

    let (_, body) = login(&app, "admin", "pwd").await;
    let admin_token = body["token"].as_str().unwrap().to_string();

    let (_, created) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin_token),
        Some(json!({
            "username": "mentor1",
            "name": "Huda",
            "role": "mentor",
            "password": "pw1",
        })),
    )
    .await;
    let mentor_id = created["id"].as_str().unwrap().to_string();

    let (_, body) = login(&app, "mentor1", "pw1").await;
    let mentor_token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/users/{mentor_id}"),
        Some(&admin_token),
        Some(json!({"active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "mentor1", "pw1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/schools", Some(&mentor_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let _ = std::fs::remove_file(&path);
}
