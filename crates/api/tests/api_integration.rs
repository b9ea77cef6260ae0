//! API integration tests.
//!
//! These run the full router, including the auth and rate limit layers,
//! against a mock database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use serde_json::{Value, json};
use tower::ServiceExt;
use volunteer_api::{AppState, app};
use volunteer_common::config::{
    AuthConfig, Config, DatabaseConfig, LoggingConfig, ServerConfig,
};
use volunteer_db::entities::user::{self, Role, UserStatus};

fn create_test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/test".to_string(),
            max_connections: 10,
            min_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            token_ttl_hours: 1,
        },
        push: None,
        logging: LoggingConfig::default(),
    }
}

fn test_user(id: &str, role: Role, status: UserStatus) -> user::Model {
    user::Model {
        id: id.to_string(),
        name: "Test User".to_string(),
        email: format!("{id}@example.com"),
        password_hash: String::new(),
        role,
        status,
        phone: None,
        avatar_url: None,
        bio: None,
        skills: json!(["first aid"]),
        last_login_at: None,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn create_test_state(db: DatabaseConnection) -> AppState {
    AppState::new(Arc::new(db), &create_test_config()).unwrap()
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

/// A router whose database answers the middleware's user lookup, plus a
/// token for that user.
fn signed_in(user: user::Model) -> (Router, String) {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user.clone()]])
        .into_connection();
    let state = create_test_state(db);
    let token = state.auth_service.issue_token(&user).unwrap();
    (app(state), token)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_version() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/api/nonexistent", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_without_token_returns_401() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/api/auth/me", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_garbage_token_returns_401() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/api/auth/me", Some("not-a-jwt")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let (router, token) = signed_in(test_user("u1", Role::Volunteer, UserStatus::Active));

    let response = router
        .oneshot(get("/api/auth/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-RateLimit-Limit"));
    let body = body_json(response).await;
    let user = &body["data"];
    assert_eq!(user["id"], "u1");
    assert_eq!(user["role"], "volunteer");
    assert_eq!(user["skills"], json!(["first aid"]));
    assert!(user.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_inactive_user_returns_403() {
    let (router, token) = signed_in(test_user("u1", Role::Volunteer, UserStatus::Inactive));

    let response = router
        .oneshot(get("/api/auth/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_route_rejects_volunteer() {
    let (router, token) = signed_in(test_user("u1", Role::Volunteer, UserStatus::Active));

    let response = router
        .oneshot(get("/api/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_event_creation_requires_staff() {
    let (router, token) = signed_in(test_user("u1", Role::Volunteer, UserStatus::Active));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/events")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"Cleanup"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_with_invalid_email_returns_validation_error() {
    let body = json!({
        "name": "Ada",
        "email": "not-an-email",
        "password": "correct horse battery",
    });

    let response = app(create_test_state(empty_db()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_register_with_invalid_json_returns_error() {
    let response = app(create_test_state(empty_db()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_notification_stream_requires_auth() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/api/notifications/stream", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_notification_stream_accepts_query_token() {
    let (router, token) = signed_in(test_user("u1", Role::Volunteer, UserStatus::Active));

    let response = router
        .oneshot(get(&format!("/api/notifications/stream?token={token}"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_push_config_is_public() {
    let response = app(create_test_state(empty_db()))
        .oneshot(get("/api/push/config", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["enabled"], false);
    assert!(body["data"]["publicKey"].is_null());
}
