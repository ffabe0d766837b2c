//! HTTP API tests driven through the full router.
//!
//! Tests cover:
//! - Health and metrics endpoints
//! - Registration, login, profile, and logout
//! - Role, permission, and assignment administration
//! - Capability guards per route
//! - Error envelope shape and status mapping
//! - Rate limiting and security headers

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower::ServiceExt;
use warden_core::api::{build_router, AppState, RouterOptions};
use warden_core::config::{Config, CorsConfig, RateLimitSettings};
use warden_core::db::Storage;
use warden_core::rbac::seed_defaults;
use warden_core::telemetry::MetricsRegistry;

const SECRET: &str = "api-test-secret-that-is-at-least-32-bytes";
const ADMIN_EMAIL: &str = "admin@admin.com";
const PASSWORD: &str = "correct horse battery";

// ============================================================================
// Harness
// ============================================================================

async fn seeded_state(config: &Config) -> AppState {
    let state = AppState::new(config, Storage::memory(), MetricsRegistry::disabled()).unwrap();
    seed_defaults(state.admin.graph().as_ref()).await.unwrap();
    state
        .account
        .ensure_admin(ADMIN_EMAIL, PASSWORD)
        .await
        .unwrap();
    state
}

async fn app() -> Router {
    let config = Config::for_testing(SECRET);
    let state = seeded_state(&config).await;
    build_router(state, RouterOptions::from_config(&config))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, email: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": email, "password": PASSWORD})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["data"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Register `email` and return its identity id.
async fn register(app: &Router, email: &str) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": email, "password": PASSWORD})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["data"]["id"].as_i64().unwrap()
}

async fn role_id(app: &Router, admin: &str, name: &str) -> i64 {
    let body = json_body(send(app, Method::GET, "/api/roles", Some(admin), None).await).await;
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == name)
        .and_then(|r| r["id"].as_i64())
        .unwrap()
}

async fn bad_login(app: &Router) -> Response {
    send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": ADMIN_EMAIL, "password": "wrong password"})),
    )
    .await
}

async fn assert_error(response: Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], code);
}

// ============================================================================
// Operational Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = app().await;
    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_metrics_disabled_is_not_found() {
    let app = app().await;
    let response = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Account Flows
// ============================================================================

#[tokio::test]
async fn test_register_login_and_me() {
    let app = app().await;
    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "email": "  Ada@Example.com ",
            "password": PASSWORD,
            "first_name": "Ada",
            "username": "ada"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert!(body["data"].get("credential").is_none());
    assert!(!body.to_string().contains("argon2"));

    let token = login(&app, "ada@example.com").await;
    let response = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["roles"], json!([]));
}

#[tokio::test]
async fn test_me_includes_roles_and_permissions() {
    let app = app().await;
    let token = login(&app, ADMIN_EMAIL).await;
    let body = json_body(send(&app, Method::GET, "/api/auth/me", Some(&token), None).await).await;

    let roles = body["data"]["roles"].as_array().unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0]["name"], "Admin");
    assert_eq!(roles[0]["permissions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_update_profile() {
    let app = app().await;
    register(&app, "grace@example.com").await;
    let token = login(&app, "grace@example.com").await;
    let first: String = FirstName().fake();
    let last: String = LastName().fake();

    let response = send(
        &app,
        Method::PUT,
        "/api/auth/me",
        Some(&token),
        Some(json!({"first_name": format!(" {} ", first), "last_name": last})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["first_name"], first.as_str());
    assert_eq!(body["data"]["last_name"], last.as_str());
    assert_eq!(body["data"]["email"], "grace@example.com");
}

#[tokio::test]
async fn test_register_rejections() {
    let app = app().await;
    register(&app, "taken@example.com").await;

    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": "TAKEN@example.com", "password": PASSWORD})),
    )
    .await;
    assert_error(response, StatusCode::CONFLICT, "EMAIL_TAKEN").await;

    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": "short@example.com", "password": "short"})),
    )
    .await;
    assert_error(response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR").await;

    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": "not-an-email", "password": PASSWORD})),
    )
    .await;
    assert_error(response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR").await;
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = app().await;
    let wrong_password = bad_login(&app).await;
    let unknown_email = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ghost@example.com", "password": PASSWORD})),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let a = json_body(wrong_password).await;
    let b = json_body(unknown_email).await;
    assert_eq!(a["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(a["error"]["message"], b["error"]["message"]);
}

#[tokio::test]
async fn test_logout_requires_token() {
    let app = app().await;
    let response = send(&app, Method::POST, "/api/auth/logout", None, None).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "MISSING_TOKEN").await;

    let token = login(&app, ADMIN_EMAIL).await;
    let response = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["data"]["message"].as_str().unwrap().contains("Discard"));
}

#[tokio::test]
async fn test_garbage_token_is_invalid() {
    let app = app().await;
    let response = send(&app, Method::GET, "/api/auth/me", Some("not.a.jwt"), None).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN").await;
}

// ============================================================================
// Role Administration
// ============================================================================

#[tokio::test]
async fn test_role_lifecycle() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;

    let response = send(
        &app,
        Method::POST,
        "/api/roles",
        Some(&admin),
        Some(json!({"name": "Auditor", "description": "Read-only reviewer"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["data"]["id"].as_i64().unwrap();

    let response = send(
        &app,
        Method::POST,
        "/api/roles",
        Some(&admin),
        Some(json!({"name": "Auditor"})),
    )
    .await;
    assert_error(response, StatusCode::CONFLICT, "DUPLICATE_NAME").await;

    let response = send(
        &app,
        Method::PUT,
        &format!("/api/roles/{}", id),
        Some(&admin),
        Some(json!({"description": "Reviews records"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["description"], "Reviews records");

    let permissions = json_body(
        send(&app, Method::GET, "/api/permissions", Some(&admin), None).await,
    )
    .await;
    let ids: Vec<i64> = permissions["data"]
        .as_array()
        .unwrap()
        .iter()
        .take(2)
        .map(|p| p["id"].as_i64().unwrap())
        .collect();

    let uri = format!("/api/roles/{}/permissions", id);
    let response = send(
        &app,
        Method::PUT,
        &uri,
        Some(&admin),
        Some(json!({"permission_ids": [ids[1], ids[0]]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let granted = json_body(response).await;
    assert_eq!(granted["data"][0]["id"], ids[1]);
    assert_eq!(granted["data"][1]["id"], ids[0]);

    let response = send(
        &app,
        Method::PUT,
        &uri,
        Some(&admin),
        Some(json!({"permission_ids": [999_999]})),
    )
    .await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
    let unchanged = json_body(send(&app, Method::GET, &uri, Some(&admin), None).await).await;
    assert_eq!(unchanged["data"].as_array().unwrap().len(), 2);

    let response = send(&app, Method::DELETE, &format!("/api/roles/{}", id), Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Method::GET, &format!("/api/roles/{}", id), Some(&admin), None).await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

#[tokio::test]
async fn test_role_name_validation() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;
    let response = send(
        &app,
        Method::POST,
        "/api/roles",
        Some(&admin),
        Some(json!({"name": "   "})),
    )
    .await;
    assert_error(response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR").await;
}

#[tokio::test]
async fn test_permission_lifecycle() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;

    let response = send(
        &app,
        Method::POST,
        "/api/permissions",
        Some(&admin),
        Some(json!({"name": "export_reports"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = json_body(response).await["data"]["id"].as_i64().unwrap();

    let response = send(
        &app,
        Method::PUT,
        &format!("/api/permissions/{}", id),
        Some(&admin),
        Some(json!({"name": "export_all_reports"})),
    )
    .await;
    assert_eq!(json_body(response).await["data"]["name"], "export_all_reports");

    let response = send(
        &app,
        Method::DELETE,
        &format!("/api/permissions/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

// ============================================================================
// Capability Guards
// ============================================================================

#[tokio::test]
async fn test_non_admin_cannot_mutate() {
    let app = app().await;
    register(&app, "plain@example.com").await;
    let token = login(&app, "plain@example.com").await;

    let response = send(
        &app,
        Method::POST,
        "/api/roles",
        Some(&token),
        Some(json!({"name": "Sneaky"})),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = send(
        &app,
        Method::POST,
        "/api/permissions",
        Some(&token),
        Some(json!({"name": "sneaky"})),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = send(&app, Method::GET, "/api/roles", Some(&token), None).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = send(&app, Method::GET, "/api/permissions", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_manager_reads_but_does_not_write() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;
    let manager_id = register(&app, "boss@example.com").await;
    let manager_role = role_id(&app, &admin, "Manager").await;

    let response = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/roles", manager_id),
        Some(&admin),
        Some(json!({"role_id": manager_role})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"][0]["name"], "Manager");

    let manager = login(&app, "boss@example.com").await;
    let response = send(&app, Method::GET, "/api/roles", Some(&manager), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"].as_array().unwrap().len(), 4);

    let response = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/roles", manager_id),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Method::DELETE,
        &format!("/api/users/{}/roles/{}", manager_id, manager_role),
        Some(&manager),
        None,
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn test_revoke_takes_effect_on_next_request() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;
    let user_id = register(&app, "short-lived@example.com").await;
    let manager_role = role_id(&app, &admin, "Manager").await;

    send(
        &app,
        Method::POST,
        &format!("/api/users/{}/roles", user_id),
        Some(&admin),
        Some(json!({"role_id": manager_role})),
    )
    .await;
    let token = login(&app, "short-lived@example.com").await;
    let response = send(&app, Method::GET, "/api/roles", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Method::DELETE,
        &format!("/api/users/{}/roles/{}", user_id, manager_role),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Method::GET, "/api/roles", Some(&token), None).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn test_assign_unknown_role_is_not_found() {
    let app = app().await;
    let admin = login(&app, ADMIN_EMAIL).await;
    let user_id = register(&app, "lonely@example.com").await;

    let response = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/roles", user_id),
        Some(&admin),
        Some(json!({"role_id": 424_242})),
    )
    .await;
    assert_error(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

// ============================================================================
// Cross-cutting Layers
// ============================================================================

#[tokio::test]
async fn test_security_headers_on_api_responses() {
    let app = app().await;
    let response = send(&app, Method::GET, "/api/auth/me", None, None).await;
    let headers = response.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::REFERRER_POLICY], "no-referrer");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_auth_rate_limit() {
    let config = Config::for_testing(SECRET);
    let state = seeded_state(&config).await;
    let settings = RateLimitSettings {
        enabled: true,
        ..Default::default()
    };
    let app = build_router(state, RouterOptions::new(&settings, CorsConfig::default()));

    for _ in 0..5 {
        let response = bad_login(&app).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = bad_login(&app).await;
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_error(response, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED").await;

    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_rate_limit_ignores_forwarded_for() {
    let config = Config::for_testing(SECRET);
    let state = seeded_state(&config).await;
    let settings = RateLimitSettings {
        enabled: true,
        ..Default::default()
    };
    let app = build_router(state, RouterOptions::new(&settings, CorsConfig::default()));
    let peer: SocketAddr = "192.0.2.10:50000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..6 {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Forwarded-For", format!("10.0.0.{}", i))
            .body(Body::from(
                json!({"email": ADMIN_EMAIL, "password": "wrong password"}).to_string(),
            ))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }

    assert_eq!(statuses[..5], [StatusCode::UNAUTHORIZED; 5]);
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_admin_rate_limit_applies_before_authentication() {
    let config = Config::for_testing(SECRET);
    let state = seeded_state(&config).await;
    let settings = RateLimitSettings {
        enabled: true,
        admin_max_requests: 3,
        ..Default::default()
    };
    let app = build_router(state, RouterOptions::new(&settings, CorsConfig::default()));

    for _ in 0..3 {
        let response = send(&app, Method::GET, "/api/roles", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = send(&app, Method::GET, "/api/roles", None, None).await;
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_error(response, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED").await;

    // Other resources are outside the admin bucket.
    let response = send(&app, Method::GET, "/api/permissions", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
