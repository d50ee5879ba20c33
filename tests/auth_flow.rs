//! Router-level tests for the admin session endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use storefront::auth::TokenAuthority;
use storefront::config::Config;
use storefront::db::{Role, User};
use storefront::AppState;

const ADMIN_EMAIL: &str = "admin@webtech-jcc.com";
const ADMIN_PASSWORD: &str = "admin123";

/// Test application context
struct TestApp {
    router: Router,
    authority: Arc<TokenAuthority>,
    admin: User,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    async fn with_config(config: Config) -> Self {
        let db = storefront::db::init_memory()
            .await
            .expect("Failed to open in-memory database");
        let state = AppState::new(config, db);
        let authority = state.authority.clone();

        let admin = authority
            .create_user(
                ADMIN_EMAIL,
                ADMIN_PASSWORD,
                Role::Admin,
                Some("Admin".to_string()),
                Some("User".to_string()),
            )
            .await
            .expect("Failed to seed admin");

        Self {
            router: storefront::api::create_router(Arc::new(state)),
            authority,
            admin,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<String>, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, cookies, body)
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Vec<String>, Value) {
        self.send(login_request(email, password)).await
    }

    async fn login_token(&self) -> String {
        let (status, _, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.token_secret = Some("integration-test-secret-0123456789abcdef".to_string());
    config
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": email, "password": password }).to_string(),
        ))
        .unwrap();
    let peer: SocketAddr = "203.0.113.7:41000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn with_cookie(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("adminToken={}", token))
        .body(Body::empty())
        .unwrap()
}

fn change_password(token: &str, current: &str, new: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/api/auth/update-password")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "currentPassword": current, "newPassword": new }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_login_sets_cookie_and_returns_summary() {
    let app = TestApp::new().await;

    let (status, cookies, body) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["firstName"], "Admin");
    assert!(body["user"].get("passwordHash").is_none());

    let token = body["token"].as_str().unwrap();
    let cookie = cookies
        .iter()
        .find(|c| c.starts_with("adminToken="))
        .expect("session cookie");
    assert!(cookie.contains(token));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() {
    let app = TestApp::new().await;
    let (status, _, _) = app.login("  ADMIN@webtech-jcc.com ", ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::new().await;

    let (status, cookies, body) = app.login(ADMIN_EMAIL, "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_credentials");
    assert!(cookies.is_empty());

    let (status, _, body) = app.login("nobody@webtech-jcc.com", ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn test_login_requires_fields() {
    let app = TestApp::new().await;
    let (status, _, body) = app.login("", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_login_non_admin_is_forbidden() {
    let app = TestApp::new().await;
    app.authority
        .create_user("shopper@webtech-jcc.com", "shopper1", Role::User, None, None)
        .await
        .unwrap();

    let (status, cookies, body) = app.login("shopper@webtech-jcc.com", "shopper1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
    assert!(cookies.is_empty());
}

#[tokio::test]
async fn test_verify_with_cookie_and_bearer() {
    let app = TestApp::new().await;
    let token = app.login_token().await;

    let (status, _, body) = app.send(with_cookie("GET", "/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["id"], app.admin.id);

    let (status, _, body) = app.send(bearer("GET", "/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn test_verify_without_token() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/api/auth/verify")
        .body(Body::empty())
        .unwrap();

    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "No token provided");
}

#[tokio::test]
async fn test_verify_rejects_tampered_token() {
    let app = TestApp::new().await;
    let token = app.login_token().await;
    let tampered = format!("{}x", token);

    let (status, _, body) = app.send(bearer("GET", "/api/auth/verify", &tampered)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new().await;
    let issued_at = Utc::now() - Duration::hours(25);
    let token = app
        .authority
        .codec()
        .issue_at(&app.admin.id, app.admin.token_version, issued_at)
        .unwrap();

    let (status, _, body) = app.send(bearer("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "token_expired");
}

#[tokio::test]
async fn test_token_from_stale_version_is_rejected() {
    let app = TestApp::new().await;
    let token = app
        .authority
        .codec()
        .issue(&app.admin.id, app.admin.token_version + 1)
        .unwrap();

    let (status, _, body) = app.send(bearer("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_invalidated");
}

#[tokio::test]
async fn test_me_requires_admin_session() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .uri("/api/auth/me")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.login_token().await;
    let (status, _, body) = app.send(bearer("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn test_demoted_account_token_is_forbidden() {
    let app = TestApp::new().await;
    let shopper = app
        .authority
        .create_user("shopper@webtech-jcc.com", "shopper1", Role::User, None, None)
        .await
        .unwrap();
    let token = app
        .authority
        .codec()
        .issue(&shopper.id, shopper.token_version)
        .unwrap();

    let (status, _, body) = app.send(bearer("GET", "/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_password_change_revokes_every_session() {
    let app = TestApp::new().await;
    let first = app.login_token().await;
    let second = app.login_token().await;

    let (status, cookies, body) = app
        .send(change_password(&first, ADMIN_PASSWORD, "new-secret"))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert!(cookies.iter().any(|c| c.starts_with("adminToken=;")
        || c.starts_with("adminToken=\"\"")
        || c.contains("Max-Age=0")));

    for token in [&first, &second] {
        let (status, _, body) = app.send(bearer("GET", "/api/auth/verify", token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "session_invalidated");
    }

    let (status, _, _) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app.login(ADMIN_EMAIL, "new-secret").await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap();
    let (status, _, _) = app.send(bearer("GET", "/api/auth/verify", fresh)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_change_with_wrong_current_password() {
    let app = TestApp::new().await;
    let token = app.login_token().await;

    let (status, _, body) = app
        .send(change_password(&token, "not-my-password", "new-secret"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Current password is incorrect");

    // Nothing changed: the token still works
    let (status, _, _) = app.send(bearer("GET", "/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_change_rejects_short_password() {
    let app = TestApp::new().await;
    let token = app.login_token().await;

    let (status, _, body) = app.send(change_password(&token, ADMIN_PASSWORD, "abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _, _) = app.send(bearer("GET", "/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_is_advisory() {
    let app = TestApp::new().await;
    let token = app.login_token().await;

    let (status, cookies, body) = app.send(with_cookie("POST", "/api/auth/logout", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(cookies.iter().any(|c| c.starts_with("adminToken=")));

    // A captured copy of the token keeps working
    let (status, _, _) = app.send(bearer("GET", "/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sixth_login_in_window_is_rate_limited() {
    let app = TestApp::new().await;

    for _ in 0..5 {
        let (status, _, _) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(login_request(ADMIN_EMAIL, ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
}

#[tokio::test]
async fn test_sixth_wrong_password_in_window_is_rate_limited() {
    let app = TestApp::new().await;

    // The fifth failure also locks the account; the limiter still answers first
    for _ in 0..5 {
        let (status, _, body) = app.login(ADMIN_EMAIL, "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_credentials");
    }

    let (status, _, body) = app.login(ADMIN_EMAIL, "wrong-password").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "too_many_requests");
}

#[tokio::test]
async fn test_rate_limit_does_not_apply_to_verify() {
    let app = TestApp::new().await;
    let token = app.login_token().await;

    for _ in 0..10 {
        let (status, _, _) = app.send(bearer("GET", "/api/auth/verify", &token)).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_account_lockout_after_repeated_failures() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    let app = TestApp::with_config(config).await;

    for _ in 0..5 {
        let (status, _, _) = app.login(ADMIN_EMAIL, "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _, body) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["code"], "locked");
}

#[tokio::test]
async fn test_service_routes() {
    let app = TestApp::new().await;

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Server is running");

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let request = Request::builder()
        .uri("/api/products")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
}
