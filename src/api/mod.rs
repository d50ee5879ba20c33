pub mod auth;
pub mod error;
pub mod metrics;
pub mod rate_limit;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::CorsConfig;
use crate::AppState;
use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public auth routes; only login is rate limited
    let public_auth_routes = Router::new()
        .route(
            "/login",
            post(auth::login).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::rate_limit_login,
            )),
        )
        .route("/logout", post(auth::logout))
        .route("/verify", get(auth::verify));

    // Admin-only auth routes
    let protected_auth_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/update-password", put(auth::update_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let mut router = Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest(
            "/api/auth",
            public_auth_routes.merge(protected_auth_routes),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.cors) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Build the CORS layer for the configured origins.
///
/// Credentials are allowed so the session cookie reaches the API from the
/// storefront pages. Without configured origins only same-origin calls work.
fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter(|origin| {
            let wildcard = origin.trim() == "*";
            if wildcard {
                tracing::warn!("Ignoring wildcard CORS origin; credentialed requests need explicit origins");
            }
            !wildcard
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Storefront admin API",
        "status": "Server is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
