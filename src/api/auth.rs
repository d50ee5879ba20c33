//! Admin session endpoints and the admin guard middleware.

use axum::{
    async_trait,
    body::Body,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApiError;
use super::metrics;
use crate::auth::AuthError;
use crate::config::AuthConfig;
use crate::db::{LoginRequest, LoginResponse, UpdatePasswordRequest, User, UserSummary};
use crate::AppState;

/// The verified admin for the current request
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin(pub User);

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub valid: bool,
    pub user: UserSummary,
}

/// Extract the session token: cookie first, then `Authorization: Bearer`
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone()).path("/").build()
}

/// Log a failed verification with its distinct category
fn log_verify_failure(err: &AuthError, path: &str) {
    match err {
        AuthError::Expired => info!(path, "Session token expired"),
        AuthError::SessionInvalidated => {
            warn!(path, "Session token superseded by a password change")
        }
        AuthError::Forbidden => warn!(path, "Session token belongs to a non-admin account"),
        AuthError::Unauthenticated => info!(path, "Missing, malformed or orphaned session token"),
        other => warn!(path, error = %other, "Session verification failed"),
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let Json(request) =
        body.map_err(|_| ApiError::validation("Email and password are required"))?;

    let session = match state.authority.login(&request.email, &request.password).await {
        Ok(session) => session,
        Err(e) => {
            metrics::record_login(e.kind());
            return Err(e.into());
        }
    };
    metrics::record_login("success");

    let jar = jar.add(session_cookie(&state.config.auth, session.token.clone()));

    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            token: session.token,
            user: UserSummary::from(&session.user),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Only clears the cookie. The token itself stays valid until it expires or
/// the password changes.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(removal_cookie(&state.config.auth));
    (
        jar,
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// GET /api/auth/verify
pub async fn verify(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let token = extract_token(&headers, &state.config.auth.cookie_name);
    let had_token = token.is_some();

    match state.authority.verify(token.as_deref()).await {
        Ok(user) => {
            metrics::record_verify("valid");
            Json(VerifyResponse {
                success: true,
                valid: true,
                user: UserSummary::from(&user),
            })
            .into_response()
        }
        Err(e) => {
            metrics::record_verify(e.kind());
            log_verify_failure(&e, "/api/auth/verify");
            let err = ApiError::from(e).invalid_token();
            let err = if had_token {
                err
            } else {
                err.with_message("No token provided")
            };
            err.into_response()
        }
    }
}

/// GET /api/auth/me
pub async fn me(AuthenticatedAdmin(user): AuthenticatedAdmin) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        user: UserSummary::from(&user),
    })
}

/// PUT /api/auth/update-password
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    AuthenticatedAdmin(user): AuthenticatedAdmin,
    jar: CookieJar,
    body: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let Json(request) = body.map_err(|_| {
        ApiError::validation("Current password and new password are required")
    })?;

    state
        .authority
        .change_password(&user.id, &request.current_password, &request.new_password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => {
                ApiError::from(e).with_message("Current password is incorrect")
            }
            other => ApiError::from(other),
        })?;

    // The caller's own token was revoked along with every other session
    let jar = jar.remove(removal_cookie(&state.config.auth));

    Ok((
        jar,
        Json(MessageResponse {
            success: true,
            message: "Password updated successfully. Please login again.".to_string(),
        }),
    ))
}

/// Middleware that only lets verified admins through.
///
/// The verified record is attached to the request as [`AuthenticatedAdmin`].
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &state.config.auth.cookie_name);

    match state.authority.verify(token.as_deref()).await {
        Ok(user) => {
            metrics::record_verify("valid");
            request.extensions_mut().insert(AuthenticatedAdmin(user));
            Ok(next.run(request).await)
        }
        Err(e) => {
            metrics::record_verify(e.kind());
            log_verify_failure(&e, request.uri().path());
            Err(e.into())
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AuthenticatedAdmin>() {
            return Ok(admin.clone());
        }

        let token = extract_token(&parts.headers, &state.config.auth.cookie_name);
        let user = state.authority.verify(token.as_deref()).await.map_err(|e| {
            log_verify_failure(&e, parts.uri.path());
            ApiError::from(e)
        })?;
        Ok(AuthenticatedAdmin(user))
    }
}
