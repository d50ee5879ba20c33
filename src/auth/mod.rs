//! Session token authority.
//!
//! Issues signed admin session tokens, verifies them, and revokes every
//! outstanding token for an account when its password changes. Tokens are not
//! tracked server-side: revocation works by bumping the account's
//! `token_version`, which every token embeds.

pub mod password;
pub mod token;
pub mod validation;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, LockoutConfig, MAX_LOCK_MINUTES};
use crate::db::{normalize_email, CredentialStore, NewUser, Role, StoreError, User};

pub use token::{SessionClaims, TokenCodec};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("admin privileges required")]
    Forbidden,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session token has expired")]
    Expired,
    #[error("session was invalidated by a password change")]
    SessionInvalidated,
    #[error("account locked until {until}")]
    Locked { until: DateTime<Utc> },
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Forbidden => "forbidden",
            Self::Unauthenticated => "unauthenticated",
            Self::Expired => "expired",
            Self::SessionInvalidated => "session_invalidated",
            Self::Locked { .. } => "locked",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }
}

/// Per-account lockout after repeated password failures
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lock_duration: Duration,
}

impl LockoutPolicy {
    pub fn disabled() -> Self {
        Self {
            max_failed_attempts: 0,
            lock_duration: Duration::zero(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_failed_attempts > 0
    }
}

impl From<&LockoutConfig> for LockoutPolicy {
    fn from(config: &LockoutConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lock_duration: Duration::try_minutes(config.lock_minutes.clamp(0, MAX_LOCK_MINUTES))
                .unwrap_or_else(Duration::zero),
        }
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: User,
}

pub struct TokenAuthority {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    lockout: LockoutPolicy,
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec, lockout: LockoutPolicy) -> Self {
        Self {
            store,
            codec,
            lockout,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        let codec = TokenCodec::new(
            &config.auth.resolve_token_secret(),
            Duration::hours(config.auth.token_ttl_hours),
        );
        Self::new(store, codec, LockoutPolicy::from(&config.lockout))
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Check an email/password pair and mint a session token.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// A non-admin account with any password gets `Forbidden`.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let email = normalize_email(email);
        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                debug!(email = %email, "Login for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !user.is_admin() {
            warn!(user_id = %user.id, role = %user.role, "Login refused: not an admin");
            return Err(AuthError::Forbidden);
        }

        let now = Utc::now();
        if self.lockout.is_enabled() {
            if let Some(until) = user.locked_until(now) {
                warn!(user_id = %user.id, until = %until, "Login refused: account locked");
                return Err(AuthError::Locked { until });
            }
        }

        if !password::verify_password_async(password, &user.password_hash).await? {
            if self.lockout.is_enabled() {
                let lock_until = now
                    .checked_add_signed(self.lockout.lock_duration)
                    .ok_or_else(|| AuthError::Internal("lock expiry out of range".to_string()))?;
                let locked = self
                    .store
                    .record_failed_login(&user.id, self.lockout.max_failed_attempts, lock_until)
                    .await?;
                if let Some(until) = locked {
                    warn!(user_id = %user.id, until = %until, "Account locked after repeated failures");
                }
            }
            info!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if user.login_attempts != 0 || user.lock_until.is_some() {
            self.store.clear_failed_logins(&user.id).await?;
        }

        let token = self.codec.issue(&user.id, user.token_version)?;
        info!(user_id = %user.id, token_version = user.token_version, "Admin logged in");

        Ok(IssuedSession { token, user })
    }

    /// Resolve a session token to its admin record without mutating anything.
    pub async fn verify(&self, token: Option<&str>) -> Result<User, AuthError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::Unauthenticated),
        };

        // Signature and expiry are checked before the store is read
        let claims = self.codec.decode(token)?;

        let user = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if claims.ver != user.token_version {
            return Err(AuthError::SessionInvalidated);
        }

        if !user.is_admin() {
            return Err(AuthError::Forbidden);
        }

        Ok(user)
    }

    /// Replace the password and revoke every token issued under the old one.
    /// Returns the new token version.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<i64, AuthError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AuthError::Validation(
                "Current password and new password are required".to_string(),
            ));
        }
        validation::validate_new_password(new_password).map_err(AuthError::Validation)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if !password::verify_password_async(current_password, &user.password_hash).await? {
            info!(user_id = %user.id, "Password change refused: current password incorrect");
            return Err(AuthError::InvalidCredentials);
        }

        let hash = password::hash_password_async(new_password).await?;
        let version = self.store.update_password(&user.id, &hash).await?;

        info!(
            user_id = %user.id,
            token_version = version,
            "Password changed; all earlier sessions revoked"
        );
        Ok(version)
    }

    /// Create a credential record from a plaintext password.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<User, AuthError> {
        validation::validate_email(email).map_err(AuthError::Validation)?;
        validation::validate_new_password(password).map_err(AuthError::Validation)?;

        let password_hash = password::hash_password_async(password).await?;
        let user = self
            .store
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                role,
                first_name,
                last_name,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => {
                    AuthError::Validation("An account with this email already exists".to_string())
                }
                other => AuthError::Store(other),
            })?;

        info!(user_id = %user.id, email = %user.email, role = %user.role, "Created user");
        Ok(user)
    }

    /// Create the configured bootstrap administrator if it does not exist yet.
    /// Returns true when a record was created.
    pub async fn ensure_admin_user(
        &self,
        email: &str,
        password: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<bool, AuthError> {
        if self.store.find_by_email(email).await?.is_some() {
            debug!(email = %email, "Bootstrap admin already exists");
            return Ok(false);
        }

        self.create_user(email, password, Role::Admin, first_name, last_name)
            .await?;
        Ok(true)
    }
}
