//! Credential store: the persistence seam used by the token authority.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{NewUser, User};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential record not found")]
    NotFound,
    #[error("a credential record with this email already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Reads and writes credential records.
///
/// Every mutating method is a single statement, so concurrent updates to the
/// same record serialize through the database.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Replaces the password hash and bumps `token_version` by one.
    /// Returns the new token version.
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<i64, StoreError>;

    /// Counts a failed password attempt. Once `max_attempts` is reached the
    /// counter resets and the account is locked until `lock_until`.
    /// Returns the lock expiry if this attempt locked the account.
    async fn record_failed_login(
        &self,
        id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn clear_failed_logins(&self, id: &str) -> Result<(), StoreError>;

    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

/// Normalizes an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<i64, StoreError> {
        let version: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET password_hash = ?, token_version = token_version + 1, updated_at = ?
            WHERE id = ?
            RETURNING token_version
            "#,
        )
        .bind(password_hash)
        .bind(now_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        version.map(|(v,)| v).ok_or(StoreError::NotFound)
    }

    async fn record_failed_login(
        &self,
        id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let max_attempts = i64::from(max_attempts);

        // SET expressions all see the pre-update row
        let row: Option<(Option<String>, i64)> = sqlx::query_as(
            r#"
            UPDATE users
            SET login_attempts = CASE WHEN login_attempts + 1 >= ? THEN 0 ELSE login_attempts + 1 END,
                lock_until = CASE WHEN login_attempts + 1 >= ? THEN ? ELSE lock_until END,
                updated_at = ?
            WHERE id = ?
            RETURNING lock_until, login_attempts
            "#,
        )
        .bind(max_attempts)
        .bind(max_attempts)
        .bind(lock_until.to_rfc3339())
        .bind(now_rfc3339())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        // The counter only returns to zero when this attempt tripped the lock
        let (stored_lock, attempts) = row.ok_or(StoreError::NotFound)?;
        if attempts != 0 {
            return Ok(None);
        }
        Ok(stored_lock
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    async fn clear_failed_logins(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET login_attempts = 0, lock_until = NULL WHERE id = ? AND (login_attempts != 0 OR lock_until IS NOT NULL)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, first_name, last_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                return Err(StoreError::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        self.find_by_id(&id).await?.ok_or(StoreError::NotFound)
    }
}
