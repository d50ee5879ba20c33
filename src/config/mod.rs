use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Session tokens carry a fixed absolute lifetime.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Longest account lock accepted from configuration (one year).
pub const MAX_LOCK_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Read the client address from X-Forwarded-For / X-Real-IP.
    /// Only enable this behind a reverse proxy that sets those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key used to sign session tokens
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (HTTPS deployments)
    #[serde(default)]
    pub cookie_secure: bool,
    /// Bootstrap administrator created on startup when missing
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_first_name: Option<String>,
    pub admin_last_name: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
            admin_email: None,
            admin_password: None,
            admin_first_name: None,
            admin_last_name: None,
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    TOKEN_TTL_HOURS
}

fn default_cookie_name() -> String {
    "adminToken".to_string()
}

impl AuthConfig {
    /// Returns the configured signing secret, or generates an ephemeral one.
    ///
    /// An ephemeral secret means every token is invalidated by a restart.
    pub fn resolve_token_secret(&self) -> String {
        match &self.token_secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                warn!("No auth.token_secret configured; generating an ephemeral secret. Sessions will not survive a restart.");
                let bytes: [u8; 32] = rand::random();
                hex::encode(bytes)
            }
        }
    }
}

/// Per-account lockout after repeated password failures.
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    /// Failed attempts before the account is locked (0 disables lockout)
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_lock_minutes")]
    pub lock_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            lock_minutes: default_lock_minutes(),
        }
    }
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lock_minutes() -> i64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Login requests allowed per client address per window
    #[serde(default = "default_login_requests_per_window")]
    pub login_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of stale windows
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            login_requests_per_window: default_login_requests_per_window(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_login_requests_per_window() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    15 * 60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API with credentials
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Returns every problem found in the configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.auth.token_ttl_hours != TOKEN_TTL_HOURS {
            problems.push(format!(
                "auth.token_ttl_hours must be {} (session expiry is fixed)",
                TOKEN_TTL_HOURS
            ));
        }
        if let Some(secret) = &self.auth.token_secret {
            if secret.len() < 32 {
                problems.push("auth.token_secret should be at least 32 characters".to_string());
            }
        }
        if self.auth.cookie_name.trim().is_empty() {
            problems.push("auth.cookie_name must not be empty".to_string());
        }
        match (&self.auth.admin_email, &self.auth.admin_password) {
            (Some(_), None) | (None, Some(_)) => problems.push(
                "auth.admin_email and auth.admin_password must be set together".to_string(),
            ),
            _ => {}
        }
        if self.lockout.max_failed_attempts > 0
            && !(1..=MAX_LOCK_MINUTES).contains(&self.lockout.lock_minutes)
        {
            problems.push(format!(
                "lockout.lock_minutes must be between 1 and {}",
                MAX_LOCK_MINUTES
            ));
        }
        if self
            .cors
            .allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
        {
            problems.push(
                "cors.allowed_origins cannot contain \"*\" because the session cookie requires credentialed CORS"
                    .to_string(),
            );
        }
        if self.rate_limit.enabled {
            if self.rate_limit.login_requests_per_window == 0 {
                problems.push("rate_limit.login_requests_per_window must be positive".to_string());
            }
            if self.rate_limit.window_seconds == 0 {
                problems.push("rate_limit.window_seconds must be positive".to_string());
            }
        }

        problems
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            lockout: LockoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
