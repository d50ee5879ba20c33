pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::TokenAuthority;
use crate::db::{CredentialStore, SqliteCredentialStore};

pub struct AppState {
    pub config: Config,
    pub authority: Arc<TokenAuthority>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(db));
        let authority = Arc::new(TokenAuthority::from_config(&config, store));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            authority,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
