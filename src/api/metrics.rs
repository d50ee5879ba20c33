//! Prometheus metrics endpoint and auth outcome counters.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

use crate::AppState;

pub const AUTH_LOGIN_TOTAL: &str = "auth_login_total";
pub const AUTH_VERIFY_TOTAL: &str = "auth_verify_total";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Call once during startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(AUTH_LOGIN_TOTAL, "Login attempts by outcome");
    describe_counter!(AUTH_VERIFY_TOTAL, "Session token verifications by outcome");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

pub fn record_login(outcome: &'static str) {
    counter!(AUTH_LOGIN_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_verify(outcome: &'static str) {
    counter!(AUTH_VERIFY_TOTAL, "outcome" => outcome).increment(1);
}
