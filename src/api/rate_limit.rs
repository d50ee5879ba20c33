//! Login rate limiting with a fixed window per client address.
//!
//! Every login request counts, successful or not. Once an address has used up
//! its window, further requests are refused until the window ends.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

/// Counter for one client address
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Requests seen in the current window
    count: u32,
    /// Start of the current window
    window_start: Instant,
}

/// Thread-safe rate limiter using dashmap
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<IpAddr, RateLimitEntry>,
    config: RateLimitConfig,
    window_duration: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window_duration: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    /// Count a request from `ip`.
    /// Returns Ok(info) if allowed, Err(retry_after_seconds) if rate limited.
    pub fn check_rate_limit(&self, ip: IpAddr) -> Result<RateLimitInfo, u64> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<RateLimitInfo, u64> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_after: 0,
            });
        }

        let limit = self.config.login_requests_per_window;
        let mut entry = self.entries.entry(ip).or_insert_with(|| RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        let elapsed = now.duration_since(entry.window_start);
        let reset_after = self.window_duration.saturating_sub(elapsed).as_secs().max(1);

        if entry.count >= limit {
            return Err(reset_after);
        }

        entry.count += 1;
        Ok(RateLimitInfo {
            remaining: limit - entry.count,
            limit,
            reset_after,
        })
    }

    /// Drop windows that have ended
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let window = self.window_duration;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window);
    }

    /// Get the number of tracked addresses (for monitoring)
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn limit(&self) -> u32 {
        self.config.login_requests_per_window
    }
}

/// Information about rate limit status
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Maximum requests per window
    pub limit: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

/// Resolve the client address for a request.
///
/// Forwarding headers are only honoured when `trust_proxy_headers` is set.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        // Take the first IP in the list (original client)
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn header_value(value: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Rate limiting middleware for the login endpoint
pub async fn rate_limit_login(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(
        request.headers(),
        peer,
        state.config.server.trust_proxy_headers,
    );

    match state.rate_limiter.check_rate_limit(ip) {
        Ok(info) => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", header_value(info.limit));
            headers.insert("X-RateLimit-Remaining", header_value(info.remaining));
            headers.insert("X-RateLimit-Reset", header_value(info.reset_after));

            response
        }
        Err(retry_after) => {
            tracing::warn!(ip = %ip, retry_after, "Login rate limit exceeded");
            super::metrics::record_login("rate_limited");

            let mut response = ApiError::rate_limited(
                "Too many login attempts from this address. Please try again later.",
            )
            .into_response();

            let headers = response.headers_mut();
            headers.insert("Retry-After", header_value(retry_after));
            headers.insert("X-RateLimit-Limit", header_value(state.rate_limiter.limit()));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            headers.insert("X-RateLimit-Reset", header_value(retry_after));

            response
        }
    }
}

/// Spawn a background task to periodically clean up expired rate limit entries
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Rate limiter cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}
