//! Rate limiting for the HTTP API.
//!
//! A fixed-window counter per client IP. Each window starts with the first
//! request of a client and lasts `window`; every request in it increments the
//! counter and requests past `max_requests` are answered with `429`.
//!
//! The counters live in a mutex-guarded map shared by every worker of the
//! process. Expired windows are dropped by [`RateLimiter::sweep`], which the
//! server runs periodically.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use log::{debug, warn};
use tokio::task::JoinHandle;

use super::error::ApiError;
use super::AppState;
use crate::config::RateLimitConfig;
use crate::constants::{HEADER_FORWARDED_FOR, HEADER_RATE_LIMIT, HEADER_RATE_REMAINING, HEADER_RATE_RESET, HEALTH_CHECK_PATH};
use crate::utils::datetime;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: i64,
    count: u32,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// End of the current window in epoch milliseconds
    pub reset_at: i64,
    /// Whole seconds until the window resets, at least 1
    pub retry_after_secs: u64,
}

impl RateStatus {
    /// Attach the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_RATE_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_RATE_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RATE_RESET, HeaderValue::from(self.reset_at.div_euclid(1000)));
    }
}

/// Fixed-window request counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    window_ms: i64,
    max_requests: u32,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    /// Count a request from `client` at `now` (epoch milliseconds).
    pub fn check(&self, client: IpAddr, now: i64) -> RateStatus {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(client).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now - window.started_at >= self.window_ms {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }
        window.count = window.count.saturating_add(1);

        let reset_at = window.started_at.saturating_add(self.window_ms);
        RateStatus {
            allowed: window.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.count),
            reset_at,
            retry_after_secs: u64::try_from(datetime::millis_to_secs_ceil(reset_at - now))
                .unwrap_or(0)
                .max(1),
        }
    }

    /// Drop windows that have expired at `now`. Returns how many were removed.
    pub fn sweep(&self, now: i64) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| now - window.started_at < self.window_ms);
        before - windows.len()
    }

    /// Number of clients with a live window.
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sweep expired windows every `interval`.
    pub fn spawn_cleanup(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.sweep(datetime::now_millis());
                if removed > 0 {
                    debug!("Rate limiter dropped {removed} expired windows");
                }
            }
        })
    }
}

/// Client address of a request: the first `X-Forwarded-For` hop when proxy
/// headers are trusted, otherwise the socket peer.
pub fn client_ip(request: &Request, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        let forwarded = request
            .headers()
            .get(HEADER_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware counting every request except the health check.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.limiter.clone() else {
        return next.run(request).await;
    };
    if request.uri().path() == HEALTH_CHECK_PATH {
        return next.run(request).await;
    }

    let client = client_ip(&request, state.config.server.trust_proxy_headers);
    let status = limiter.check(client, datetime::now_millis());
    let mut response = if status.allowed {
        next.run(request).await
    } else {
        warn!("Rate limit exceeded for {client} ({} requests per window)", status.limit);
        ApiError::RateLimited {
            retry_after_secs: status.retry_after_secs,
        }
        .into_response()
    };
    status.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.check(ip(1), 0).allowed);
        assert!(limiter.check(ip(1), 10).allowed);
        assert!(!limiter.check(ip(1), 20).allowed);
        let status = limiter.check(ip(1), 60_000);
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_at, 120_000);
    }

    #[test]
    fn test_clients_are_counted_separately() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check(ip(1), 0).allowed);
        assert!(limiter.check(ip(2), 0).allowed);
        assert!(!limiter.check(ip(1), 1).allowed);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        limiter.check(ip(1), 0);
        let status = limiter.check(ip(1), 59_500);
        assert!(!status.allowed);
        assert_eq!(status.retry_after_secs, 1);
    }

    #[test]
    fn test_sweep_drops_only_expired_windows() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5);
        limiter.check(ip(1), 0);
        limiter.check(ip(2), 30_000);
        assert_eq!(limiter.sweep(60_000), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let request = Request::builder()
            .uri("/sync")
            .header(HEADER_FORWARDED_FOR, "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, true), "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(&request, false), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
