//! API rate limiting middleware.
//!
//! Fixed-window, in-memory limits keyed by user ID for signed-in requests
//! and by client IP otherwise. Sign-in and sign-up get a stricter budget.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;
use volunteer_db::entities::user;

/// Rate limit configuration for different endpoint types.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Time window duration in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Default rate limits for different endpoint categories.
pub mod limits {
    use super::RateLimitConfig;

    /// Everything not listed below.
    pub const STANDARD: RateLimitConfig = RateLimitConfig::new(300, 60);

    /// Login and registration, per client IP.
    pub const AUTH: RateLimitConfig = RateLimitConfig::new(10, 300);
}

/// Longest window in use; entries older than twice this are dropped.
pub const MAX_WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }
}

/// Fixed-window request counter.
#[derive(Clone, Default)]
pub struct ApiRateLimiter {
    states: Arc<RwLock<HashMap<String, WindowState>>>,
}

impl ApiRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a request is allowed and record it.
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let mut states = self.states.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(config.window_secs);

        let state = states.entry(key.to_string()).or_insert_with(WindowState::new);

        if now.duration_since(state.window_start) >= window {
            state.count = 0;
            state.window_start = now;
        }

        let reset = window
            .saturating_sub(now.duration_since(state.window_start))
            .as_secs();

        if state.count >= config.max_requests {
            return RateLimitResult::Limited {
                retry_after: reset.max(1),
            };
        }

        state.count += 1;
        RateLimitResult::Allowed {
            remaining: config.max_requests.saturating_sub(state.count),
            limit: config.max_requests,
            reset,
        }
    }

    /// Drop entries whose window ended long ago.
    pub async fn cleanup(&self, max_window_secs: u64) {
        let mut states = self.states.write().await;
        let now = Instant::now();
        let max_age = Duration::from_secs(max_window_secs * 2);

        states.retain(|_, state| now.duration_since(state.window_start) < max_age);
    }

    /// Number of tracked keys.
    pub async fn key_count(&self) -> usize {
        self.states.read().await.len()
    }
}

/// Rate limit check result.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    Allowed {
        remaining: u32,
        limit: u32,
        /// Seconds until the window resets.
        reset: u64,
    },
    Limited {
        /// Seconds until a request will be accepted again.
        retry_after: u64,
    },
}

/// Limiters shared by the middleware.
#[derive(Clone, Default)]
pub struct RateLimiterState {
    /// Signed-in callers.
    pub user_limiter: ApiRateLimiter,
    /// Anonymous callers.
    pub ip_limiter: ApiRateLimiter,
    /// Credential endpoints.
    pub auth_limiter: ApiRateLimiter,
}

impl RateLimiterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop stale entries from every limiter.
    pub async fn cleanup(&self) {
        self.user_limiter.cleanup(MAX_WINDOW_SECS).await;
        self.ip_limiter.cleanup(MAX_WINDOW_SECS).await;
        self.auth_limiter.cleanup(MAX_WINDOW_SECS).await;
    }
}

/// 429 response.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "RATE_LIMITED",
                "message": "Too many requests",
                "retryAfter": self.retry_after
            }
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", self.retry_after.to_string()),
                ("Content-Type", "application/json".to_string()),
            ],
            body.to_string(),
        )
            .into_response()
    }
}

/// Client IP from the usual proxy headers.
fn extract_client_ip(req: &Request<Body>) -> Option<IpAddr> {
    if let Some(xff) = req.headers().get("x-forwarded-for")
        && let Ok(xff_str) = xff.to_str()
        && let Some(first_ip) = xff_str.split(',').next()
        && let Ok(ip) = first_ip.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn is_credential_endpoint(req: &Request<Body>) -> bool {
    req.method() == Method::POST
        && matches!(req.uri().path(), "/api/auth/login" | "/api/auth/register")
}

/// Rate limiting middleware. Runs after authentication so signed-in
/// callers are counted per user.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    let ip_key = extract_client_ip(&req)
        .map_or_else(|| "ip:unknown".to_string(), |ip| format!("ip:{ip}"));

    let result = if is_credential_endpoint(&req) {
        limiter.auth_limiter.check(&ip_key, &limits::AUTH).await
    } else if let Some(user) = req.extensions().get::<user::Model>() {
        let key = format!("user:{}", user.id);
        limiter.user_limiter.check(&key, &limits::STANDARD).await
    } else {
        limiter.ip_limiter.check(&ip_key, &limits::STANDARD).await
    };

    match result {
        RateLimitResult::Allowed {
            remaining,
            limit,
            reset,
        } => {
            let mut response = next.run(req).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit.into());
            headers.insert("X-RateLimit-Remaining", remaining.into());
            headers.insert("X-RateLimit-Reset", reset.into());

            Ok(response)
        }
        RateLimitResult::Limited { retry_after } => {
            tracing::debug!(key = %ip_key, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}
