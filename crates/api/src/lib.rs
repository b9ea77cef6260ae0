//! HTTP API layer for Volunteer Hub.
//!
//! - **Endpoints**: JSON REST API under `/api`
//! - **Extractors**: authentication, role guards, pagination
//! - **Middleware**: token resolution and rate limiting
//! - **SSE**: per-user notification stream
//!
//! Built on Axum 0.8. Transport-level layers (CORS, tracing, compression)
//! are applied by the server binary.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod sse;

use axum::Router;

pub use endpoints::router;
pub use middleware::AppState;
pub use rate_limit::{ApiRateLimiter, RateLimitConfig, RateLimiterState};
pub use sse::{SseBroadcaster, SseEvent, SseEventPublisher};

/// Build the complete application router with authentication and rate
/// limiting applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", endpoints::router())
        .merge(endpoints::health_router())
        // Layers run bottom-up: auth resolves the user before rate limiting.
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
