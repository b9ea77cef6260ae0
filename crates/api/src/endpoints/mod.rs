//! API endpoints.

pub(crate) mod approvals;
pub(crate) mod attendance;
pub(crate) mod auth;
pub(crate) mod events;
pub(crate) mod health;
pub(crate) mod notifications;
pub(crate) mod push;
pub(crate) mod registrations;
pub(crate) mod social;
pub(crate) mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router (mounted under `/api`).
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .merge(events::router())
        .merge(registrations::router())
        .merge(attendance::router())
        .nest("/approvals", approvals::router())
        .merge(social::router())
        .nest("/notifications", notifications::router())
        .nest("/push", push::router())
}

/// Liveness route, mounted at the root.
pub fn health_router() -> Router<AppState> {
    health::router()
}
