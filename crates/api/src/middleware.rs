//! Application state and authentication middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, header},
    middleware::Next,
    response::Response,
};
use sea_orm::DatabaseConnection;
use volunteer_common::{AppError, AppResult, Config};
use volunteer_core::{
    ApprovalService, AttendanceService, AuthService, EventPublisherService, EventService,
    NotificationService, PushNotificationService, RegistrationService, SocialService,
    UserService,
};
use volunteer_db::repositories::{
    ApprovalRequestRepository, AttendanceRepository, ChannelRepository, CommentRepository,
    EventRepository, NotificationRepository, PostRepository, PushSubscriptionRepository,
    ReactionRepository, RegistrationRepository, UserRepository,
};

use crate::extractors::AuthRejection;
use crate::rate_limit::RateLimiterState;
use crate::sse::{SseBroadcaster, SseEventPublisher};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub event_service: EventService,
    pub registration_service: RegistrationService,
    pub attendance_service: AttendanceService,
    pub approval_service: ApprovalService,
    pub social_service: SocialService,
    pub notification_service: NotificationService,
    pub push_service: PushNotificationService,
    pub sse_broadcaster: SseBroadcaster,
    pub rate_limiter: RateLimiterState,
}

impl AppState {
    /// Wire repositories and services on top of a database connection.
    ///
    /// Push delivery is enabled when the configuration carries VAPID keys.
    pub fn new(db: Arc<DatabaseConnection>, config: &Config) -> AppResult<Self> {
        let push_service = PushNotificationService::new(
            PushSubscriptionRepository::new(db.clone()),
            config.push.as_ref(),
        )?;
        Ok(Self::with_push_service(db, config, push_service))
    }

    /// Like [`AppState::new`] with a caller-provided push service.
    pub fn with_push_service(
        db: Arc<DatabaseConnection>,
        config: &Config,
        push_service: PushNotificationService,
    ) -> Self {
        let user_repo = UserRepository::new(db.clone());
        let event_repo = EventRepository::new(db.clone());
        let registration_repo = RegistrationRepository::new(db.clone());
        let attendance_repo = AttendanceRepository::new(db.clone());
        let approval_repo = ApprovalRequestRepository::new(db.clone());
        let channel_repo = ChannelRepository::new(db.clone());
        let post_repo = PostRepository::new(db.clone());
        let comment_repo = CommentRepository::new(db.clone());
        let reaction_repo = ReactionRepository::new(db.clone());
        let notification_repo = NotificationRepository::new(db.clone());

        let sse_broadcaster = SseBroadcaster::new();
        let publisher: EventPublisherService =
            Arc::new(SseEventPublisher::new(sse_broadcaster.clone()));

        let mut notification_service = NotificationService::new(notification_repo);
        notification_service.set_event_publisher(publisher);
        if push_service.is_enabled() {
            notification_service.set_push_service(push_service.clone());
        }

        let auth_service = AuthService::new(
            db.clone(),
            user_repo.clone(),
            notification_service.clone(),
            &config.auth,
        );
        let user_service = UserService::new(
            db.clone(),
            user_repo.clone(),
            event_repo.clone(),
            registration_repo.clone(),
            attendance_repo.clone(),
            approval_repo.clone(),
            notification_service.clone(),
        );
        let event_service = EventService::new(
            db.clone(),
            event_repo.clone(),
            registration_repo.clone(),
            approval_repo.clone(),
            user_repo.clone(),
            notification_service.clone(),
        );
        let registration_service = RegistrationService::new(
            db.clone(),
            event_repo.clone(),
            registration_repo.clone(),
            attendance_repo.clone(),
            notification_service.clone(),
        );
        let attendance_service = AttendanceService::new(
            attendance_repo,
            registration_repo.clone(),
            event_repo.clone(),
            notification_service.clone(),
        );
        let approval_service = ApprovalService::new(
            db.clone(),
            approval_repo,
            user_repo.clone(),
            notification_service.clone(),
        );
        let social_service = SocialService::new(
            event_repo,
            registration_repo,
            channel_repo,
            post_repo,
            comment_repo,
            reaction_repo,
            user_repo,
            notification_service.clone(),
        );

        Self {
            db,
            auth_service,
            user_service,
            event_service,
            registration_service,
            attendance_service,
            approval_service,
            social_service,
            notification_service,
            push_service,
            sse_broadcaster,
            rate_limiter: RateLimiterState::new(),
        }
    }
}

/// Token from `Authorization: Bearer ...`, or from `?token=` on SSE
/// requests, which browsers cannot send headers with.
fn request_token(req: &Request<Body>) -> Option<String> {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    if req.method() == Method::GET && req.uri().path().ends_with("/stream") {
        return req.uri().query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "token")
                .map(|(_, value)| value.to_string())
        });
    }

    None
}

/// Authentication middleware.
///
/// Resolves the presented token to a fresh user row so that role and status
/// changes take effect on the next request. Handlers decide whether a user
/// is required.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = request_token(&req) {
        match state.auth_service.authenticate(&token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(AppError::Forbidden(message)) => {
                req.extensions_mut().insert(AuthRejection::Inactive(message));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rejected access token");
                req.extensions_mut().insert(AuthRejection::Invalid);
            }
        }
    }

    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        let req = request("/api/auth/me", Some("Bearer abc.def"));
        assert_eq!(request_token(&req).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_other_schemes_ignored() {
        let req = request("/api/auth/me", Some("Basic Zm9vOmJhcg=="));
        assert_eq!(request_token(&req), None);
    }

    #[test]
    fn test_query_token_only_for_streams() {
        let req = request("/api/notifications/stream?token=abc", None);
        assert_eq!(request_token(&req).as_deref(), Some("abc"));

        let req = request("/api/notifications?token=abc", None);
        assert_eq!(request_token(&req), None);
    }
}
