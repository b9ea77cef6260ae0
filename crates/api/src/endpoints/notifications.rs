//! Notifications endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use volunteer_common::AppResult;
use volunteer_db::entities::notification::{self, NotificationKind};

use crate::{
    extractors::{AuthUser, DEFAULT_LIMIT, MAX_LIMIT},
    middleware::AppState,
    response::{ApiResponse, no_content},
    sse::notification_stream,
};

/// List notifications request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    /// Maximum results (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Cursor for pagination (before this ID)
    pub until_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

const fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<notification::Model> for NotificationResponse {
    fn from(n: notification::Model) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            title: n.title,
            message: n.message,
            actor_id: n.actor_id,
            event_id: n.event_id,
            approval_request_id: n.approval_request_id,
            link: n.link,
            is_read: n.is_read,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<ApiResponse<Vec<NotificationResponse>>> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let notifications = state
        .notification_service
        .list(&user.id, limit, query.until_id.as_deref(), query.unread_only)
        .await?;

    Ok(ApiResponse::ok(
        notifications.into_iter().map(Into::into).collect(),
    ))
}

async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<UnreadCountResponse>> {
    let unread_count = state.notification_service.unread_count(&user.id).await?;
    Ok(ApiResponse::ok(UnreadCountResponse { unread_count }))
}

async fn mark_all_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<MarkAllReadResponse>> {
    let updated = state.notification_service.mark_all_read(&user.id).await?;
    Ok(ApiResponse::ok(MarkAllReadResponse { updated }))
}

async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.mark_read(&user.id, &id).await?;
    Ok(no_content())
}

async fn delete_notification(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.delete(&user.id, &id).await?;
    Ok(no_content())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/stream", get(notification_stream))
        .route("/{id}/read", post(mark_read))
        .route("/{id}", axum::routing::delete(delete_notification))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_response_uses_type_key() {
        let model = notification::Model {
            id: "n1".to_string(),
            user_id: "u1".to_string(),
            actor_id: None,
            kind: NotificationKind::WaitlistPromoted,
            title: "You're in".to_string(),
            message: "A seat opened up".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: None,
            is_read: false,
            created_at: Utc::now().into(),
        };

        let json = serde_json::to_value(NotificationResponse::from(model)).unwrap();
        assert_eq!(json["type"], "waitlist_promoted");
        assert_eq!(json["eventId"], "e1");
        assert!(json.get("actorId").is_none());
        assert!(json.get("link").is_none());
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListNotificationsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert!(!query.unread_only);
        assert!(query.until_id.is_none());
    }
}
