//! Server-Sent Events (SSE) for real-time notifications.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use volunteer_common::AppResult;
use volunteer_core::{EventPublisher, StreamEvent};

use crate::endpoints::notifications::NotificationResponse;
use crate::{extractors::AuthUser, middleware::AppState};

/// Interval between keep-alive comments.
const KEEP_ALIVE_SECS: u64 = 30;

/// Per-user channel capacity; slow readers lose the oldest events.
const USER_CHANNEL_CAPACITY: usize = 100;

/// SSE event types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SseEvent {
    /// Stream established.
    Connected,
    /// New notification.
    Notification { notification: NotificationResponse },
    /// Unread counter changed.
    #[serde(rename_all = "camelCase")]
    UnreadCount { unread_count: u64 },
}

impl From<StreamEvent> for SseEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Notification { notification, .. } => Self::Notification {
                notification: notification.into(),
            },
            StreamEvent::UnreadCount { count, .. } => Self::UnreadCount {
                unread_count: count,
            },
        }
    }
}

/// Per-user broadcast channels feeding the notification streams.
#[derive(Clone, Default)]
pub struct SseBroadcaster {
    user_channels: Arc<RwLock<HashMap<String, broadcast::Sender<SseEvent>>>>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a user's channel, creating it if needed.
    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<SseEvent> {
        let mut channels = self.user_channels.write().await;
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(USER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send an event to every open stream of a user.
    ///
    /// Returns the number of streams that received it.
    pub async fn broadcast_to_user(&self, user_id: &str, event: SseEvent) -> usize {
        let channels = self.user_channels.read().await;
        channels
            .get(user_id)
            .and_then(|sender| sender.send(event).ok())
            .unwrap_or(0)
    }

    /// Drop channels without listeners.
    pub async fn cleanup(&self) {
        let mut channels = self.user_channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of users with a channel.
    pub async fn channel_count(&self) -> usize {
        self.user_channels.read().await.len()
    }
}

/// [`EventPublisher`] that forwards notification events to SSE streams.
#[derive(Clone)]
pub struct SseEventPublisher {
    broadcaster: SseBroadcaster,
}

impl SseEventPublisher {
    #[must_use]
    pub const fn new(broadcaster: SseBroadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl EventPublisher for SseEventPublisher {
    async fn publish(&self, event: StreamEvent) -> AppResult<()> {
        let user_id = event.user_id().to_string();
        let delivered = self
            .broadcaster
            .broadcast_to_user(&user_id, event.into())
            .await;
        tracing::trace!(user_id = %user_id, delivered, "Published stream event");
        Ok(())
    }
}

fn to_event(event: &SseEvent) -> Event {
    let name = match event {
        SseEvent::Connected => "connected",
        SseEvent::Notification { .. } => "notification",
        SseEvent::UnreadCount { .. } => "unreadCount",
    };
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("error"))
}

/// The caller's notification stream.
pub async fn notification_stream(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_broadcaster.subscribe(&user.id).await;
    tracing::debug!(user_id = %user.id, "Notification stream opened");

    // lagged receivers skip what they missed
    let updates = BroadcastStream::new(rx)
        .filter_map(|result| result.ok().map(|event| Ok(to_event(&event))));

    let initial = stream::once(async { Ok(to_event(&SseEvent::Connected)) });

    Sse::new(initial.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("ping"),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use volunteer_db::entities::notification::{self, NotificationKind};

    fn notification(user_id: &str) -> notification::Model {
        notification::Model {
            id: "n1".to_string(),
            user_id: user_id.to_string(),
            actor_id: None,
            kind: NotificationKind::NewPost,
            title: "New post".to_string(),
            message: "Someone posted".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: Some("/events/e1".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_publisher_reaches_subscriber() {
        let broadcaster = SseBroadcaster::new();
        let mut rx = broadcaster.subscribe("u1").await;
        let publisher = SseEventPublisher::new(broadcaster);

        publisher
            .publish_notification(&notification("u1"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SseEvent::Notification { ref notification } if notification.id == "n1"));
    }

    #[tokio::test]
    async fn test_events_stay_with_their_user() {
        let broadcaster = SseBroadcaster::new();
        let mut rx = broadcaster.subscribe("u2").await;

        let delivered = broadcaster
            .broadcast_to_user("u1", SseEvent::UnreadCount { unread_count: 3 })
            .await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cleanup_drops_closed_channels() {
        let broadcaster = SseBroadcaster::new();
        let rx = broadcaster.subscribe("u1").await;
        assert_eq!(broadcaster.channel_count().await, 1);

        drop(rx);
        broadcaster.cleanup().await;
        assert_eq!(broadcaster.channel_count().await, 0);
    }

    #[test]
    fn test_unread_count_serialization() {
        let json = serde_json::to_value(SseEvent::UnreadCount { unread_count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "unreadCount", "unreadCount": 2 }));
    }
}
