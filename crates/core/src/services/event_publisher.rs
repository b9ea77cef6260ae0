//! Event publisher service.
//!
//! Provides an abstraction for pushing real-time updates to connected
//! clients. The API crate implements it on top of a broadcast channel that
//! feeds the server-sent event stream.

use async_trait::async_trait;
use std::sync::Arc;
use volunteer_common::AppResult;
use volunteer_db::entities::notification;

/// Event types for real-time updates.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A notification was stored for a user.
    Notification {
        user_id: String,
        notification: notification::Model,
    },
    /// The unread count of a user changed without a new notification.
    UnreadCount { user_id: String, count: u64 },
}

impl StreamEvent {
    /// The user the event is addressed to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Notification { user_id, .. } | Self::UnreadCount { user_id, .. } => user_id,
        }
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without depending on the transport that delivers them.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a stream event.
    async fn publish(&self, event: StreamEvent) -> AppResult<()>;

    /// Publish a freshly stored notification.
    async fn publish_notification(&self, notification: &notification::Model) -> AppResult<()> {
        self.publish(StreamEvent::Notification {
            user_id: notification.user_id.clone(),
            notification: notification.clone(),
        })
        .await
    }

    /// Publish a new unread count.
    async fn publish_unread_count(&self, user_id: &str, count: u64) -> AppResult<()> {
        self.publish(StreamEvent::UnreadCount {
            user_id: user_id.to_string(),
            count,
        })
        .await
    }
}

/// Type alias for a shared event publisher.
pub type EventPublisherService = Arc<dyn EventPublisher>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use volunteer_db::entities::notification::NotificationKind;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StreamEvent>>);

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, event: StreamEvent) -> AppResult<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_methods_address_the_recipient() {
        let recorder = Recorder::default();
        let n = notification::Model {
            id: "n1".to_string(),
            user_id: "u1".to_string(),
            actor_id: None,
            kind: NotificationKind::CheckedIn,
            title: "Checked in".to_string(),
            message: "Welcome".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: None,
            is_read: false,
            created_at: Utc::now().into(),
        };

        recorder.publish_notification(&n).await.unwrap();
        recorder.publish_unread_count("u2", 3).await.unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user_id(), "u1");
        assert!(matches!(events[1], StreamEvent::UnreadCount { count: 3, .. }));
    }
}
