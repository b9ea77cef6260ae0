//! Notification service.

use std::collections::HashSet;

use crate::services::event_publisher::EventPublisherService;
use crate::services::push_notification::PushNotificationService;
use sea_orm::Set;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::notification::{self, NotificationKind},
    repositories::NotificationRepository,
};

/// Content of a notification, independent of its recipient.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// The user who caused it
    pub actor_id: Option<String>,
    pub event_id: Option<String>,
    pub approval_request_id: Option<String>,
    /// Client-side route to open
    pub link: Option<String>,
}

impl NewNotification {
    /// Start a notification of the given kind.
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            actor_id: None,
            event_id: None,
            approval_request_id: None,
            link: None,
        }
    }

    /// Set the acting user.
    #[must_use]
    pub fn actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    /// Attach an event and link to its page.
    #[must_use]
    pub fn event(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        if self.link.is_none() {
            self.link = Some(format!("/events/{event_id}"));
        }
        self
    }

    /// Attach an approval request.
    #[must_use]
    pub fn approval_request(mut self, request_id: &str) -> Self {
        self.approval_request_id = Some(request_id.to_string());
        self
    }

    /// Override the link.
    #[must_use]
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    event_publisher: Option<EventPublisherService>,
    push_service: Option<PushNotificationService>,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self {
            notification_repo,
            event_publisher: None,
            push_service: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Set the push service.
    pub fn set_push_service(&mut self, push_service: PushNotificationService) {
        self.push_service = Some(push_service);
    }

    /// Store a notification and fan it out to live streams and push.
    pub async fn create(
        &self,
        user_id: &str,
        input: &NewNotification,
    ) -> AppResult<notification::Model> {
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            actor_id: Set(input.actor_id.clone()),
            kind: Set(input.kind),
            title: Set(input.title.clone()),
            message: Set(input.message.clone()),
            event_id: Set(input.event_id.clone()),
            approval_request_id: Set(input.approval_request_id.clone()),
            link: Set(input.link.clone()),
            is_read: Set(false),
            created_at: Set(chrono::Utc::now().into()),
        };

        let notification = self.notification_repo.create(model).await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher.publish_notification(&notification).await {
                tracing::warn!(error = %e, "Failed to publish notification event");
            }
        }

        if let Some(ref push_service) = self.push_service {
            if push_service.is_enabled() {
                let push_service = push_service.clone();
                let stored = notification.clone();
                tokio::spawn(async move {
                    if let Err(e) = push_service.send_notification(&stored).await {
                        tracing::warn!(error = %e, notification_id = %stored.id, "Push delivery failed");
                    }
                });
            }
        }

        Ok(notification)
    }

    /// Notify one user. Failures are logged, never returned: a notification
    /// must not undo the action that caused it.
    pub async fn notify(&self, user_id: &str, input: &NewNotification) {
        if let Err(e) = self.create(user_id, input).await {
            tracing::warn!(error = %e, user_id = %user_id, kind = ?input.kind, "Failed to create notification");
        }
    }

    /// Notify several users once each, skipping the actor.
    pub async fn notify_many(&self, user_ids: &[String], input: &NewNotification) {
        let mut seen = HashSet::new();
        for user_id in user_ids {
            if input.actor_id.as_deref() == Some(user_id.as_str()) || !seen.insert(user_id) {
                continue;
            }
            self.notify(user_id, input).await;
        }
    }

    /// List a user's notifications, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        self.notification_repo
            .find_by_user(user_id, limit, until_id, unread_only)
            .await
    }

    /// Count a user's unread notifications.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Mark one notification as read.
    pub async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<()> {
        if !self.notification_repo.mark_as_read(id, user_id).await? {
            return Err(AppError::NotFound(format!("Notification not found: {id}")));
        }
        self.publish_unread_count(user_id).await;
        Ok(())
    }

    /// Mark every notification of a user as read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        let updated = self.notification_repo.mark_all_as_read(user_id).await?;
        if updated > 0 {
            self.publish_unread_count(user_id).await;
        }
        Ok(updated)
    }

    /// Delete one notification.
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        if !self.notification_repo.delete(id, user_id).await? {
            return Err(AppError::NotFound(format!("Notification not found: {id}")));
        }
        self.publish_unread_count(user_id).await;
        Ok(())
    }

    async fn publish_unread_count(&self, user_id: &str) {
        let Some(ref event_publisher) = self.event_publisher else {
            return;
        };
        match self.notification_repo.count_unread(user_id).await {
            Ok(count) => {
                if let Err(e) = event_publisher.publish_unread_count(user_id, count).await {
                    tracing::warn!(error = %e, "Failed to publish unread count");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to count unread notifications"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::{EventPublisher, StreamEvent};
    use async_trait::async_trait;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StreamEvent>>);

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, event: StreamEvent) -> AppResult<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn stored(id: &str, user_id: &str) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            actor_id: Some("admin".to_string()),
            kind: NotificationKind::EventApproved,
            title: "Event approved".to_string(),
            message: "Beach cleanup is live".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: Some("/events/e1".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_builder_links_event() {
        let n = NewNotification::new(NotificationKind::EventUpdated, "Updated", "Time changed")
            .actor("m1")
            .event("e9");
        assert_eq!(n.link.as_deref(), Some("/events/e9"));
        assert_eq!(n.actor_id.as_deref(), Some("m1"));

        let n = NewNotification::new(NotificationKind::NewPost, "New post", "Hi")
            .link("/channels/c1")
            .event("e9");
        assert_eq!(n.link.as_deref(), Some("/channels/c1"));
    }

    #[tokio::test]
    async fn test_create_publishes_to_stream() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[stored("n1", "u1")]])
            .into_connection();
        let recorder = Arc::new(Recorder::default());
        let mut service = NotificationService::new(NotificationRepository::new(Arc::new(db)));
        service.set_event_publisher(recorder.clone());

        let input = NewNotification::new(
            NotificationKind::EventApproved,
            "Event approved",
            "Beach cleanup is live",
        )
        .event("e1");
        let created = service.create("u1", &input).await.unwrap();

        assert_eq!(created.id, "n1");
        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id(), "u1");
    }

    #[tokio::test]
    async fn test_notify_swallows_failures() {
        // No query results: the insert fails inside the mock.
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = NotificationService::new(NotificationRepository::new(Arc::new(db)));

        let input = NewNotification::new(NotificationKind::NewPost, "New post", "Hello");
        service.notify("u1", &input).await;
    }

    #[tokio::test]
    async fn test_notify_many_skips_actor_and_duplicates() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[stored("n1", "u1")], [stored("n2", "u2")]])
            .into_connection();
        let recorder = Arc::new(Recorder::default());
        let mut service = NotificationService::new(NotificationRepository::new(Arc::new(db)));
        service.set_event_publisher(recorder.clone());

        let input = NewNotification::new(NotificationKind::EventCancelled, "Cancelled", "Storm")
            .actor("admin");
        let recipients = vec![
            "u1".to_string(),
            "admin".to_string(),
            "u2".to_string(),
            "u1".to_string(),
        ];
        service.notify_many(&recipients, &input).await;

        assert_eq!(recorder.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_missing_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let service = NotificationService::new(NotificationRepository::new(Arc::new(db)));

        let result = service.mark_read("u1", "missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
