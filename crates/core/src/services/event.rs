//! Event service.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde::Deserialize;
use validator::Validate;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        approval_request::{self, ApprovalPayload},
        event::{self, EventStatus},
        notification::NotificationKind,
        registration::{self, RegistrationStatus},
        user::{self, Role},
    },
    repositories::{
        ApprovalRequestRepository, ChannelRepository, EventFilter, EventRepository,
        RegistrationRepository, UserRepository,
    },
};

use crate::services::approval::{new_request, notify_admins};
use crate::services::notification::{NewNotification, NotificationService};
use crate::services::social::new_channel;

const MAX_TAGS: usize = 5;
const MAX_TAG_LEN: usize = 30;

/// Input for creating an event.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventInput {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[validate(length(min = 1, max = 300))]
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 1, max = 10000))]
    pub max_participants: i32,
    pub tags: Vec<String>,
    #[validate(url, length(max = 2048))]
    pub image_url: Option<String>,
}

/// Input for updating an event. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventInput {
    #[validate(length(min = 3, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 300))]
    pub location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 10000))]
    pub max_participants: Option<i32>,
    pub tags: Option<Vec<String>>,
    /// An empty string clears the image.
    pub image_url: Option<String>,
}

/// Input for asking an admin to cancel an event.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancellationInput {
    #[validate(length(min = 5, max = 1000))]
    pub reason: String,
}

/// Query parameters for the event list.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub status: Option<EventStatus>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub upcoming_only: bool,
}

/// A registration with its user.
#[derive(Debug, Clone)]
pub struct Participant {
    pub registration: registration::Model,
    pub user: Option<user::Model>,
}

/// Whether a user may manage an event (edit it, scan tickets, see its
/// participants).
#[must_use]
pub fn can_manage(actor: &user::Model, event: &event::Model) -> bool {
    actor.is_admin() || event.created_by == actor.id
}

/// Lowercase, trim and deduplicate tags, keeping their order.
pub fn normalize_tags(tags: &[String]) -> AppResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_LEN {
            return Err(AppError::Validation(format!(
                "Tags must be 1-{MAX_TAG_LEN} characters"
            )));
        }
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }

    if normalized.is_empty() || normalized.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "An event needs 1-{MAX_TAGS} tags"
        )));
    }
    Ok(normalized)
}

fn check_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if start >= end {
        return Err(AppError::Validation(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

/// Event service.
#[derive(Clone)]
pub struct EventService {
    db: Arc<DatabaseConnection>,
    event_repo: EventRepository,
    registration_repo: RegistrationRepository,
    approval_repo: ApprovalRequestRepository,
    user_repo: UserRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl EventService {
    /// Create a new event service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        event_repo: EventRepository,
        registration_repo: RegistrationRepository,
        approval_repo: ApprovalRequestRepository,
        user_repo: UserRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            db,
            event_repo,
            registration_repo,
            approval_repo,
            user_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an event.
    ///
    /// A manager's event waits for an admin behind an `event_approval`
    /// request; an admin's event is published right away with its channel.
    pub async fn create(
        &self,
        actor: &user::Model,
        input: CreateEventInput,
    ) -> AppResult<event::Model> {
        input.validate()?;
        if !actor.role.is_staff() {
            return Err(AppError::Forbidden(
                "Only managers and admins can create events".to_string(),
            ));
        }

        let tags = normalize_tags(&input.tags)?;
        check_dates(input.start_date, input.end_date)?;
        if input.start_date <= Utc::now() {
            return Err(AppError::Validation(
                "Event must start in the future".to_string(),
            ));
        }

        let event_id = self.id_gen.generate();
        let publish_now = actor.role == Role::Admin;
        let side_id = self.id_gen.generate();

        let model = event::ActiveModel {
            id: Set(event_id.clone()),
            title: Set(input.title.trim().to_string()),
            description: Set(input.description.trim().to_string()),
            location: Set(input.location.trim().to_string()),
            start_date: Set(input.start_date.into()),
            end_date: Set(input.end_date.into()),
            max_participants: Set(input.max_participants),
            current_participants: Set(0),
            tags: Set(serde_json::json!(tags)),
            image_url: Set(input.image_url),
            status: Set(if publish_now {
                EventStatus::Approved
            } else {
                EventStatus::Pending
            }),
            created_by: Set(actor.id.clone()),
            channel_id: Set(publish_now.then(|| side_id.clone())),
            approval_request_id: Set((!publish_now).then(|| side_id.clone())),
            cancellation_reason: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let event = EventRepository::create_in(&txn, model).await?;
        let request = if publish_now {
            ChannelRepository::create_in(&txn, new_channel(side_id, &event)).await?;
            None
        } else {
            let payload = ApprovalPayload::EventApproval {
                event_id: event_id.clone(),
            };
            let request = new_request(side_id, &actor.id, &payload)?;
            Some(ApprovalRequestRepository::create_in(&txn, request).await?)
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(event_id = %event.id, status = ?event.status, "Event created");

        if let Some(ref request) = request {
            notify_admins(
                &self.user_repo,
                &self.notification_service,
                request,
                format!("{} submitted \"{}\" for approval", actor.name, event.title),
            )
            .await;
        }

        Ok(event)
    }

    /// List events. Only admins see events that are not approved.
    pub async fn list(
        &self,
        actor: &user::Model,
        query: EventQuery,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<event::Model>, u64)> {
        let statuses = if actor.is_admin() {
            query.status.into_iter().collect()
        } else {
            vec![EventStatus::Approved]
        };

        let filter = EventFilter {
            statuses,
            tag: query.tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()),
            search: query.search.filter(|s| !s.trim().is_empty()),
            upcoming_only: query.upcoming_only,
            created_by: None,
        };
        self.event_repo.list(&filter, limit, offset).await
    }

    /// Events created by the caller.
    pub async fn list_mine(&self, actor: &user::Model) -> AppResult<Vec<event::Model>> {
        self.event_repo.find_by_creator(&actor.id).await
    }

    /// Get an event. Unpublished events are hidden from everyone but their
    /// creator and admins.
    pub async fn get(&self, actor: &user::Model, id: &str) -> AppResult<event::Model> {
        let event = self.event_repo.get_by_id(id).await?;
        if event.status != EventStatus::Approved && !can_manage(actor, &event) {
            return Err(AppError::EventNotFound(id.to_string()));
        }
        Ok(event)
    }

    /// Update an event and tell its registered participants.
    pub async fn update(
        &self,
        actor: &user::Model,
        id: &str,
        input: UpdateEventInput,
    ) -> AppResult<event::Model> {
        input.validate()?;

        let event = self.event_repo.get_by_id(id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the creator or an admin can edit this event".to_string(),
            ));
        }
        if matches!(event.status, EventStatus::Cancelled | EventStatus::Rejected) {
            return Err(AppError::BadRequest(format!(
                "A {:?} event cannot be edited",
                event.status
            )));
        }

        let start = input
            .start_date
            .unwrap_or_else(|| event.start_date.with_timezone(&Utc));
        let end = input
            .end_date
            .unwrap_or_else(|| event.end_date.with_timezone(&Utc));
        check_dates(start, end)?;
        if input.start_date.is_some() && start <= Utc::now() {
            return Err(AppError::Validation(
                "Event must start in the future".to_string(),
            ));
        }

        if let Some(max) = input.max_participants {
            if max < event.current_participants {
                return Err(AppError::BadRequest(format!(
                    "{} participants are already registered",
                    event.current_participants
                )));
            }
        }

        let title = event.title.clone();
        let mut active: event::ActiveModel = event.into();
        if let Some(t) = input.title {
            active.title = Set(t.trim().to_string());
        }
        if let Some(d) = input.description {
            active.description = Set(d.trim().to_string());
        }
        if let Some(l) = input.location {
            active.location = Set(l.trim().to_string());
        }
        if input.start_date.is_some() {
            active.start_date = Set(start.into());
        }
        if input.end_date.is_some() {
            active.end_date = Set(end.into());
        }
        if let Some(max) = input.max_participants {
            active.max_participants = Set(max);
        }
        if let Some(tags) = input.tags {
            active.tags = Set(serde_json::json!(normalize_tags(&tags)?));
        }
        if let Some(image_url) = input.image_url {
            let image_url = image_url.trim().to_string();
            if image_url.is_empty() {
                active.image_url = Set(None);
            } else {
                url::Url::parse(&image_url)
                    .map_err(|_| AppError::Validation(format!("Invalid image URL: {image_url}")))?;
                active.image_url = Set(Some(image_url));
            }
        }
        active.updated_at = Set(Some(Utc::now().into()));

        let updated = self.event_repo.update(active).await?;

        if updated.status == EventStatus::Approved {
            match self.registration_repo.find_registered_user_ids(&updated.id).await {
                Ok(participants) => {
                    let notice = NewNotification::new(
                        NotificationKind::EventUpdated,
                        "Event updated",
                        format!("\"{title}\" has new details. Please review them."),
                    )
                    .actor(&actor.id)
                    .event(&updated.id);
                    self.notification_service
                        .notify_many(&participants, &notice)
                        .await;
                }
                Err(e) => tracing::warn!(error = %e, event_id = %updated.id, "Failed to load participants"),
            }
        }

        Ok(updated)
    }

    /// Delete an event with its registrations, attendance, channel and
    /// pending requests.
    pub async fn delete(&self, actor: &user::Model, id: &str) -> AppResult<()> {
        let event = self.event_repo.get_by_id(id).await?;
        let creator_may_delete = event.created_by == actor.id
            && matches!(event.status, EventStatus::Pending | EventStatus::Rejected);
        if !actor.is_admin() && !creator_may_delete {
            return Err(AppError::Forbidden(
                "Only admins can delete a published event".to_string(),
            ));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let affected = RegistrationRepository::find_live_user_ids_in(&txn, id).await?;
        let requests = ApprovalRequestRepository::delete_pending_for_event_in(&txn, id).await?;
        EventRepository::delete_in(&txn, id).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            event_id = %id,
            registrations = affected.len(),
            pending_requests = requests,
            "Event deleted"
        );

        if !affected.is_empty() {
            let notice = NewNotification::new(
                NotificationKind::EventCancelled,
                "Event removed",
                format!("\"{}\" has been removed by an administrator.", event.title),
            )
            .actor(&actor.id)
            .link("/events");
            self.notification_service.notify_many(&affected, &notice).await;
        }

        Ok(())
    }

    /// Ask an admin to cancel a published event.
    pub async fn request_cancellation(
        &self,
        actor: &user::Model,
        id: &str,
        input: CancellationInput,
    ) -> AppResult<approval_request::Model> {
        input.validate()?;

        let event = self.event_repo.get_by_id(id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the creator or an admin can cancel this event".to_string(),
            ));
        }
        if event.status != EventStatus::Approved {
            return Err(AppError::BadRequest(
                "Only approved events can be cancelled".to_string(),
            ));
        }
        if self.approval_repo.has_pending_cancellation(id).await? {
            return Err(AppError::Conflict(
                "A cancellation request is already pending for this event".to_string(),
            ));
        }

        let payload = ApprovalPayload::EventCancellation {
            event_id: event.id.clone(),
            reason: input.reason.trim().to_string(),
        };
        let request = self
            .approval_repo
            .create(new_request(self.id_gen.generate(), &actor.id, &payload)?)
            .await?;

        tracing::info!(event_id = %event.id, request_id = %request.id, "Cancellation requested");
        notify_admins(
            &self.user_repo,
            &self.notification_service,
            &request,
            format!("{} asked to cancel \"{}\"", actor.name, event.title),
        )
        .await;

        Ok(request)
    }

    /// Registrations of an event with their users, in sign-up order.
    pub async fn participants(
        &self,
        actor: &user::Model,
        id: &str,
        status: Option<RegistrationStatus>,
    ) -> AppResult<Vec<Participant>> {
        let event = self.event_repo.get_by_id(id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the creator or an admin can see participants".to_string(),
            ));
        }

        let statuses: Vec<RegistrationStatus> = status.into_iter().collect();
        let registrations = self.registration_repo.find_by_event(id, &statuses).await?;

        let user_ids: Vec<String> = registrations.iter().map(|r| r.user_id.clone()).collect();
        let mut users: HashMap<String, user::Model> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            self.user_repo
                .find_by_ids(&user_ids)
                .await?
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect()
        };

        Ok(registrations
            .into_iter()
            .map(|registration| Participant {
                user: users.remove(&registration.user_id),
                registration,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use volunteer_db::repositories::NotificationRepository;

    fn service(db: MockDatabase) -> EventService {
        service_on(Arc::new(db.into_connection()))
    }

    fn service_on(db: Arc<DatabaseConnection>) -> EventService {
        EventService::new(
            db.clone(),
            EventRepository::new(db.clone()),
            RegistrationRepository::new(db.clone()),
            ApprovalRequestRepository::new(db.clone()),
            UserRepository::new(db.clone()),
            NotificationService::new(NotificationRepository::new(db)),
        )
    }

    fn input() -> CreateEventInput {
        let start = Utc::now() + Duration::days(7);
        CreateEventInput {
            title: "Park restoration".to_string(),
            description: "Planting native shrubs".to_string(),
            location: "Riverside park".to_string(),
            start_date: start,
            end_date: start + Duration::hours(4),
            max_participants: 25,
            tags: vec!["Environment".to_string(), "outdoors".to_string()],
            image_url: None,
        }
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " Environment ".to_string(),
            "environment".to_string(),
            "Kids".to_string(),
        ];
        assert_eq!(normalize_tags(&tags).unwrap(), vec!["environment", "kids"]);

        assert!(normalize_tags(&[]).is_err());
        assert!(normalize_tags(&["  ".to_string()]).is_err());
        assert!(normalize_tags(&["x".repeat(31)]).is_err());
        let six: Vec<String> = (0..6).map(|i| format!("tag{i}")).collect();
        assert!(normalize_tags(&six).is_err());
    }

    #[test]
    fn test_can_manage() {
        let event = fixtures::event("e1", "m1", EventStatus::Approved);
        assert!(can_manage(&fixtures::user("m1", Role::Manager), &event));
        assert!(can_manage(&fixtures::user("a1", Role::Admin), &event));
        assert!(!can_manage(&fixtures::user("m2", Role::Manager), &event));
    }

    #[tokio::test]
    async fn test_volunteer_cannot_create() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let result = service
            .create(&fixtures::user("v1", Role::Volunteer), input())
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_past_and_inverted_dates() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let manager = fixtures::user("m1", Role::Manager);

        let mut past = input();
        past.start_date = Utc::now() - Duration::hours(1);
        past.end_date = Utc::now() + Duration::hours(1);
        assert!(matches!(
            service.create(&manager, past).await,
            Err(AppError::Validation(_))
        ));

        let mut inverted = input();
        inverted.end_date = inverted.start_date - Duration::hours(1);
        assert!(matches!(
            service.create(&manager, inverted).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_manager_event_is_pending_with_request() {
        let mut created = fixtures::event("e1", "m1", EventStatus::Pending);
        created.approval_request_id = Some("ar1".to_string());
        let request = volunteer_db::entities::approval_request::Model {
            id: "ar1".to_string(),
            request_type: volunteer_db::entities::approval_request::ApprovalType::EventApproval,
            requester_id: "m1".to_string(),
            event_id: Some("e1".to_string()),
            payload: serde_json::json!({"type": "event_approval", "eventId": "e1"}),
            status: volunteer_db::entities::approval_request::ApprovalStatus::Pending,
            reviewed_by: None,
            review_note: None,
            created_at: Utc::now().into(),
            reviewed_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[created]])
            .append_query_results([[request]]);
        let service = service(db);

        let event = service
            .create(&fixtures::user("m1", Role::Manager), input())
            .await
            .unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.approval_request_id.as_deref(), Some("ar1"));
    }

    #[tokio::test]
    async fn test_admin_event_is_published_with_channel() {
        let mut created = fixtures::event("e1", "a1", EventStatus::Approved);
        created.channel_id = Some("c1".to_string());
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[created]])
                .append_query_results([[fixtures::channel("c1", "e1")]])
                .into_connection(),
        );
        let service = service_on(db.clone());

        let event = service
            .create(&fixtures::user("a1", Role::Admin), input())
            .await
            .unwrap();
        assert_eq!(event.status, EventStatus::Approved);
        assert_eq!(event.channel_id.as_deref(), Some("c1"));

        drop(service);
        let Ok(db) = Arc::try_unwrap(db) else {
            panic!("connection still shared");
        };
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("approved"));
        assert!(log.contains("Updates and chat for Park restoration"));
        // the event and its channel, no approval request
        assert_eq!(log.matches("INSERT INTO").count(), 2);
    }

    #[tokio::test]
    async fn test_pending_event_hidden_from_others() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Pending)]]);
        let service = service(db);

        let result = service.get(&fixtures::user("v1", Role::Volunteer), "e1").await;
        assert!(matches!(result, Err(AppError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_cannot_shrink_below_registered() {
        let mut event = fixtures::event("e1", "m1", EventStatus::Approved);
        event.current_participants = 8;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[event]]);
        let service = service(db);

        let result = service
            .update(
                &fixtures::user("m1", Role::Manager),
                "e1",
                UpdateEventInput {
                    max_participants: Some(5),
                    ..UpdateEventInput::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_cancelled_event_is_read_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Cancelled)]]);
        let service = service(db);

        let result = service
            .update(
                &fixtures::user("a1", Role::Admin),
                "e1",
                UpdateEventInput {
                    title: Some("New title".to_string()),
                    ..UpdateEventInput::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_creator_cannot_delete_published_event() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]]);
        let service = service(db);

        let result = service.delete(&fixtures::user("m1", Role::Manager), "e1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_duplicate_cancellation_request_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]])
            .append_query_results([[
                maplit::btreemap! { "num_items" => sea_orm::Value::BigInt(Some(1)) },
            ]]);
        let service = service(db);

        let result = service
            .request_cancellation(
                &fixtures::user("m1", Role::Manager),
                "e1",
                CancellationInput {
                    reason: "Storm warning".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancellation_needs_approved_event() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Pending)]]);
        let service = service(db);

        let result = service
            .request_cancellation(
                &fixtures::user("m1", Role::Manager),
                "e1",
                CancellationInput {
                    reason: "Storm warning".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
