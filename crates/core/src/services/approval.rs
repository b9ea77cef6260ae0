//! Approval workflow service.
//!
//! One request table serves three workflows (event approval, manager
//! promotion, event cancellation). Reviewing a request changes its status
//! and applies the workflow's side effects in the same transaction, so a
//! request is never approved without its effect or vice versa.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde::Deserialize;
use validator::Validate;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        approval_request::{self, ApprovalPayload, ApprovalStatus},
        event::{self, EventStatus},
        notification::NotificationKind,
        user::{self, Role},
    },
    repositories::{
        ApprovalFilter, ApprovalRequestRepository, ChannelRepository, EventRepository,
        RegistrationRepository, UserRepository,
    },
};

use crate::services::notification::{NewNotification, NotificationService};
use crate::services::social::new_channel;

/// Input for asking to become a manager.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromotionInput {
    #[validate(length(min = 10, max = 1000))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub experience: Option<String>,
    #[validate(length(max = 200))]
    pub organization: Option<String>,
}

impl PromotionInput {
    pub(crate) fn into_payload(self) -> ApprovalPayload {
        ApprovalPayload::ManagerPromotion {
            reason: self.reason.trim().to_string(),
            experience: non_empty(self.experience),
            organization: non_empty(self.organization),
        }
    }
}

/// Optional note attached to a review decision.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReviewInput {
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

/// Review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    const fn status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build a pending request row for a payload.
pub(crate) fn new_request(
    id: String,
    requester_id: &str,
    payload: &ApprovalPayload,
) -> AppResult<approval_request::ActiveModel> {
    Ok(approval_request::ActiveModel {
        id: Set(id),
        request_type: Set(payload.request_type()),
        requester_id: Set(requester_id.to_string()),
        event_id: Set(payload.event_id().map(ToString::to_string)),
        payload: Set(serde_json::to_value(payload)?),
        status: Set(ApprovalStatus::Pending),
        reviewed_by: Set(None),
        review_note: Set(None),
        created_at: Set(Utc::now().into()),
        reviewed_at: Set(None),
    })
}

/// Tell every active admin about a new request.
pub(crate) async fn notify_admins(
    user_repo: &UserRepository,
    notifications: &NotificationService,
    request: &approval_request::Model,
    message: String,
) {
    let admin_ids = match user_repo.find_admin_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(error = %e, request_id = %request.id, "Failed to look up admins");
            return;
        }
    };

    let mut notice =
        NewNotification::new(NotificationKind::ApprovalRequested, "New approval request", message)
            .actor(&request.requester_id)
            .approval_request(&request.id)
            .link(format!("/approvals/{}", request.id));
    if let Some(ref event_id) = request.event_id {
        notice = notice.event(event_id);
    }

    notifications.notify_many(&admin_ids, &notice).await;
}

/// What a committed review changed, for the notifications that follow.
enum ReviewEffect {
    Event {
        event: event::Model,
    },
    Promotion {
        promoted: bool,
    },
    Cancellation {
        event: event::Model,
        reason: String,
        affected: Vec<String>,
    },
}

/// Approval workflow service.
#[derive(Clone)]
pub struct ApprovalService {
    db: Arc<DatabaseConnection>,
    approval_repo: ApprovalRequestRepository,
    user_repo: UserRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl ApprovalService {
    /// Create a new approval service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        approval_repo: ApprovalRequestRepository,
        user_repo: UserRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            db,
            approval_repo,
            user_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// A volunteer asks to become a manager.
    pub async fn request_promotion(
        &self,
        actor: &user::Model,
        input: PromotionInput,
    ) -> AppResult<approval_request::Model> {
        input.validate()?;

        if actor.role != Role::Volunteer {
            return Err(AppError::Forbidden(
                "Only volunteers can request a promotion".to_string(),
            ));
        }
        if self.approval_repo.has_pending_promotion(&actor.id).await? {
            return Err(AppError::Conflict(
                "A promotion request is already pending".to_string(),
            ));
        }

        let payload = input.into_payload();
        let model = new_request(self.id_gen.generate(), &actor.id, &payload)?;
        let request = self.approval_repo.create(model).await?;

        tracing::info!(request_id = %request.id, user_id = %actor.id, "Promotion requested");
        notify_admins(
            &self.user_repo,
            &self.notification_service,
            &request,
            format!("{} asked to become an event manager", actor.name),
        )
        .await;

        Ok(request)
    }

    /// Admin queue.
    pub async fn list(
        &self,
        filter: &ApprovalFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<approval_request::Model>, u64)> {
        self.approval_repo.list(filter, limit, offset).await
    }

    /// Requests the caller filed, newest first.
    pub async fn list_mine(
        &self,
        actor: &user::Model,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<approval_request::Model>, u64)> {
        let filter = ApprovalFilter {
            requester_id: Some(actor.id.clone()),
            ..ApprovalFilter::default()
        };
        self.approval_repo.list(&filter, limit, offset).await
    }

    /// Get a request as an admin or its requester.
    pub async fn get(&self, actor: &user::Model, id: &str) -> AppResult<approval_request::Model> {
        let request = self.approval_repo.get_by_id(id).await?;
        if !actor.is_admin() && request.requester_id != actor.id {
            return Err(AppError::Forbidden(
                "You cannot view this request".to_string(),
            ));
        }
        Ok(request)
    }

    /// Approve a pending request and apply its effect.
    pub async fn approve(
        &self,
        reviewer: &user::Model,
        id: &str,
        input: ReviewInput,
    ) -> AppResult<approval_request::Model> {
        self.review(reviewer, id, Decision::Approve, input).await
    }

    /// Reject a pending request.
    pub async fn reject(
        &self,
        reviewer: &user::Model,
        id: &str,
        input: ReviewInput,
    ) -> AppResult<approval_request::Model> {
        self.review(reviewer, id, Decision::Reject, input).await
    }

    async fn review(
        &self,
        reviewer: &user::Model,
        id: &str,
        decision: Decision,
        input: ReviewInput,
    ) -> AppResult<approval_request::Model> {
        input.validate()?;
        if !reviewer.is_admin() {
            return Err(AppError::Forbidden(
                "Only admins can review requests".to_string(),
            ));
        }

        let request = self.approval_repo.get_by_id(id).await?;
        if request.status != ApprovalStatus::Pending {
            return Err(AppError::BadRequest(
                "Request has already been reviewed".to_string(),
            ));
        }
        let payload = request.typed_payload().map_err(|e| {
            AppError::Internal(format!("Corrupt payload on approval request {id}: {e}"))
        })?;
        let note = non_empty(input.note);

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let claimed = ApprovalRequestRepository::mark_reviewed_in(
            &txn,
            id,
            decision.status(),
            &reviewer.id,
            note.as_deref(),
        )
        .await?;
        if !claimed {
            return Err(AppError::BadRequest(
                "Request has already been reviewed".to_string(),
            ));
        }

        let effect = match payload {
            ApprovalPayload::EventApproval { event_id } => {
                let event = EventRepository::find_by_id_in(&txn, &event_id)
                    .await?
                    .ok_or_else(|| AppError::EventNotFound(event_id.clone()))?;
                if event.status != EventStatus::Pending {
                    return Err(AppError::BadRequest(format!(
                        "Event is {:?}, not pending",
                        event.status
                    )));
                }

                match decision {
                    Decision::Approve => {
                        let channel_id = self.id_gen.generate();
                        ChannelRepository::create_in(&txn, new_channel(channel_id.clone(), &event))
                            .await?;
                        EventRepository::set_status_in(
                            &txn,
                            &event_id,
                            EventStatus::Approved,
                            Some(&channel_id),
                        )
                        .await?;
                    }
                    Decision::Reject => {
                        EventRepository::set_status_in(&txn, &event_id, EventStatus::Rejected, None)
                            .await?;
                    }
                }
                ReviewEffect::Event { event }
            }
            ApprovalPayload::ManagerPromotion { .. } => {
                let promoted = match decision {
                    Decision::Approve => {
                        UserRepository::promote_to_manager_in(&txn, &request.requester_id).await?
                    }
                    Decision::Reject => false,
                };
                ReviewEffect::Promotion { promoted }
            }
            ApprovalPayload::EventCancellation { event_id, reason } => {
                let event = EventRepository::find_by_id_in(&txn, &event_id)
                    .await?
                    .ok_or_else(|| AppError::EventNotFound(event_id.clone()))?;

                let mut affected = Vec::new();
                if decision == Decision::Approve {
                    if event.status != EventStatus::Approved {
                        return Err(AppError::BadRequest(format!(
                            "Event is {:?}, not approved",
                            event.status
                        )));
                    }
                    affected = RegistrationRepository::find_live_user_ids_in(&txn, &event_id).await?;
                    let cancelled = RegistrationRepository::cancel_all_live_in(&txn, &event_id).await?;
                    EventRepository::mark_cancelled_in(&txn, &event_id, &reason).await?;
                    tracing::info!(event_id = %event_id, registrations = cancelled, "Event cancelled");
                }
                ReviewEffect::Cancellation {
                    event,
                    reason,
                    affected,
                }
            }
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            request_id = %id,
            reviewer_id = %reviewer.id,
            decision = ?decision,
            "Approval request reviewed"
        );

        let reviewed = self.approval_repo.get_by_id(id).await?;
        self.notify_outcome(reviewer, &reviewed, decision, effect)
            .await;
        Ok(reviewed)
    }

    async fn notify_outcome(
        &self,
        reviewer: &user::Model,
        request: &approval_request::Model,
        decision: Decision,
        effect: ReviewEffect,
    ) {
        let note_suffix = request
            .review_note
            .as_deref()
            .map(|n| format!(" Note: {n}"))
            .unwrap_or_default();

        match effect {
            ReviewEffect::Event { event } => {
                let notice = match decision {
                    Decision::Approve => NewNotification::new(
                        NotificationKind::EventApproved,
                        "Event approved",
                        format!("\"{}\" is now open for registration.{note_suffix}", event.title),
                    ),
                    Decision::Reject => NewNotification::new(
                        NotificationKind::EventRejected,
                        "Event rejected",
                        format!("\"{}\" was not approved.{note_suffix}", event.title),
                    ),
                };
                let notice = notice
                    .actor(&reviewer.id)
                    .event(&event.id)
                    .approval_request(&request.id);
                self.notification_service
                    .notify(&request.requester_id, &notice)
                    .await;
            }
            ReviewEffect::Promotion { promoted } => {
                let notice = match decision {
                    Decision::Approve if promoted => NewNotification::new(
                        NotificationKind::PromotionApproved,
                        "You are now an event manager",
                        format!("Your promotion request was approved.{note_suffix}"),
                    ),
                    Decision::Approve => {
                        tracing::info!(
                            user_id = %request.requester_id,
                            "Promotion approved but user is no longer an active volunteer"
                        );
                        NewNotification::new(
                            NotificationKind::PromotionApproved,
                            "Promotion request closed",
                            format!(
                                "Your promotion request was approved, but your account \
                                 could not be changed. Contact an administrator.{note_suffix}"
                            ),
                        )
                    }
                    Decision::Reject => NewNotification::new(
                        NotificationKind::PromotionRejected,
                        "Promotion request declined",
                        format!("Your promotion request was not approved.{note_suffix}"),
                    ),
                };
                let notice = notice
                    .actor(&reviewer.id)
                    .approval_request(&request.id)
                    .link(format!("/approvals/{}", request.id));
                self.notification_service
                    .notify(&request.requester_id, &notice)
                    .await;
            }
            ReviewEffect::Cancellation {
                event,
                reason,
                mut affected,
            } => match decision {
                Decision::Approve => {
                    let notice = NewNotification::new(
                        NotificationKind::EventCancelled,
                        "Event cancelled",
                        format!("\"{}\" has been cancelled: {reason}", event.title),
                    )
                    .actor(&reviewer.id)
                    .event(&event.id)
                    .approval_request(&request.id);
                    affected.insert(0, request.requester_id.clone());
                    self.notification_service
                        .notify_many(&affected, &notice)
                        .await;
                }
                Decision::Reject => {
                    let notice = NewNotification::new(
                        NotificationKind::CancellationRejected,
                        "Cancellation request declined",
                        format!(
                            "\"{}\" will go ahead as planned.{note_suffix}",
                            event.title
                        ),
                    )
                    .actor(&reviewer.id)
                    .event(&event.id)
                    .approval_request(&request.id);
                    self.notification_service
                        .notify(&request.requester_id, &notice)
                        .await;
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;
    use volunteer_db::entities::approval_request::ApprovalType;
    use volunteer_db::repositories::NotificationRepository;

    fn service(db: MockDatabase) -> ApprovalService {
        service_on(Arc::new(db.into_connection()))
    }

    fn service_on(db: Arc<DatabaseConnection>) -> ApprovalService {
        ApprovalService::new(
            db.clone(),
            ApprovalRequestRepository::new(db.clone()),
            UserRepository::new(db.clone()),
            NotificationService::new(NotificationRepository::new(db)),
        )
    }

    fn request(
        id: &str,
        requester_id: &str,
        payload: &ApprovalPayload,
        status: ApprovalStatus,
    ) -> approval_request::Model {
        approval_request::Model {
            id: id.to_string(),
            request_type: payload.request_type(),
            requester_id: requester_id.to_string(),
            event_id: payload.event_id().map(ToString::to_string),
            payload: serde_json::to_value(payload).unwrap(),
            status,
            reviewed_by: None,
            review_note: None,
            created_at: Utc::now().into(),
            reviewed_at: None,
        }
    }

    /// Review request `ar1` as admin `a1` and return the statements it ran.
    async fn review_log(
        db: MockDatabase,
        decision: Decision,
    ) -> (AppResult<approval_request::Model>, String) {
        let db = Arc::new(db.into_connection());
        let service = service_on(db.clone());
        let admin = fixtures::user("a1", Role::Admin);

        let result = match decision {
            Decision::Approve => service.approve(&admin, "ar1", ReviewInput::default()).await,
            Decision::Reject => service.reject(&admin, "ar1", ReviewInput::default()).await,
        };

        drop(service);
        let Ok(db) = Arc::try_unwrap(db) else {
            panic!("connection still shared");
        };
        (result, format!("{:?}", db.into_transaction_log()))
    }

    fn reviewed(
        pending: &approval_request::Model,
        status: ApprovalStatus,
    ) -> approval_request::Model {
        let mut reviewed = pending.clone();
        reviewed.status = status;
        reviewed.reviewed_by = Some("a1".to_string());
        reviewed
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[test]
    fn test_promotion_input_limits() {
        let short = PromotionInput {
            reason: "pls".to_string(),
            experience: None,
            organization: None,
        };
        assert!(short.validate().is_err());

        let ok = PromotionInput {
            reason: "I coordinate weekend shifts".to_string(),
            experience: Some("  ".to_string()),
            organization: Some("Food Bank".to_string()),
        };
        assert!(ok.validate().is_ok());
        let payload = ok.into_payload();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "type": "manager_promotion",
                "reason": "I coordinate weekend shifts",
                "organization": "Food Bank"
            })
        );
    }

    #[test]
    fn test_new_request_mirrors_payload() {
        let payload = ApprovalPayload::EventCancellation {
            event_id: "e1".to_string(),
            reason: "Storm warning".to_string(),
        };
        let model = new_request("ar1".to_string(), "m1", &payload).unwrap();
        assert_eq!(model.request_type.unwrap(), ApprovalType::EventCancellation);
        assert_eq!(model.event_id.unwrap(), Some("e1".to_string()));
        assert_eq!(model.status.unwrap(), ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn test_only_volunteers_request_promotion() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let manager = fixtures::user("m1", Role::Manager);

        let result = service
            .request_promotion(
                &manager,
                PromotionInput {
                    reason: "Already a manager but asking".to_string(),
                    experience: None,
                    organization: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_duplicate_promotion_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            maplit::btreemap! { "num_items" => sea_orm::Value::BigInt(Some(1)) },
        ]]);
        let service = service(db);
        let volunteer = fixtures::user("v1", Role::Volunteer);

        let result = service
            .request_promotion(
                &volunteer,
                PromotionInput {
                    reason: "I run the Saturday food drive".to_string(),
                    experience: None,
                    organization: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_review_requires_pending() {
        let payload = ApprovalPayload::EventApproval {
            event_id: "e1".to_string(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[request(
            "ar1",
            "m1",
            &payload,
            ApprovalStatus::Approved,
        )]]);
        let service = service(db);
        let admin = fixtures::user("a1", Role::Admin);

        let result = service.approve(&admin, "ar1", ReviewInput::default()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_review_requires_admin() {
        let service = service(MockDatabase::new(DatabaseBackend::Postgres));
        let manager = fixtures::user("m1", Role::Manager);

        let result = service.reject(&manager, "ar1", ReviewInput::default()).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_lost_review_race_is_rejected() {
        let payload = ApprovalPayload::ManagerPromotion {
            reason: "I run the Saturday food drive".to_string(),
            experience: None,
            organization: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[request("ar1", "v1", &payload, ApprovalStatus::Pending)]])
            .append_exec_results([exec(0)]);
        let service = service(db);
        let admin = fixtures::user("a1", Role::Admin);

        let result = service.approve(&admin, "ar1", ReviewInput::default()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_approve_promotion() {
        let payload = ApprovalPayload::ManagerPromotion {
            reason: "I run the Saturday food drive".to_string(),
            experience: None,
            organization: None,
        };
        let pending = request("ar1", "v1", &payload, ApprovalStatus::Pending);
        let mut approved = pending.clone();
        approved.status = ApprovalStatus::Approved;
        approved.reviewed_by = Some("a1".to_string());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending], [approved]])
            // mark reviewed, promote
            .append_exec_results([exec(1), exec(1)]);
        let service = service(db);
        let admin = fixtures::user("a1", Role::Admin);

        let reviewed = service
            .approve(&admin, "ar1", ReviewInput::default())
            .await
            .unwrap();
        assert_eq!(reviewed.status, ApprovalStatus::Approved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_internal_error() {
        let mut corrupt = request(
            "ar1",
            "v1",
            &ApprovalPayload::EventApproval {
                event_id: "e1".to_string(),
            },
            ApprovalStatus::Pending,
        );
        corrupt.payload = json!({"type": "event_approval"});
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[corrupt]]);
        let service = service(db);
        let admin = fixtures::user("a1", Role::Admin);

        let result = service.approve(&admin, "ar1", ReviewInput::default()).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_approving_non_pending_event_rolls_back() {
        let payload = ApprovalPayload::EventApproval {
            event_id: "e1".to_string(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[request("ar1", "m1", &payload, ApprovalStatus::Pending)]])
            .append_exec_results([exec(1)])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Cancelled)]]);
        let service = service(db);
        let admin = fixtures::user("a1", Role::Admin);

        let result = service.approve(&admin, "ar1", ReviewInput::default()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_approve_event_opens_channel() {
        let payload = ApprovalPayload::EventApproval {
            event_id: "e1".to_string(),
        };
        let pending = request("ar1", "m1", &payload, ApprovalStatus::Pending);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending.clone()]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Pending)]])
            .append_query_results([[fixtures::channel("c1", "e1")]])
            .append_query_results([[reviewed(&pending, ApprovalStatus::Approved)]])
            // mark reviewed, publish event
            .append_exec_results([exec(1), exec(1)]);

        let (result, log) = review_log(db, Decision::Approve).await;

        assert_eq!(result.unwrap().status, ApprovalStatus::Approved);
        assert!(log.contains("Updates and chat for Beach cleanup"));
        // selected once, then set on the event
        assert_eq!(log.matches("channel_id").count(), 2);
        // channel, then the requester's notification
        assert_eq!(log.matches("INSERT INTO").count(), 2);
        assert!(log.contains("Event approved"));
    }

    #[tokio::test]
    async fn test_reject_event_opens_no_channel() {
        let payload = ApprovalPayload::EventApproval {
            event_id: "e1".to_string(),
        };
        let pending = request("ar1", "m1", &payload, ApprovalStatus::Pending);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending.clone()]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Pending)]])
            .append_query_results([[reviewed(&pending, ApprovalStatus::Rejected)]])
            .append_exec_results([exec(1), exec(1)]);

        let (result, log) = review_log(db, Decision::Reject).await;

        assert_eq!(result.unwrap().status, ApprovalStatus::Rejected);
        assert_eq!(log.matches("UPDATE").count(), 2);
        assert_eq!(log.matches("channel_id").count(), 1);
        // only the requester's notification
        assert_eq!(log.matches("INSERT INTO").count(), 1);
        assert!(log.contains("Event rejected"));
    }

    #[tokio::test]
    async fn test_approve_cancellation_releases_everyone() {
        let payload = ApprovalPayload::EventCancellation {
            event_id: "e1".to_string(),
            reason: "Storm warning".to_string(),
        };
        let pending = request("ar1", "m1", &payload, ApprovalStatus::Pending);
        let mut event = fixtures::event("e1", "m1", EventStatus::Approved);
        event.current_participants = 2;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending.clone()]])
            .append_query_results([[event]])
            .append_query_results([[
                maplit::btreemap! { "user_id" => sea_orm::Value::from("v1") },
                maplit::btreemap! { "user_id" => sea_orm::Value::from("v2") },
            ]])
            .append_query_results([[reviewed(&pending, ApprovalStatus::Approved)]])
            // mark reviewed, cancel registrations, cancel event
            .append_exec_results([exec(1), exec(2), exec(1)]);

        let (result, log) = review_log(db, Decision::Approve).await;

        assert_eq!(result.unwrap().status, ApprovalStatus::Approved);
        assert_eq!(log.matches("UPDATE").count(), 3);
        assert!(log.contains("cancelled_at"));
        assert!(log.contains("Storm warning"));
        assert!(log.contains("Int(Some(0))"));
        // requester plus both participants
        assert_eq!(log.matches("INSERT INTO").count(), 3);
    }

    #[tokio::test]
    async fn test_reject_cancellation_leaves_event_running() {
        let payload = ApprovalPayload::EventCancellation {
            event_id: "e1".to_string(),
            reason: "Storm warning".to_string(),
        };
        let pending = request("ar1", "m1", &payload, ApprovalStatus::Pending);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending.clone()]])
            .append_query_results([[fixtures::event("e1", "m1", EventStatus::Approved)]])
            .append_query_results([[reviewed(&pending, ApprovalStatus::Rejected)]])
            .append_exec_results([exec(1)]);

        let (result, log) = review_log(db, Decision::Reject).await;

        assert_eq!(result.unwrap().status, ApprovalStatus::Rejected);
        // only the request itself changes
        assert_eq!(log.matches("UPDATE").count(), 1);
        assert_eq!(log.matches("INSERT INTO").count(), 1);
        assert!(log.contains("Cancellation request declined"));
    }

    #[tokio::test]
    async fn test_approved_promotion_without_effect_is_not_announced() {
        let payload = ApprovalPayload::ManagerPromotion {
            reason: "I run the Saturday food drive".to_string(),
            experience: None,
            organization: None,
        };
        let pending = request("ar1", "v1", &payload, ApprovalStatus::Pending);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending.clone()]])
            .append_query_results([[reviewed(&pending, ApprovalStatus::Approved)]])
            // mark reviewed, promotion finds no active volunteer
            .append_exec_results([exec(1), exec(0)]);

        let (result, log) = review_log(db, Decision::Approve).await;

        assert!(result.is_ok());
        assert!(log.contains("Promotion request closed"));
        assert!(!log.contains("You are now an event manager"));
    }
}
