//! Registration service: sign-ups, waitlist and QR tickets.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use serde::Serialize;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        event::{self, EventStatus},
        notification::NotificationKind,
        registration::{self, RegistrationStatus},
        user,
    },
    repositories::{AttendanceRepository, EventRepository, RegistrationRepository},
};

use crate::services::event::can_manage;
use crate::services::notification::{NewNotification, NotificationService};

/// Prefix of every QR payload.
pub const QR_PREFIX: &str = "volunteer-hub";

/// Encode the content of a registration's QR code.
#[must_use]
pub fn qr_payload(registration_id: &str, token: &str) -> String {
    format!("{QR_PREFIX}:{registration_id}:{token}")
}

/// Split a scanned QR payload into registration ID and token.
#[must_use]
pub fn parse_qr_payload(payload: &str) -> Option<(&str, &str)> {
    let mut parts = payload.trim().splitn(3, ':');
    let (prefix, id, token) = (parts.next()?, parts.next()?, parts.next()?);
    if prefix != QR_PREFIX || id.is_empty() || token.is_empty() || token.contains(':') {
        return None;
    }
    Some((id, token))
}

/// Hand a freshly released seat to the longest-waiting registration on the
/// event's waitlist. The seat goes back if that registration moved on in
/// the meantime.
pub(crate) async fn fill_freed_seat_in<C: ConnectionTrait>(
    conn: &C,
    event_id: &str,
    id_gen: &IdGenerator,
) -> AppResult<Option<registration::Model>> {
    let Some(next) = RegistrationRepository::oldest_waitlisted_in(conn, event_id).await? else {
        return Ok(None);
    };
    if !EventRepository::try_claim_seat_in(conn, event_id).await? {
        return Ok(None);
    }

    let token = id_gen.generate_token();
    let promoted = RegistrationRepository::transition_in(
        conn,
        &next.id,
        RegistrationStatus::Waitlisted,
        RegistrationStatus::Registered,
        Some(token.clone()),
    )
    .await?;
    if !promoted {
        EventRepository::release_seat_in(conn, event_id).await?;
        return Ok(None);
    }

    Ok(Some(registration::Model {
        status: RegistrationStatus::Registered,
        qr_token: Some(token),
        updated_at: Some(Utc::now().into()),
        ..next
    }))
}

/// Tell a volunteer that they moved off the waitlist.
pub(crate) async fn notify_promoted(
    notification_service: &NotificationService,
    event_repo: &EventRepository,
    promoted: &registration::Model,
) {
    let title = match event_repo.find_by_id(&promoted.event_id).await {
        Ok(Some(e)) => e.title,
        _ => "your event".to_string(),
    };
    let notice = NewNotification::new(
        NotificationKind::WaitlistPromoted,
        "You're off the waitlist",
        format!("A seat opened up and you're now registered for \"{title}\"."),
    )
    .event(&promoted.event_id);
    notification_service.notify(&promoted.user_id, &notice).await;
}

/// A registration with its event.
#[derive(Debug, Clone)]
pub struct RegistrationDetail {
    pub registration: registration::Model,
    pub event: Option<event::Model>,
}

/// QR ticket of a registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub registration_id: String,
    pub payload: String,
}

/// Registration service.
#[derive(Clone)]
pub struct RegistrationService {
    db: Arc<DatabaseConnection>,
    event_repo: EventRepository,
    registration_repo: RegistrationRepository,
    attendance_repo: AttendanceRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl RegistrationService {
    /// Create a new registration service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        event_repo: EventRepository,
        registration_repo: RegistrationRepository,
        attendance_repo: AttendanceRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            db,
            event_repo,
            registration_repo,
            attendance_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register the caller for an event, or put them on its waitlist when
    /// every seat is taken.
    pub async fn register(
        &self,
        actor: &user::Model,
        event_id: &str,
    ) -> AppResult<registration::Model> {
        let event = self.event_repo.get_by_id(event_id).await?;
        if event.status != EventStatus::Approved {
            return Err(AppError::BadRequest(
                "Event is not open for registration".to_string(),
            ));
        }
        if event.end_date.with_timezone(&Utc) <= Utc::now() {
            return Err(AppError::BadRequest("Event has already ended".to_string()));
        }
        if event.created_by == actor.id {
            return Err(AppError::BadRequest(
                "You cannot register for your own event".to_string(),
            ));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let existing =
            RegistrationRepository::find_by_user_and_event_in(&txn, &actor.id, event_id).await?;
        match existing.as_ref().map(|r| r.status) {
            Some(RegistrationStatus::Registered) => {
                return Err(AppError::Conflict(
                    "You are already registered for this event".to_string(),
                ));
            }
            Some(RegistrationStatus::Waitlisted) => {
                return Err(AppError::Conflict(
                    "You are already on the waitlist for this event".to_string(),
                ));
            }
            _ => {}
        }

        let seated = EventRepository::try_claim_seat_in(&txn, event_id).await?;
        let (status, qr_token) = if seated {
            (RegistrationStatus::Registered, Some(self.id_gen.generate_token()))
        } else {
            (RegistrationStatus::Waitlisted, None)
        };
        let now = Utc::now();

        let registration = match existing {
            Some(cancelled) => {
                let reopened = RegistrationRepository::transition_in(
                    &txn,
                    &cancelled.id,
                    RegistrationStatus::Cancelled,
                    status,
                    qr_token.clone(),
                )
                .await?;
                if !reopened {
                    return Err(AppError::Conflict(
                        "You are already registered for this event".to_string(),
                    ));
                }
                registration::Model {
                    status,
                    qr_token,
                    registered_at: now.into(),
                    cancelled_at: None,
                    updated_at: Some(now.into()),
                    ..cancelled
                }
            }
            None => {
                let model = registration::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(actor.id.clone()),
                    event_id: Set(event_id.to_string()),
                    status: Set(status),
                    qr_token: Set(qr_token),
                    registered_at: Set(now.into()),
                    cancelled_at: Set(None),
                    updated_at: Set(None),
                };
                RegistrationRepository::create_in(&txn, model).await?
            }
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            registration_id = %registration.id,
            event_id = %event_id,
            status = ?registration.status,
            "Registration created"
        );

        if registration.status == RegistrationStatus::Registered {
            let confirmed = NewNotification::new(
                NotificationKind::RegistrationConfirmed,
                "Registration confirmed",
                format!("You're registered for \"{}\".", event.title),
            )
            .event(&event.id);
            self.notification_service.notify(&actor.id, &confirmed).await;

            let new_volunteer = NewNotification::new(
                NotificationKind::NewRegistration,
                "New registration",
                format!("{} registered for \"{}\".", actor.name, event.title),
            )
            .actor(&actor.id)
            .event(&event.id);
            self.notification_service
                .notify(&event.created_by, &new_volunteer)
                .await;
        }

        Ok(registration)
    }

    /// Cancel the caller's registration for an event. A freed seat goes to
    /// the longest-waiting waitlisted registration.
    pub async fn cancel(
        &self,
        actor: &user::Model,
        event_id: &str,
    ) -> AppResult<registration::Model> {
        let registration = self
            .registration_repo
            .find_by_user_and_event(&actor.id, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("You are not registered for this event".to_string()))?;

        if registration.status == RegistrationStatus::Cancelled {
            return Err(AppError::BadRequest(
                "Registration is already cancelled".to_string(),
            ));
        }
        if let Some(attendance) = self
            .attendance_repo
            .find_by_registration(&registration.id)
            .await?
        {
            if attendance.check_in_at.is_some() {
                return Err(AppError::BadRequest(
                    "You have already checked in to this event".to_string(),
                ));
            }
        }

        let held_seat = registration.status == RegistrationStatus::Registered;
        let now = Utc::now();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let changed = RegistrationRepository::transition_in(
            &txn,
            &registration.id,
            registration.status,
            RegistrationStatus::Cancelled,
            None,
        )
        .await?;
        if !changed {
            let current =
                RegistrationRepository::find_by_user_and_event_in(&txn, &actor.id, event_id)
                    .await?;
            return Err(match current.map(|r| r.status) {
                Some(RegistrationStatus::Cancelled) | None => AppError::BadRequest(
                    "Registration is already cancelled".to_string(),
                ),
                Some(_) => AppError::Conflict(
                    "Registration changed while cancelling, please retry".to_string(),
                ),
            });
        }
        let cancelled = registration::Model {
            status: RegistrationStatus::Cancelled,
            qr_token: None,
            cancelled_at: Some(now.into()),
            updated_at: Some(now.into()),
            ..registration
        };

        let promoted = if held_seat {
            EventRepository::release_seat_in(&txn, event_id).await?;
            fill_freed_seat_in(&txn, event_id, &self.id_gen).await?
        } else {
            None
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            registration_id = %cancelled.id,
            event_id = %event_id,
            promoted = ?promoted.as_ref().map(|r| r.id.as_str()),
            "Registration cancelled"
        );

        if let Some(promoted) = promoted {
            notify_promoted(&self.notification_service, &self.event_repo, &promoted).await;
        }

        Ok(cancelled)
    }

    /// The caller's registrations with their events.
    pub async fn list_mine(
        &self,
        actor: &user::Model,
        status: Option<RegistrationStatus>,
    ) -> AppResult<Vec<RegistrationDetail>> {
        let registrations = self.registration_repo.find_by_user(&actor.id, status).await?;

        let event_ids: Vec<String> = registrations.iter().map(|r| r.event_id.clone()).collect();
        let events: HashMap<String, event::Model> = if event_ids.is_empty() {
            HashMap::new()
        } else {
            self.event_repo
                .find_by_ids(&event_ids)
                .await?
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect()
        };

        Ok(registrations
            .into_iter()
            .map(|registration| RegistrationDetail {
                event: events.get(&registration.event_id).cloned(),
                registration,
            })
            .collect())
    }

    /// Get a registration as its owner, the event's creator, or an admin.
    pub async fn get(&self, actor: &user::Model, id: &str) -> AppResult<RegistrationDetail> {
        let registration = self.registration_repo.get_by_id(id).await?;
        let event = self.event_repo.find_by_id(&registration.event_id).await?;

        let allowed = registration.user_id == actor.id
            || actor.is_admin()
            || event.as_ref().is_some_and(|e| can_manage(actor, e));
        if !allowed {
            return Err(AppError::Forbidden(
                "You cannot view this registration".to_string(),
            ));
        }

        Ok(RegistrationDetail {
            registration,
            event,
        })
    }

    /// QR ticket of the caller's registration.
    pub async fn qr(&self, actor: &user::Model, id: &str) -> AppResult<QrCode> {
        let registration = self.registration_repo.get_by_id(id).await?;
        if registration.user_id != actor.id {
            return Err(AppError::Forbidden(
                "Only the registrant can view this ticket".to_string(),
            ));
        }

        match (registration.status, registration.qr_token) {
            (RegistrationStatus::Registered, Some(token)) => Ok(QrCode {
                payload: qr_payload(&registration.id, &token),
                registration_id: registration.id,
            }),
            _ => Err(AppError::BadRequest(
                "Only confirmed registrations have a ticket".to_string(),
            )),
        }
    }
}
