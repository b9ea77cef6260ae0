//! Attendance service: QR check-in, check-out and feedback.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        attendance,
        event::{self, EventStatus},
        notification::NotificationKind,
        registration::{self, RegistrationStatus},
        user,
    },
    repositories::{AttendanceRepository, EventRepository, RegistrationRepository},
};

use crate::services::event::can_manage;
use crate::services::notification::{NewNotification, NotificationService};
use crate::services::registration::parse_qr_payload;

/// How early before the start volunteers may check in.
pub const CHECK_IN_LEAD_HOURS: i64 = 2;

/// Whether `now` lies in the check-in window `[start - 2h, end]`.
#[must_use]
pub fn within_check_in_window(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    now >= start - Duration::hours(CHECK_IN_LEAD_HOURS) && now <= end
}

/// Input for checking a volunteer in, by scanned QR payload or by
/// registration ID.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInInput {
    #[validate(length(max = 512))]
    pub qr_payload: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub registration_id: Option<String>,
}

/// Input for post-event feedback.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// An attendance record with its event.
#[derive(Debug, Clone)]
pub struct AttendanceDetail {
    pub attendance: attendance::Model,
    pub event: Option<event::Model>,
}

/// Attendance figures of one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub registered: u64,
    pub checked_in: u64,
    pub checked_out: u64,
    pub average_rating: Option<f64>,
}

impl AttendanceSummary {
    /// Summarize an event's attendance records.
    #[must_use]
    pub fn compute(registered: u64, records: &[attendance::Model]) -> Self {
        let checked_in = records.iter().filter(|a| a.check_in_at.is_some()).count() as u64;
        let checked_out = records.iter().filter(|a| a.check_out_at.is_some()).count() as u64;

        let ratings: Vec<f64> = records
            .iter()
            .filter_map(|a| a.feedback_rating.map(f64::from))
            .collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        Self {
            registered,
            checked_in,
            checked_out,
            average_rating,
        }
    }
}

/// Attendance of an event for its organizers.
#[derive(Debug, Clone)]
pub struct EventAttendance {
    pub records: Vec<attendance::Model>,
    pub summary: AttendanceSummary,
}

/// Attendance service.
#[derive(Clone)]
pub struct AttendanceService {
    attendance_repo: AttendanceRepository,
    registration_repo: RegistrationRepository,
    event_repo: EventRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl AttendanceService {
    /// Create a new attendance service.
    #[must_use]
    pub const fn new(
        attendance_repo: AttendanceRepository,
        registration_repo: RegistrationRepository,
        event_repo: EventRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            attendance_repo,
            registration_repo,
            event_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// Check a volunteer in.
    pub async fn check_in(
        &self,
        actor: &user::Model,
        input: CheckInInput,
    ) -> AppResult<attendance::Model> {
        input.validate()?;

        let registration = self.resolve_registration(&input).await?;
        let event = self.event_repo.get_by_id(&registration.event_id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the event organizer can check volunteers in".to_string(),
            ));
        }
        if registration.status != RegistrationStatus::Registered {
            return Err(AppError::BadRequest(
                "Registration is not confirmed".to_string(),
            ));
        }
        if event.status != EventStatus::Approved {
            return Err(AppError::BadRequest("Event is not active".to_string()));
        }

        let now = Utc::now();
        if !within_check_in_window(
            now,
            event.start_date.with_timezone(&Utc),
            event.end_date.with_timezone(&Utc),
        ) {
            return Err(AppError::BadRequest(format!(
                "Check-in opens {CHECK_IN_LEAD_HOURS} hours before the event and closes when it ends"
            )));
        }

        if self
            .attendance_repo
            .find_by_registration(&registration.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Volunteer is already checked in".to_string()));
        }

        let model = attendance::ActiveModel {
            id: Set(self.id_gen.generate()),
            registration_id: Set(registration.id.clone()),
            event_id: Set(event.id.clone()),
            user_id: Set(registration.user_id.clone()),
            check_in_at: Set(Some(now.into())),
            check_out_at: Set(None),
            checked_in_by: Set(Some(actor.id.clone())),
            feedback_rating: Set(None),
            feedback_comment: Set(None),
            feedback_at: Set(None),
            created_at: Set(now.into()),
        };
        let attendance = self.attendance_repo.create(model).await?;

        tracing::info!(
            attendance_id = %attendance.id,
            event_id = %event.id,
            user_id = %attendance.user_id,
            "Volunteer checked in"
        );

        let notice = NewNotification::new(
            NotificationKind::CheckedIn,
            "Checked in",
            format!("You're checked in to \"{}\". Thank you for volunteering!", event.title),
        )
        .actor(&actor.id)
        .event(&event.id);
        self.notification_service
            .notify(&attendance.user_id, &notice)
            .await;

        Ok(attendance)
    }

    /// Check a volunteer out.
    pub async fn check_out(
        &self,
        actor: &user::Model,
        registration_id: &str,
    ) -> AppResult<attendance::Model> {
        let registration = self.registration_repo.get_by_id(registration_id).await?;
        let event = self.event_repo.get_by_id(&registration.event_id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the event organizer can check volunteers out".to_string(),
            ));
        }

        let attendance = self
            .attendance_repo
            .find_by_registration(registration_id)
            .await?
            .filter(|a| a.check_in_at.is_some())
            .ok_or_else(|| AppError::BadRequest("Volunteer has not checked in".to_string()))?;
        if attendance.check_out_at.is_some() {
            return Err(AppError::Conflict("Volunteer is already checked out".to_string()));
        }

        let now = Utc::now();
        let check_out = attendance
            .check_in_at
            .map_or(now, |t| t.with_timezone(&Utc).max(now));

        let mut active: attendance::ActiveModel = attendance.into();
        active.check_out_at = Set(Some(check_out.into()));
        let attendance = self.attendance_repo.update(active).await?;

        tracing::info!(
            attendance_id = %attendance.id,
            hours = ?attendance.hours(),
            "Volunteer checked out"
        );

        Ok(attendance)
    }

    /// Rate an attended event. Feedback can be revised.
    pub async fn submit_feedback(
        &self,
        actor: &user::Model,
        attendance_id: &str,
        input: FeedbackInput,
    ) -> AppResult<attendance::Model> {
        input.validate()?;

        let attendance = self.attendance_repo.get_by_id(attendance_id).await?;
        if attendance.user_id != actor.id {
            return Err(AppError::Forbidden(
                "You can only give feedback on your own attendance".to_string(),
            ));
        }
        if attendance.check_in_at.is_none() {
            return Err(AppError::BadRequest(
                "Feedback opens after check-in".to_string(),
            ));
        }

        let comment = input
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut active: attendance::ActiveModel = attendance.into();
        active.feedback_rating = Set(Some(input.rating));
        active.feedback_comment = Set(comment);
        active.feedback_at = Set(Some(Utc::now().into()));

        self.attendance_repo.update(active).await
    }

    /// The caller's attendance history with events.
    pub async fn list_mine(&self, actor: &user::Model) -> AppResult<Vec<AttendanceDetail>> {
        let records = self.attendance_repo.find_by_user(&actor.id).await?;

        let event_ids: Vec<String> = records.iter().map(|a| a.event_id.clone()).collect();
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

        Ok(records
            .into_iter()
            .map(|attendance| AttendanceDetail {
                event: events.get(&attendance.event_id).cloned(),
                attendance,
            })
            .collect())
    }

    /// Attendance of an event with its summary.
    pub async fn list_for_event(
        &self,
        actor: &user::Model,
        event_id: &str,
    ) -> AppResult<EventAttendance> {
        let event = self.event_repo.get_by_id(event_id).await?;
        if !can_manage(actor, &event) {
            return Err(AppError::Forbidden(
                "Only the event organizer can view attendance".to_string(),
            ));
        }

        let records = self.attendance_repo.find_by_event(event_id).await?;
        let registered = self
            .registration_repo
            .find_registered_user_ids(event_id)
            .await?
            .len() as u64;
        let summary = AttendanceSummary::compute(registered, &records);

        Ok(EventAttendance { records, summary })
    }

    async fn resolve_registration(&self, input: &CheckInInput) -> AppResult<registration::Model> {
        if let Some(payload) = input.qr_payload.as_deref() {
            let (id, token) = parse_qr_payload(payload)
                .ok_or_else(|| AppError::BadRequest("Invalid QR code".to_string()))?;
            let registration = self.registration_repo.get_by_id(id).await?;
            if registration.qr_token.as_deref() != Some(token) {
                return Err(AppError::BadRequest("QR code is no longer valid".to_string()));
            }
            return Ok(registration);
        }

        match input.registration_id.as_deref() {
            Some(id) => self.registration_repo.get_by_id(id).await,
            None => Err(AppError::BadRequest(
                "Either qrPayload or registrationId is required".to_string(),
            )),
        }
    }
}
