//! User service: profiles, administration and dashboards.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;
use volunteer_common::{AppError, AppResult, IdGenerator};
use volunteer_db::{
    entities::{
        event::EventStatus,
        registration::RegistrationStatus,
        user::{self, Role, UserStatus},
    },
    repositories::{
        ApprovalRequestRepository, AttendanceRepository, ChannelRepository, EventRepository,
        PostRepository, RegistrationRepository, UserFilter, UserRepository,
    },
};

use crate::services::notification::NotificationService;
use crate::services::registration::{fill_freed_seat_in, notify_promoted};

/// Maximum number of skills on a profile.
const MAX_SKILLS: usize = 20;

/// Maximum length of a single skill.
const MAX_SKILL_LEN: usize = 50;

/// Input for updating one's own profile.
///
/// Empty strings clear the optional fields.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 2048))]
    pub avatar_url: Option<String>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    pub skills: Option<Vec<String>>,
}

/// User counts by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub volunteer: u64,
    pub manager: u64,
    pub admin: u64,
}

/// Event counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub cancelled: u64,
}

/// Registration counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationCounts {
    pub registered: u64,
    pub waitlisted: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub users: RoleCounts,
    pub events: EventCounts,
    pub pending_approvals: u64,
    pub total_registrations: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub events: EventCounts,
    pub registrations: u64,
    pub check_ins: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerStats {
    pub registrations: RegistrationCounts,
    pub attended_events: u64,
    pub total_hours: f64,
}

/// Statistics for the caller's home screen, shaped by role.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Admin(AdminStats),
    Manager(ManagerStats),
    Volunteer(VolunteerStats),
}

/// User service.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    event_repo: EventRepository,
    registration_repo: RegistrationRepository,
    attendance_repo: AttendanceRepository,
    approval_repo: ApprovalRequestRepository,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        user_repo: UserRepository,
        event_repo: EventRepository,
        registration_repo: RegistrationRepository,
        attendance_repo: AttendanceRepository,
        approval_repo: ApprovalRequestRepository,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            db,
            user_repo,
            event_repo,
            registration_repo,
            attendance_repo,
            approval_repo,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// List users (admin).
    pub async fn list(
        &self,
        actor: &user::Model,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<user::Model>, u64)> {
        require_admin(actor)?;
        self.user_repo.list(filter, limit, offset).await
    }

    /// Get a user as an admin or as that user.
    pub async fn get(&self, actor: &user::Model, id: &str) -> AppResult<user::Model> {
        if actor.id != id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "You can only view your own profile".to_string(),
            ));
        }

        self.user_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Update the caller's profile.
    pub async fn update_profile(
        &self,
        actor: &user::Model,
        input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        input.validate()?;

        let mut active: user::ActiveModel = actor.clone().into();

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::Validation("Name cannot be blank".to_string()));
            }
            active.name = Set(name);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(non_empty(phone));
        }
        if let Some(bio) = input.bio {
            active.bio = Set(non_empty(bio));
        }
        if let Some(avatar_url) = input.avatar_url {
            let avatar_url = non_empty(avatar_url);
            if let Some(ref url) = avatar_url {
                url::Url::parse(url)
                    .map_err(|_| AppError::Validation(format!("Invalid avatar URL: {url}")))?;
            }
            active.avatar_url = Set(avatar_url);
        }
        if let Some(skills) = input.skills {
            active.skills = Set(json!(normalize_skills(&skills)?));
        }
        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Activate or deactivate an account (admin).
    pub async fn set_status(
        &self,
        actor: &user::Model,
        id: &str,
        status: UserStatus,
    ) -> AppResult<user::Model> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(AppError::BadRequest(
                "You cannot change your own status".to_string(),
            ));
        }

        let target = self.get(actor, id).await?;
        let mut active: user::ActiveModel = target.into();
        active.status = Set(status);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = self.user_repo.update(active).await?;

        tracing::info!(user_id = %id, status = ?status, admin_id = %actor.id, "User status changed");
        Ok(user)
    }

    /// Change a user's role (admin).
    pub async fn set_role(&self, actor: &user::Model, id: &str, role: Role) -> AppResult<user::Model> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(AppError::BadRequest(
                "You cannot change your own role".to_string(),
            ));
        }

        let target = self.get(actor, id).await?;
        let mut active: user::ActiveModel = target.into();
        active.role = Set(role);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = self.user_repo.update(active).await?;

        tracing::info!(user_id = %id, role = %role, admin_id = %actor.id, "User role changed");
        Ok(user)
    }

    /// Delete a user and everything they own (admin).
    pub async fn delete(&self, actor: &user::Model, id: &str) -> AppResult<()> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(AppError::BadRequest(
                "You cannot delete your own account".to_string(),
            ));
        }

        self.get(actor, id).await?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Registrations vanish with the user, so their seats are handed on
        // first.
        let mut promoted = Vec::new();
        for registration in RegistrationRepository::find_live_by_user_in(&txn, id).await? {
            let changed = RegistrationRepository::transition_in(
                &txn,
                &registration.id,
                registration.status,
                RegistrationStatus::Cancelled,
                None,
            )
            .await?;
            if changed && registration.status == RegistrationStatus::Registered {
                EventRepository::release_seat_in(&txn, &registration.event_id).await?;
                if let Some(next) =
                    fill_freed_seat_in(&txn, &registration.event_id, &self.id_gen).await?
                {
                    promoted.push(next);
                }
            }
        }

        ChannelRepository::subtract_author_posts_in(&txn, id).await?;
        PostRepository::subtract_author_comments_in(&txn, id).await?;
        PostRepository::subtract_user_reactions_in(&txn, id).await?;
        UserRepository::delete_in(&txn, id).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            user_id = %id,
            admin_id = %actor.id,
            promoted = promoted.len(),
            "User deleted"
        );

        for registration in &promoted {
            notify_promoted(&self.notification_service, &self.event_repo, registration).await;
        }

        Ok(())
    }

    /// Role-specific statistics for the caller.
    pub async fn dashboard(&self, actor: &user::Model) -> AppResult<Dashboard> {
        match actor.role {
            Role::Admin => self.admin_stats().await.map(Dashboard::Admin),
            Role::Manager => self.manager_stats(&actor.id).await.map(Dashboard::Manager),
            Role::Volunteer => self.volunteer_stats(&actor.id).await.map(Dashboard::Volunteer),
        }
    }

    async fn admin_stats(&self) -> AppResult<AdminStats> {
        let users = RoleCounts {
            volunteer: self.user_repo.count_by_role(Role::Volunteer).await?,
            manager: self.user_repo.count_by_role(Role::Manager).await?,
            admin: self.user_repo.count_by_role(Role::Admin).await?,
        };

        Ok(AdminStats {
            users,
            events: self.event_counts(None).await?,
            pending_approvals: self.approval_repo.count_pending().await?,
            total_registrations: self.registration_repo.count_all().await?,
        })
    }

    async fn manager_stats(&self, user_id: &str) -> AppResult<ManagerStats> {
        let events = self.event_counts(Some(user_id)).await?;
        let event_ids = self.event_repo.find_ids_by_creator(user_id).await?;

        Ok(ManagerStats {
            events,
            registrations: self.registration_repo.count_live_for_events(&event_ids).await?,
            check_ins: self
                .attendance_repo
                .count_checked_in_for_events(&event_ids)
                .await?,
        })
    }

    async fn volunteer_stats(&self, user_id: &str) -> AppResult<VolunteerStats> {
        let registrations = RegistrationCounts {
            registered: self
                .registration_repo
                .count_by_user_and_status(user_id, RegistrationStatus::Registered)
                .await?,
            waitlisted: self
                .registration_repo
                .count_by_user_and_status(user_id, RegistrationStatus::Waitlisted)
                .await?,
            cancelled: self
                .registration_repo
                .count_by_user_and_status(user_id, RegistrationStatus::Cancelled)
                .await?,
        };

        let records = self.attendance_repo.find_by_user(user_id).await?;
        let attended_events = records.iter().filter(|a| a.check_in_at.is_some()).count() as u64;
        let total_hours = records.iter().filter_map(|a| a.hours()).sum::<f64>();

        Ok(VolunteerStats {
            registrations,
            attended_events,
            total_hours: (total_hours * 100.0).round() / 100.0,
        })
    }

    async fn event_counts(&self, created_by: Option<&str>) -> AppResult<EventCounts> {
        Ok(EventCounts {
            pending: self.event_repo.count_by_status(EventStatus::Pending, created_by).await?,
            approved: self.event_repo.count_by_status(EventStatus::Approved, created_by).await?,
            rejected: self.event_repo.count_by_status(EventStatus::Rejected, created_by).await?,
            cancelled: self.event_repo.count_by_status(EventStatus::Cancelled, created_by).await?,
        })
    }
}

fn require_admin(actor: &user::Model) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Trim, drop blanks and duplicates.
fn normalize_skills(skills: &[String]) -> AppResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        let skill = skill.trim();
        if skill.is_empty() {
            continue;
        }
        if skill.chars().count() > MAX_SKILL_LEN {
            return Err(AppError::Validation(format!(
                "Skills must be at most {MAX_SKILL_LEN} characters"
            )));
        }
        if !normalized.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            normalized.push(skill.to_string());
        }
    }

    if normalized.len() > MAX_SKILLS {
        return Err(AppError::Validation(format!(
            "At most {MAX_SKILLS} skills are allowed"
        )));
    }
    Ok(normalized)
}
