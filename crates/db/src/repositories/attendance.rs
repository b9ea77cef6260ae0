//! Attendance repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use volunteer_common::{AppError, AppResult};

use super::insert_error;
use crate::entities::{Attendance, attendance};

/// Attendance repository for database operations.
#[derive(Clone)]
pub struct AttendanceRepository {
    db: Arc<DatabaseConnection>,
}

impl AttendanceRepository {
    /// Create a new attendance repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an attendance record by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<attendance::Model>> {
        Attendance::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an attendance record by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<attendance::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attendance not found: {id}")))
    }

    /// Find the attendance record of a registration.
    pub async fn find_by_registration(
        &self,
        registration_id: &str,
    ) -> AppResult<Option<attendance::Model>> {
        Attendance::find()
            .filter(attendance::Column::RegistrationId.eq(registration_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create an attendance record.
    pub async fn create(&self, model: attendance::ActiveModel) -> AppResult<attendance::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| insert_error(&e, "Volunteer is already checked in"))
    }

    /// Update an attendance record.
    pub async fn update(&self, model: attendance::ActiveModel) -> AppResult<attendance::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attendance records of a user, most recent check-in first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<attendance::Model>> {
        Attendance::find()
            .filter(attendance::Column::UserId.eq(user_id))
            .order_by_desc(attendance::Column::CheckInAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attendance records of an event in check-in order.
    pub async fn find_by_event(&self, event_id: &str) -> AppResult<Vec<attendance::Model>> {
        Attendance::find()
            .filter(attendance::Column::EventId.eq(event_id))
            .order_by_asc(attendance::Column::CheckInAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count check-ins across a set of events.
    pub async fn count_checked_in_for_events(&self, event_ids: &[String]) -> AppResult<u64> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        Attendance::find()
            .filter(attendance::Column::EventId.is_in(event_ids.iter().cloned()))
            .filter(attendance::Column::CheckInAt.is_not_null())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
