//! Registration repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

use super::insert_error;
use crate::entities::registration::RegistrationStatus;
use crate::entities::{Registration, registration};

/// Registration repository for database operations.
#[derive(Clone)]
pub struct RegistrationRepository {
    db: Arc<DatabaseConnection>,
}

impl RegistrationRepository {
    /// Create a new registration repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a registration by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<registration::Model>> {
        Registration::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a registration by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<registration::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Registration not found: {id}")))
    }

    /// Find the (unique) registration of a user for an event.
    pub async fn find_by_user_and_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> AppResult<Option<registration::Model>> {
        Self::find_by_user_and_event_in(self.db.as_ref(), user_id, event_id).await
    }

    /// Find the registration of a user for an event on the given connection.
    pub async fn find_by_user_and_event_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        event_id: &str,
    ) -> AppResult<Option<registration::Model>> {
        Registration::find()
            .filter(registration::Column::UserId.eq(user_id))
            .filter(registration::Column::EventId.eq(event_id))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a registration on the given connection.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: registration::ActiveModel,
    ) -> AppResult<registration::Model> {
        model
            .insert(conn)
            .await
            .map_err(|e| insert_error(&e, "You are already registered for this event"))
    }

    /// Move a registration from `from` to `to` if it is still in `from`.
    ///
    /// Returns whether the row changed. Callers only touch seat counters
    /// when it did, so two requests racing on one row cannot both act.
    pub async fn transition_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        from: RegistrationStatus,
        to: RegistrationStatus,
        qr_token: Option<String>,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let mut update = Registration::update_many()
            .col_expr(registration::Column::Status, Expr::value(to))
            .col_expr(registration::Column::QrToken, Expr::value(qr_token))
            .col_expr(registration::Column::UpdatedAt, Expr::value(now));
        if to == RegistrationStatus::Cancelled {
            update = update.col_expr(registration::Column::CancelledAt, Expr::value(now));
        } else if from == RegistrationStatus::Cancelled {
            update = update
                .col_expr(registration::Column::RegisteredAt, Expr::value(now))
                .col_expr(
                    registration::Column::CancelledAt,
                    Expr::value(Option::<DateTime<Utc>>::None),
                );
        }

        let result = update
            .filter(registration::Column::Id.eq(id))
            .filter(registration::Column::Status.eq(from))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Live (registered or waitlisted) registrations of a user.
    pub async fn find_live_by_user_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
    ) -> AppResult<Vec<registration::Model>> {
        Registration::find()
            .filter(registration::Column::UserId.eq(user_id))
            .filter(registration::Column::Status.is_in([
                RegistrationStatus::Registered,
                RegistrationStatus::Waitlisted,
            ]))
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The registration that has waited longest on an event's waitlist.
    pub async fn oldest_waitlisted_in<C: ConnectionTrait>(
        conn: &C,
        event_id: &str,
    ) -> AppResult<Option<registration::Model>> {
        Registration::find()
            .filter(registration::Column::EventId.eq(event_id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Waitlisted))
            .order_by_asc(registration::Column::RegisteredAt)
            .order_by_asc(registration::Column::Id)
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Registrations of a user, newest first.
    pub async fn find_by_user(
        &self,
        user_id: &str,
        status: Option<RegistrationStatus>,
    ) -> AppResult<Vec<registration::Model>> {
        let mut query = Registration::find().filter(registration::Column::UserId.eq(user_id));
        if let Some(status) = status {
            query = query.filter(registration::Column::Status.eq(status));
        }

        query
            .order_by_desc(registration::Column::RegisteredAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Registrations of an event in sign-up order.
    pub async fn find_by_event(
        &self,
        event_id: &str,
        statuses: &[RegistrationStatus],
    ) -> AppResult<Vec<registration::Model>> {
        let mut query = Registration::find().filter(registration::Column::EventId.eq(event_id));
        if !statuses.is_empty() {
            query = query.filter(registration::Column::Status.is_in(statuses.iter().copied()));
        }

        query
            .order_by_asc(registration::Column::RegisteredAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// User IDs holding a live (registered or waitlisted) registration.
    pub async fn find_live_user_ids(&self, event_id: &str) -> AppResult<Vec<String>> {
        Self::find_live_user_ids_in(self.db.as_ref(), event_id).await
    }

    /// User IDs holding a live registration, on the given connection.
    pub async fn find_live_user_ids_in<C: ConnectionTrait>(
        conn: &C,
        event_id: &str,
    ) -> AppResult<Vec<String>> {
        Registration::find()
            .filter(registration::Column::EventId.eq(event_id))
            .filter(registration::Column::Status.is_in([
                RegistrationStatus::Registered,
                RegistrationStatus::Waitlisted,
            ]))
            .select_only()
            .column(registration::Column::UserId)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// User IDs of `registered` participants.
    pub async fn find_registered_user_ids(&self, event_id: &str) -> AppResult<Vec<String>> {
        Registration::find()
            .filter(registration::Column::EventId.eq(event_id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Registered))
            .select_only()
            .column(registration::Column::UserId)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether a user holds a live registration for an event.
    pub async fn is_live_participant(&self, user_id: &str, event_id: &str) -> AppResult<bool> {
        Ok(self
            .find_by_user_and_event(user_id, event_id)
            .await?
            .is_some_and(|r| r.status.is_live()))
    }

    /// Cancel every live registration of an event and clear their QR tokens.
    pub async fn cancel_all_live_in<C: ConnectionTrait>(conn: &C, event_id: &str) -> AppResult<u64> {
        let now = Utc::now();
        let result = Registration::update_many()
            .col_expr(
                registration::Column::Status,
                Expr::value(RegistrationStatus::Cancelled),
            )
            .col_expr(registration::Column::QrToken, Expr::value(Option::<String>::None))
            .col_expr(registration::Column::CancelledAt, Expr::value(now))
            .col_expr(registration::Column::UpdatedAt, Expr::value(now))
            .filter(registration::Column::EventId.eq(event_id))
            .filter(registration::Column::Status.is_in([
                RegistrationStatus::Registered,
                RegistrationStatus::Waitlisted,
            ]))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Count a user's registrations with a status.
    pub async fn count_by_user_and_status(
        &self,
        user_id: &str,
        status: RegistrationStatus,
    ) -> AppResult<u64> {
        Registration::find()
            .filter(registration::Column::UserId.eq(user_id))
            .filter(registration::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count live registrations across a set of events.
    pub async fn count_live_for_events(&self, event_ids: &[String]) -> AppResult<u64> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        Registration::find()
            .filter(registration::Column::EventId.is_in(event_ids.iter().cloned()))
            .filter(registration::Column::Status.is_in([
                RegistrationStatus::Registered,
                RegistrationStatus::Waitlisted,
            ]))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all registrations.
    pub async fn count_all(&self) -> AppResult<u64> {
        Registration::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
