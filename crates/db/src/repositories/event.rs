//! Event repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::event::EventStatus;
use crate::entities::{Event, event};

/// Filters for event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to these statuses (any status when empty)
    pub statuses: Vec<EventStatus>,
    /// Exact tag match (tags are stored lowercase)
    pub tag: Option<String>,
    /// Case-insensitive match on title, description or location
    pub search: Option<String>,
    /// Only events that have not ended yet
    pub upcoming_only: bool,
    pub created_by: Option<String>,
}

/// Event repository for database operations.
#[derive(Clone)]
pub struct EventRepository {
    db: Arc<DatabaseConnection>,
}

impl EventRepository {
    /// Create a new event repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an event by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<event::Model>> {
        Self::find_by_id_in(self.db.as_ref(), id).await
    }

    /// Find an event by ID on the given connection.
    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<event::Model>> {
        Event::find_by_id(id)
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an event by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<event::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::EventNotFound(id.to_string()))
    }

    /// Find events by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<event::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Event::find()
            .filter(event::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert an event on the given connection.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: event::ActiveModel,
    ) -> AppResult<event::Model> {
        model
            .insert(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an event on the given connection.
    pub async fn update_in<C: ConnectionTrait>(
        conn: &C,
        model: event::ActiveModel,
    ) -> AppResult<event::Model> {
        model
            .update(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an event.
    pub async fn update(&self, model: event::ActiveModel) -> AppResult<event::Model> {
        Self::update_in(self.db.as_ref(), model).await
    }

    /// Delete an event on the given connection.
    pub async fn delete_in<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Event::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// List events matching a filter, soonest first, with the total count.
    pub async fn list(
        &self,
        filter: &EventFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<event::Model>, u64)> {
        let condition = Self::condition(filter);

        let total = Event::find()
            .filter(condition.clone())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let events = Event::find()
            .filter(condition)
            .order_by_asc(event::Column::StartDate)
            .order_by_asc(event::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((events, total))
    }

    fn condition(filter: &EventFilter) -> Condition {
        let mut condition = Condition::all();

        if !filter.statuses.is_empty() {
            condition = condition.add(event::Column::Status.is_in(filter.statuses.clone()));
        }
        if let Some(tag) = &filter.tag {
            condition = condition.add(Expr::cust_with_values(
                "tags @> ?::jsonb",
                [serde_json::json!([tag]).to_string()],
            ));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            condition = condition.add(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(event::Column::Title))).like(pattern.clone()))
                    .add(
                        Expr::expr(Func::lower(Expr::col(event::Column::Description)))
                            .like(pattern.clone()),
                    )
                    .add(Expr::expr(Func::lower(Expr::col(event::Column::Location))).like(pattern)),
            );
        }
        if filter.upcoming_only {
            condition = condition.add(event::Column::EndDate.gt(Utc::now()));
        }
        if let Some(created_by) = &filter.created_by {
            condition = condition.add(event::Column::CreatedBy.eq(created_by.as_str()));
        }

        condition
    }

    /// Events created by a user, newest first.
    pub async fn find_by_creator(&self, user_id: &str) -> AppResult<Vec<event::Model>> {
        Event::find()
            .filter(event::Column::CreatedBy.eq(user_id))
            .order_by_desc(event::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of events created by a user.
    pub async fn find_ids_by_creator(&self, user_id: &str) -> AppResult<Vec<String>> {
        Event::find()
            .filter(event::Column::CreatedBy.eq(user_id))
            .select_only()
            .column(event::Column::Id)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count events with a status, optionally restricted to one creator.
    pub async fn count_by_status(
        &self,
        status: EventStatus,
        created_by: Option<&str>,
    ) -> AppResult<u64> {
        let mut query = Event::find().filter(event::Column::Status.eq(status));
        if let Some(user_id) = created_by {
            query = query.filter(event::Column::CreatedBy.eq(user_id));
        }

        query
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Take one seat if any is left on an approved event.
    ///
    /// The increment is guarded by `current_participants < max_participants`
    /// and `status = 'approved'` in the same statement, so concurrent
    /// registrations cannot overbook or land on a cancelled event.
    pub async fn try_claim_seat_in<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<bool> {
        let result = Event::update_many()
            .col_expr(
                event::Column::CurrentParticipants,
                Expr::col(event::Column::CurrentParticipants).add(1),
            )
            .filter(event::Column::Id.eq(id))
            .filter(event::Column::Status.eq(EventStatus::Approved))
            .filter(
                Expr::col(event::Column::CurrentParticipants)
                    .lt(Expr::col(event::Column::MaxParticipants)),
            )
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Give one seat back.
    pub async fn release_seat_in<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Event::update_many()
            .col_expr(
                event::Column::CurrentParticipants,
                Expr::cust("GREATEST(current_participants - 1, 0)"),
            )
            .filter(event::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Move an event to a new status, optionally linking its channel.
    pub async fn set_status_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        status: EventStatus,
        channel_id: Option<&str>,
    ) -> AppResult<()> {
        let mut update = Event::update_many()
            .col_expr(event::Column::Status, Expr::value(status))
            .col_expr(event::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(channel_id) = channel_id {
            update = update.col_expr(event::Column::ChannelId, Expr::value(channel_id));
        }

        update
            .filter(event::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Cancel an event: record the reason and free every seat.
    pub async fn mark_cancelled_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        reason: &str,
    ) -> AppResult<()> {
        Event::update_many()
            .col_expr(event::Column::Status, Expr::value(EventStatus::Cancelled))
            .col_expr(event::Column::CancellationReason, Expr::value(reason))
            .col_expr(event::Column::CurrentParticipants, Expr::value(0))
            .col_expr(event::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(event::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_event(id: &str, status: EventStatus) -> event::Model {
        let start = Utc::now() + Duration::days(3);
        event::Model {
            id: id.to_string(),
            title: "Beach clean-up".to_string(),
            description: "Bring gloves".to_string(),
            location: "North beach".to_string(),
            start_date: start.into(),
            end_date: (start + Duration::hours(3)).into(),
            max_participants: 10,
            current_participants: 0,
            tags: serde_json::json!(["environment"]),
            image_url: None,
            status,
            created_by: "m1".to_string(),
            channel_id: None,
            approval_request_id: None,
            cancellation_reason: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_returns_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<event::Model>::new()])
                .into_connection(),
        );

        let repo = EventRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::EventNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_by_creator() {
        let e1 = create_test_event("e1", EventStatus::Pending);
        let e2 = create_test_event("e2", EventStatus::Approved);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[e1, e2]])
                .into_connection(),
        );

        let repo = EventRepository::new(db);
        let result = repo.find_by_creator("m1").await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].tag_list(), vec!["environment"]);
    }

    #[tokio::test]
    async fn test_try_claim_seat_full() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let claimed = EventRepository::try_claim_seat_in(&db, "e1").await.unwrap();

        assert!(!claimed);
    }

    #[tokio::test]
    async fn test_try_claim_seat_available() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let claimed = EventRepository::try_claim_seat_in(&db, "e1").await.unwrap();

        assert!(claimed);
    }

    #[tokio::test]
    async fn test_try_claim_seat_requires_approved_event() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        EventRepository::try_claim_seat_in(&db, "e1").await.unwrap();

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("max_participants"));
        assert!(log.contains("status"));
        assert!(log.contains("approved"));
    }
}
