//! Approval request repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::approval_request::{ApprovalStatus, ApprovalType};
use crate::entities::{ApprovalRequest, approval_request};

/// Filters for the admin approval queue.
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub request_type: Option<ApprovalType>,
    pub requester_id: Option<String>,
}

/// Approval request repository for database operations.
#[derive(Clone)]
pub struct ApprovalRequestRepository {
    db: Arc<DatabaseConnection>,
}

impl ApprovalRequestRepository {
    /// Create a new approval request repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an approval request by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<approval_request::Model>> {
        ApprovalRequest::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an approval request by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<approval_request::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Approval request not found: {id}")))
    }

    /// Insert an approval request on the given connection.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: approval_request::ActiveModel,
    ) -> AppResult<approval_request::Model> {
        model
            .insert(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create an approval request.
    pub async fn create(
        &self,
        model: approval_request::ActiveModel,
    ) -> AppResult<approval_request::Model> {
        Self::create_in(self.db.as_ref(), model).await
    }

    /// List requests matching a filter, newest first, with the total count.
    pub async fn list(
        &self,
        filter: &ApprovalFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<approval_request::Model>, u64)> {
        let mut condition = Condition::all();
        if let Some(status) = filter.status {
            condition = condition.add(approval_request::Column::Status.eq(status));
        }
        if let Some(request_type) = filter.request_type {
            condition = condition.add(approval_request::Column::RequestType.eq(request_type));
        }
        if let Some(requester_id) = &filter.requester_id {
            condition = condition.add(approval_request::Column::RequesterId.eq(requester_id.as_str()));
        }

        let total = ApprovalRequest::find()
            .filter(condition.clone())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let requests = ApprovalRequest::find()
            .filter(condition)
            .order_by_desc(approval_request::Column::CreatedAt)
            .order_by_desc(approval_request::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((requests, total))
    }

    /// Whether a user already has a pending promotion request.
    pub async fn has_pending_promotion(&self, requester_id: &str) -> AppResult<bool> {
        let count = ApprovalRequest::find()
            .filter(approval_request::Column::RequesterId.eq(requester_id))
            .filter(approval_request::Column::RequestType.eq(ApprovalType::ManagerPromotion))
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    /// Whether an event already has a pending cancellation request.
    pub async fn has_pending_cancellation(&self, event_id: &str) -> AppResult<bool> {
        let count = ApprovalRequest::find()
            .filter(approval_request::Column::EventId.eq(event_id))
            .filter(approval_request::Column::RequestType.eq(ApprovalType::EventCancellation))
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    /// Count pending requests.
    pub async fn count_pending(&self) -> AppResult<u64> {
        ApprovalRequest::find()
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a review decision.
    ///
    /// Only a `pending` request is updated; returns `false` when someone
    /// else reviewed it first.
    pub async fn mark_reviewed_in<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        status: ApprovalStatus,
        reviewer_id: &str,
        note: Option<&str>,
    ) -> AppResult<bool> {
        let result = ApprovalRequest::update_many()
            .col_expr(approval_request::Column::Status, Expr::value(status))
            .col_expr(approval_request::Column::ReviewedBy, Expr::value(reviewer_id))
            .col_expr(
                approval_request::Column::ReviewNote,
                Expr::value(note.map(ToString::to_string)),
            )
            .col_expr(approval_request::Column::ReviewedAt, Expr::value(Utc::now()))
            .filter(approval_request::Column::Id.eq(id))
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Delete the pending requests about an event.
    pub async fn delete_pending_for_event_in<C: ConnectionTrait>(
        conn: &C,
        event_id: &str,
    ) -> AppResult<u64> {
        let result = ApprovalRequest::delete_many()
            .filter(approval_request::Column::EventId.eq(event_id))
            .filter(approval_request::Column::Status.eq(ApprovalStatus::Pending))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
