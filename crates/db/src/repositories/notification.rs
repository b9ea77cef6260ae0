//! Notification repository.

use std::sync::Arc;

use crate::entities::{Notification, notification};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new notification.
    pub async fn create(&self, model: notification::ActiveModel) -> AppResult<notification::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get notifications for a user, newest first, paginated by ID.
    pub async fn find_by_user(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        let mut query = Notification::find()
            .filter(notification::Column::UserId.eq(user_id))
            .order_by_desc(notification::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(notification::Column::Id.lt(id));
        }

        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark one of the user's notifications as read. Returns whether it exists.
    pub async fn mark_as_read(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let result = Notification::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Mark all notifications as read for a user.
    pub async fn mark_all_as_read(&self, user_id: &str) -> AppResult<u64> {
        let result = Notification::update_many()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Count unread notifications for a user.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        Notification::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete one of the user's notifications. Returns whether it existed.
    pub async fn delete(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let result = Notification::delete_many()
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::notification::NotificationKind;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_notification(id: &str, is_read: bool) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: "u1".to_string(),
            actor_id: None,
            kind: NotificationKind::RegistrationConfirmed,
            title: "Registration confirmed".to_string(),
            message: "See you there".to_string(),
            event_id: Some("e1".to_string()),
            approval_request_id: None,
            link: None,
            is_read,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_notification("n2", false),
                    create_test_notification("n1", true),
                ]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let result = repo.find_by_user("u1", 20, None, false).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "n2");
    }

    #[tokio::test]
    async fn test_mark_as_read_other_users_notification() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);

        assert!(!repo.mark_as_read("n1", "someone-else").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_all_as_read() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);

        assert_eq!(repo.mark_all_as_read("u1").await.unwrap(), 3);
    }
}
