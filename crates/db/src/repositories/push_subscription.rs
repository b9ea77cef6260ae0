//! Push subscription repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

use crate::entities::push_subscription::{ActiveModel, Column, Entity, Model};
use volunteer_common::{AppError, AppResult};

/// Consecutive failures after which a subscription is no longer tried.
pub const MAX_FAIL_COUNT: i32 = 5;

/// Repository for push subscription operations.
#[derive(Clone)]
pub struct PushSubscriptionRepository {
    db: Arc<DatabaseConnection>,
}

impl PushSubscriptionRepository {
    /// Create a new push subscription repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a push subscription by endpoint.
    pub async fn find_by_endpoint(&self, endpoint: &str) -> AppResult<Option<Model>> {
        Entity::find()
            .filter(Column::Endpoint.eq(endpoint))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Subscriptions of a user that are still worth delivering to.
    pub async fn find_deliverable_by_user(&self, user_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::FailCount.lt(MAX_FAIL_COUNT))
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new push subscription.
    pub async fn create(&self, subscription: ActiveModel) -> AppResult<Model> {
        subscription
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a push subscription.
    pub async fn update(&self, subscription: ActiveModel) -> AppResult<Model> {
        subscription
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a push subscription.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a user's subscription by endpoint. Returns whether it existed.
    pub async fn delete_by_endpoint(&self, user_id: &str, endpoint: &str) -> AppResult<bool> {
        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Endpoint.eq(endpoint))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// Increment fail count for a subscription.
    pub async fn increment_fail_count(&self, id: &str) -> AppResult<()> {
        Entity::update_many()
            .col_expr(Column::FailCount, Expr::col(Column::FailCount).add(1))
            .filter(Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Reset fail count and update last pushed timestamp.
    pub async fn mark_push_success(&self, id: &str) -> AppResult<()> {
        Entity::update_many()
            .col_expr(Column::FailCount, Expr::value(0))
            .col_expr(Column::LastPushedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_subscription(id: &str, endpoint: &str) -> Model {
        Model {
            id: id.to_string(),
            user_id: "u1".to_string(),
            endpoint: endpoint.to_string(),
            auth: "auth".to_string(),
            p256dh: "key".to_string(),
            user_agent: None,
            fail_count: 0,
            last_pushed_at: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_endpoint() {
        let sub = create_test_subscription("s1", "https://push.example.com/abc");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[sub]])
                .into_connection(),
        );

        let repo = PushSubscriptionRepository::new(db);
        let found = repo
            .find_by_endpoint("https://push.example.com/abc")
            .await
            .unwrap();

        assert_eq!(found.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_delete_by_endpoint_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = PushSubscriptionRepository::new(db);

        assert!(!repo.delete_by_endpoint("u1", "https://nope").await.unwrap());
    }
}
