//! Reaction repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::{Reaction, reaction};

/// Reaction repository for database operations.
#[derive(Clone)]
pub struct ReactionRepository {
    db: Arc<DatabaseConnection>,
}

impl ReactionRepository {
    /// Create a new reaction repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user's reaction on a post.
    pub async fn find_by_user_and_post(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> AppResult<Option<reaction::Model>> {
        Reaction::find()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::PostId.eq(post_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// A user's reactions on a set of posts.
    pub async fn find_by_user_for_posts(
        &self,
        user_id: &str,
        post_ids: &[String],
    ) -> AppResult<Vec<reaction::Model>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        Reaction::find()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::PostId.is_in(post_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a reaction.
    pub async fn create(&self, model: reaction::ActiveModel) -> AppResult<reaction::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a reaction.
    pub async fn update(&self, model: reaction::ActiveModel) -> AppResult<reaction::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove a user's reaction on a post. Returns whether one existed.
    pub async fn delete_by_user_and_post(&self, user_id: &str, post_id: &str) -> AppResult<bool> {
        let result = Reaction::delete_many()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::PostId.eq(post_id))
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
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_delete_missing_reaction() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = ReactionRepository::new(db);

        assert!(!repo.delete_by_user_and_post("u1", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_for_no_posts() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = ReactionRepository::new(db);

        assert!(repo.find_by_user_for_posts("u1", &[]).await.unwrap().is_empty());
    }
}
