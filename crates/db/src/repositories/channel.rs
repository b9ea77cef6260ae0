//! Channel repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::{Channel, channel, post};

/// Repository for channel operations.
#[derive(Clone)]
pub struct ChannelRepository {
    db: Arc<DatabaseConnection>,
}

impl ChannelRepository {
    /// Create a new channel repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find channel by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<channel::Model>> {
        Channel::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get channel by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<channel::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel not found: {id}")))
    }

    /// Find the channel of an event.
    pub async fn find_by_event(&self, event_id: &str) -> AppResult<Option<channel::Model>> {
        Channel::find()
            .filter(channel::Column::EventId.eq(event_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a channel on the given connection.
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: channel::ActiveModel,
    ) -> AppResult<channel::Model> {
        model
            .insert(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increment posts count atomically.
    pub async fn increment_posts_count(&self, id: &str) -> AppResult<()> {
        Channel::update_many()
            .col_expr(
                channel::Column::PostsCount,
                Expr::col(channel::Column::PostsCount).add(1),
            )
            .col_expr(channel::Column::LastPostedAt, Expr::value(Utc::now()))
            .filter(channel::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Take a user's posts out of every channel's post counter, ahead of
    /// those posts being removed with the user.
    pub async fn subtract_author_posts_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
    ) -> AppResult<()> {
        Channel::update_many()
            .col_expr(
                channel::Column::PostsCount,
                Expr::cust_with_values(
                    "GREATEST(posts_count - (SELECT COUNT(*) FROM post \
                     WHERE post.channel_id = channel.id AND post.author_id = ?), 0)",
                    [user_id],
                ),
            )
            .filter(
                channel::Column::Id.in_subquery(
                    Query::select()
                        .column(post::Column::ChannelId)
                        .from(post::Entity)
                        .and_where(post::Column::AuthorId.eq(user_id))
                        .to_owned(),
                ),
            )
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Decrement posts count atomically.
    pub async fn decrement_posts_count(&self, id: &str) -> AppResult<()> {
        Channel::update_many()
            .col_expr(
                channel::Column::PostsCount,
                Expr::cust("GREATEST(posts_count - 1, 0)"),
            )
            .filter(channel::Column::Id.eq(id))
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

    fn create_test_channel(id: &str, event_id: &str) -> channel::Model {
        channel::Model {
            id: id.to_string(),
            event_id: event_id.to_string(),
            name: "Beach clean-up".to_string(),
            description: None,
            posts_count: 0,
            last_posted_at: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_event() {
        let channel = create_test_channel("ch1", "e1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[channel.clone()]])
                .into_connection(),
        );

        let repo = ChannelRepository::new(db);
        let result = repo.find_by_event("e1").await.unwrap();

        assert_eq!(result.unwrap().id, "ch1");
    }

    #[tokio::test]
    async fn test_decrement_posts_count() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = ChannelRepository::new(db);

        assert!(repo.decrement_posts_count("ch1").await.is_ok());
    }
}
