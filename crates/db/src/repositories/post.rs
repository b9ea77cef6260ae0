//! Post repository.

use std::sync::Arc;

use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::{Post, comment, post, reaction};

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a post by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post not found: {id}")))
    }

    /// Create a post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a post with its comments and reactions.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Post::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Posts of a channel, newest first, with the total count.
    pub async fn find_by_channel(
        &self,
        channel_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<post::Model>, u64)> {
        let total = Post::find()
            .filter(post::Column::ChannelId.eq(channel_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let posts = Post::find()
            .filter(post::Column::ChannelId.eq(channel_id))
            .order_by_desc(post::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((posts, total))
    }

    /// Adjust the comment counter by `delta`, never below zero.
    pub async fn adjust_comments_count(&self, id: &str, delta: i32) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::CommentsCount,
                Expr::cust_with_values("GREATEST(comments_count + ?, 0)", [delta]),
            )
            .filter(post::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Take a user's comments out of the comment counters of the posts they
    /// commented on.
    pub async fn subtract_author_comments_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
    ) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::CommentsCount,
                Expr::cust_with_values(
                    "GREATEST(comments_count - (SELECT COUNT(*) FROM comment \
                     WHERE comment.post_id = post.id AND comment.author_id = ?), 0)",
                    [user_id],
                ),
            )
            .filter(
                post::Column::Id.in_subquery(
                    Query::select()
                        .column(comment::Column::PostId)
                        .from(comment::Entity)
                        .and_where(comment::Column::AuthorId.eq(user_id))
                        .to_owned(),
                ),
            )
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Take a user's reactions out of the reaction counters. A user has at
    /// most one reaction per post.
    pub async fn subtract_user_reactions_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
    ) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::ReactionsCount,
                Expr::cust("GREATEST(reactions_count - 1, 0)"),
            )
            .filter(
                post::Column::Id.in_subquery(
                    Query::select()
                        .column(reaction::Column::PostId)
                        .from(reaction::Entity)
                        .and_where(reaction::Column::UserId.eq(user_id))
                        .to_owned(),
                ),
            )
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Adjust the reaction counter by `delta`, never below zero.
    pub async fn adjust_reactions_count(&self, id: &str, delta: i32) -> AppResult<()> {
        Post::update_many()
            .col_expr(
                post::Column::ReactionsCount,
                Expr::cust_with_values("GREATEST(reactions_count + ?, 0)", [delta]),
            )
            .filter(post::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
