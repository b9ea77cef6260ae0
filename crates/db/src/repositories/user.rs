//! User repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use volunteer_common::{AppError, AppResult};

use crate::entities::{User, user};
use crate::entities::user::{Role, UserStatus};

/// Filters for the admin user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    /// Case-insensitive match on name or email
    pub search: Option<String>,
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a user by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find a user by e-mail (expects the lowercase form).
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a user on the given connection (pool or transaction).
    pub async fn create_in<C: ConnectionTrait>(
        conn: &C,
        model: user::ActiveModel,
    ) -> AppResult<user::Model> {
        model
            .insert(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        Self::create_in(self.db.as_ref(), model).await
    }

    /// Update a user.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a user on the given connection. Owned rows go with it through
    /// cascading foreign keys.
    pub async fn delete_in<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        User::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// List users matching a filter, newest first, with the total count.
    pub async fn list(
        &self,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<user::Model>, u64)> {
        let mut condition = Condition::all();
        if let Some(role) = filter.role {
            condition = condition.add(user::Column::Role.eq(role));
        }
        if let Some(status) = filter.status {
            condition = condition.add(user::Column::Status.eq(status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            condition = condition.add(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(user::Column::Name))).like(pattern.clone()))
                    .add(user::Column::Email.like(pattern)),
            );
        }

        let total = User::find()
            .filter(condition.clone())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let users = User::find()
            .filter(condition)
            .order_by_desc(user::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((users, total))
    }

    /// Count users holding a role.
    pub async fn count_by_role(&self, role: Role) -> AppResult<u64> {
        User::find()
            .filter(user::Column::Role.eq(role))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of active administrators, the audience of approval requests.
    pub async fn find_admin_ids(&self) -> AppResult<Vec<String>> {
        User::find()
            .filter(user::Column::Role.eq(Role::Admin))
            .filter(user::Column::Status.eq(UserStatus::Active))
            .select_only()
            .column(user::Column::Id)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a successful sign-in.
    pub async fn touch_last_login(&self, id: &str) -> AppResult<()> {
        User::update_many()
            .col_expr(user::Column::LastLoginAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Promote an active volunteer to manager.
    ///
    /// Returns `false` when the user is no longer an active volunteer.
    pub async fn promote_to_manager_in<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<bool> {
        let result = User::update_many()
            .col_expr(user::Column::Role, Expr::value(Role::Manager.as_str()))
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(id))
            .filter(user::Column::Role.eq(Role::Volunteer))
            .filter(user::Column::Status.eq(UserStatus::Active))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }
}
