//! Push subscription entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A browser's Web Push subscription.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "push_subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub user_id: String,

    /// Push service endpoint URL
    #[sea_orm(column_type = "Text", unique)]
    pub endpoint: String,

    /// Auth secret (base64url)
    pub auth: String,

    /// P-256 public key (base64url)
    pub p256dh: String,

    #[sea_orm(nullable)]
    pub user_agent: Option<String>,

    /// Consecutive failed deliveries
    #[sea_orm(default_value = 0)]
    pub fail_count: i32,

    #[sea_orm(nullable)]
    pub last_pushed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
