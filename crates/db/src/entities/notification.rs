//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "event_approved")]
    EventApproved,
    #[sea_orm(string_value = "event_rejected")]
    EventRejected,
    #[sea_orm(string_value = "event_cancelled")]
    EventCancelled,
    #[sea_orm(string_value = "event_updated")]
    EventUpdated,
    #[sea_orm(string_value = "promotion_approved")]
    PromotionApproved,
    #[sea_orm(string_value = "promotion_rejected")]
    PromotionRejected,
    #[sea_orm(string_value = "cancellation_rejected")]
    CancellationRejected,
    #[sea_orm(string_value = "registration_confirmed")]
    RegistrationConfirmed,
    #[sea_orm(string_value = "waitlist_promoted")]
    WaitlistPromoted,
    #[sea_orm(string_value = "new_registration")]
    NewRegistration,
    #[sea_orm(string_value = "approval_requested")]
    ApprovalRequested,
    #[sea_orm(string_value = "new_post")]
    NewPost,
    #[sea_orm(string_value = "new_comment")]
    NewComment,
    #[sea_orm(string_value = "new_reaction")]
    NewReaction,
    #[sea_orm(string_value = "checked_in")]
    CheckedIn,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user receiving the notification
    #[sea_orm(indexed)]
    pub user_id: String,

    /// The user who triggered the notification, if any
    #[sea_orm(nullable)]
    pub actor_id: Option<String>,

    pub kind: NotificationKind,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(nullable)]
    pub event_id: Option<String>,

    #[sea_orm(nullable)]
    pub approval_request_id: Option<String>,

    /// Client-side route to open
    #[sea_orm(nullable)]
    pub link: Option<String>,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

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
