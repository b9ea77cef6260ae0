//! Registration entity (a user's signup for an event).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Registration lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[sea_orm(string_value = "registered")]
    Registered,
    #[sea_orm(string_value = "waitlisted")]
    Waitlisted,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl RegistrationStatus {
    /// Whether the registration still holds (or waits for) a seat.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Registered | Self::Waitlisted)
    }
}

/// Unique per (user, event); a cancelled row is reused on re-registration.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registration")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub user_id: String,

    #[sea_orm(indexed)]
    pub event_id: String,

    pub status: RegistrationStatus,

    /// Check-in token, present only while `registered`
    #[sea_orm(unique, nullable)]
    pub qr_token: Option<String>,

    pub registered_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
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
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id",
        on_delete = "Cascade"
    )]
    Event,
    #[sea_orm(has_one = "super::attendance::Entity")]
    Attendance,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl Related<super::attendance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attendance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
