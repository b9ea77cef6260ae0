//! Event entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum EventStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// A volunteer event.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "event")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub location: String,

    #[sea_orm(indexed)]
    pub start_date: DateTimeWithTimeZone,

    pub end_date: DateTimeWithTimeZone,

    pub max_participants: i32,

    /// Number of `registered` registrations (denormalized)
    #[sea_orm(default_value = 0)]
    pub current_participants: i32,

    /// Tags (JSON array of 1-5 lowercase strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,

    #[sea_orm(nullable)]
    pub image_url: Option<String>,

    #[sea_orm(indexed)]
    pub status: EventStatus,

    /// Creator (manager or admin)
    #[sea_orm(indexed)]
    pub created_by: String,

    /// Social feed channel, created on approval
    #[sea_orm(nullable)]
    pub channel_id: Option<String>,

    /// The `event_approval` request that gates this event
    #[sea_orm(nullable)]
    pub approval_request_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cancellation_reason: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Tags as a string list.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        crate::entities::json_strings(&self.tags)
    }

    /// Whether every seat is taken.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Creator,
    #[sea_orm(has_many = "super::registration::Entity")]
    Registrations,
    #[sea_orm(has_one = "super::channel::Entity")]
    Channel,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrations.def()
    }
}

impl Related<super::channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
