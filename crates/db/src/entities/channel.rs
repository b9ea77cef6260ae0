//! Channel entity: the social feed attached to an event.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Channel entity - one per approved event, holds posts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Event this channel belongs to.
    #[sea_orm(unique)]
    pub event_id: String,

    /// Channel name (defaults to the event title).
    pub name: String,

    /// Channel description (optional).
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Number of posts in this channel (denormalized).
    #[sea_orm(default_value = 0)]
    pub posts_count: i64,

    /// Last time a post was made.
    #[sea_orm(nullable)]
    pub last_posted_at: Option<DateTimeWithTimeZone>,

    /// When the channel was created.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id",
        on_delete = "Cascade"
    )]
    Event,
    #[sea_orm(has_many = "super::post::Entity")]
    Posts,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
